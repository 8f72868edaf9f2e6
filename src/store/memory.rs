//! In-memory store for tests.
//!
//! All state sits behind one lock, so a settlement observes and mutates the
//! catalog, orders and carts as a single step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    models::{Cart, CartItem, Customer, Order, PaymentStatus, Product, Transaction},
    store::{
        CartStore, CommerceStore, CustomerStore, OrderStore, Page, PaymentSettlement, ProductStore,
        StoreError, StoreResult,
    },
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    order_sequence: Vec<Uuid>,
    transactions: HashMap<String, Transaction>,
    customers: HashMap<Uuid, Customer>,
    fail_transaction_writes: bool,
    unavailable: bool,
    latency: Option<Duration>,
    order_ack_delay: Option<Duration>,
    writes: usize,
}

impl State {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }

    fn cart_mut(&mut self, cart_id: Uuid) -> StoreResult<&mut Cart> {
        self.carts.get_mut(&cart_id).ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_transaction` fail.
    pub async fn set_fail_transaction_writes(&self, fail: bool) {
        self.state.lock().await.fail_transaction_writes = fail;
    }

    /// Makes every call fail as if the backing database were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Delays every call by `latency` before it touches state.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Delays the reply of `create_order` after the order is stored, as if
    /// the commit landed but the acknowledgement was slow.
    pub async fn set_order_ack_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.order_ack_delay = delay;
    }

    /// Number of successful mutating calls so far.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    async fn enter(&self) -> StoreResult<tokio::sync::MutexGuard<'_, State>> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let state = self.enter().await?;
        state.products.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_products(
        &self,
        category: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Product>> {
        let state = self.enter().await?;
        let mut matching: Vec<Product> = state
            .products
            .values()
            .filter(|product| category.is_none_or(|c| product.category == c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.enter().await?;
        if state.products.contains_key(&product.id) {
            return Err(StoreError::StateConflict(format!(
                "product {} already exists",
                product.id
            )));
        }
        state.products.insert(product.id, product.clone());
        state.writes += 1;
        Ok(())
    }

    async fn update_stock(&self, id: Uuid, new_stock: i32) -> StoreResult<()> {
        if new_stock < 0 {
            return Err(StoreError::StateConflict(format!(
                "stock for product {id} cannot be set to {new_stock}"
            )));
        }
        let mut state = self.enter().await?;
        let product = state.products.get_mut(&id).ok_or(StoreError::NotFound)?;
        product.stock = new_stock;
        state.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart_by_customer(&self, customer_id: Uuid) -> StoreResult<Cart> {
        let state = self.enter().await?;
        state
            .carts
            .values()
            .find(|cart| cart.customer_id == customer_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_cart(&self, customer_id: Uuid) -> StoreResult<Cart> {
        let mut state = self.enter().await?;
        if let Some(existing) = state
            .carts
            .values()
            .find(|cart| cart.customer_id == customer_id)
        {
            return Ok(existing.clone());
        }

        let cart = Cart {
            id: Uuid::new_v4(),
            customer_id,
            items: Vec::new(),
        };
        state.carts.insert(cart.id, cart.clone());
        state.writes += 1;
        Ok(cart)
    }

    async fn add_cart_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        let mut state = self.enter().await?;
        let cart = state.cart_mut(cart_id)?;
        let item = match cart.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(quantity).ok_or_else(|| {
                    StoreError::StateConflict(format!(
                        "quantity for product {product_id} would overflow"
                    ))
                })?;
                existing.clone()
            }
            None => {
                let item = CartItem {
                    product_id,
                    quantity,
                };
                cart.items.push(item.clone());
                item
            }
        };
        state.writes += 1;
        Ok(item)
    }

    async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        let mut state = self.enter().await?;
        let cart = state.cart_mut(cart_id)?;
        let before = cart.items.len();
        cart.items.retain(|item| item.product_id != product_id);
        if cart.items.len() == before {
            return Err(StoreError::NotFound);
        }
        state.writes += 1;
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        let mut state = self.enter().await?;
        state.cart_mut(cart_id)?.items.clear();
        state.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.enter().await?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::StateConflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        state.orders.insert(order.id, order.clone());
        state.order_sequence.push(order.id);
        state.writes += 1;
        let ack_delay = state.order_ack_delay;
        drop(state);

        if let Some(delay) = ack_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.enter().await?;
        let stored = state.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        *stored = order.clone();
        state.writes += 1;
        Ok(())
    }

    async fn get_order_by_id(&self, id: Uuid) -> StoreResult<Order> {
        let state = self.enter().await?;
        state.orders.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Order>> {
        let state = self.enter().await?;
        let matching: Vec<Order> = state
            .order_sequence
            .iter()
            .rev()
            .filter_map(|id| state.orders.get(id))
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut state = self.enter().await?;
        if state.fail_transaction_writes {
            return Err(StoreError::Unavailable(
                "transaction table rejected the write".into(),
            ));
        }
        if !state.orders.contains_key(&transaction.order_id) {
            return Err(StoreError::StateConflict(format!(
                "transaction {} references unknown order {}",
                transaction.id, transaction.order_id
            )));
        }
        state
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        state.writes += 1;
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut state = self.enter().await?;
        let stored = state
            .transactions
            .get_mut(&transaction.id)
            .ok_or(StoreError::NotFound)?;
        stored.payment_status = transaction.payment_status;
        stored.payment_date = transaction.payment_date;
        state.writes += 1;
        Ok(())
    }

    async fn get_transaction_by_id(&self, id: &str) -> StoreResult<Transaction> {
        let state = self.enter().await?;
        state
            .transactions
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let state = self.enter().await?;
        Ok(state
            .customers
            .values()
            .find(|customer| customer.email == email)
            .cloned())
    }

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut state = self.enter().await?;
        if state.customers.values().any(|c| c.email == customer.email) {
            return Err(StoreError::StateConflict(format!(
                "email {} already registered",
                customer.email
            )));
        }
        state.customers.insert(customer.id, customer.clone());
        state.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn settle_payment(&self, settlement: &PaymentSettlement) -> StoreResult<()> {
        let mut state = self.enter().await?;
        let order = &settlement.order;

        // Validate everything before touching anything.
        let stored = state.orders.get(&order.id).ok_or(StoreError::NotFound)?;
        if stored.payment_status != PaymentStatus::Pending {
            return Err(StoreError::StateConflict(format!(
                "order {} is no longer pending",
                order.id
            )));
        }
        if !state.transactions.contains_key(&settlement.transaction.id) {
            return Err(StoreError::NotFound);
        }

        let mut wanted: HashMap<Uuid, i32> = HashMap::new();
        for item in &order.items {
            *wanted.entry(item.product_id).or_default() += item.quantity;
        }
        for item in &order.items {
            let product = state
                .products
                .get(&item.product_id)
                .ok_or(StoreError::ProductMissing(item.product_id))?;
            let requested = wanted.get(&item.product_id).copied().unwrap_or_default();
            if product.stock < requested {
                return Err(StoreError::StockConflict {
                    product_id: item.product_id,
                    requested,
                    available: product.stock,
                });
            }
        }

        for (product_id, quantity) in wanted {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock -= quantity;
            }
        }
        state.orders.insert(order.id, order.clone());
        state
            .transactions
            .insert(settlement.transaction.id.clone(), settlement.transaction.clone());
        if let Some(cart) = state
            .carts
            .values_mut()
            .find(|cart| cart.customer_id == settlement.customer_id)
        {
            cart.items.clear();
        }
        state.writes += 1;
        Ok(())
    }

    async fn discard_order(&self, order_id: Uuid) -> StoreResult<()> {
        let mut state = self.enter().await?;
        state.orders.remove(&order_id);
        state.order_sequence.retain(|id| *id != order_id);
        state
            .transactions
            .retain(|_, transaction| transaction.order_id != order_id);
        state.writes += 1;
        Ok(())
    }
}
