use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::{
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        customers::{ActiveModel as CustomerActive, Column as CustomerCol, Entity as Customers, Model as CustomerModel},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products, Model as ProductModel},
        transactions::{ActiveModel as TransactionActive, Entity as Transactions, Column as TransactionCol, Model as TransactionModel},
    },
    models::{Cart, CartItem, Customer, Order, OrderItem, OrderStatus, PaymentStatus, Product, Transaction},
    store::{
        CartStore, CommerceStore, CustomerStore, OrderStore, Page, PaymentSettlement, ProductStore,
        StoreError, StoreResult,
    },
};

/// SeaORM-backed store over Postgres.
#[derive(Debug, Clone)]
pub struct OrmStore {
    conn: DatabaseConnection,
}

impl OrmStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProductStore for OrmStore {
    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        find_product(&self.conn, id)
            .await?
            .map(product_from_entity)
            .ok_or(StoreError::NotFound)
    }

    async fn list_products(
        &self,
        category: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Product>> {
        let mut condition = Condition::all();
        if let Some(category) = category {
            condition = condition.add(ProductCol::Category.eq(category));
        }

        let finder = Products::find()
            .filter(condition)
            .order_by_asc(ProductCol::Name);
        let total = finder.clone().count(&self.conn).await?;
        let items = finder
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(product_from_entity)
            .collect();

        Ok(Page { items, total })
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        ProductActive {
            id: Set(product.id),
            name: Set(product.name.clone()),
            category: Set(product.category.clone()),
            description: Set(product.description.clone()),
            price: Set(product.price),
            stock: Set(product.stock),
            created_at: Set(product.created_at.into()),
            updated_at: Set(product.updated_at.into()),
        }
        .insert(&self.conn)
        .await?;
        Ok(())
    }

    async fn update_stock(&self, id: Uuid, new_stock: i32) -> StoreResult<()> {
        if new_stock < 0 {
            return Err(StoreError::StateConflict(format!(
                "stock for product {id} cannot be set to {new_stock}"
            )));
        }

        let result = Products::update_many()
            .col_expr(ProductCol::Stock, Expr::value(new_stock))
            .col_expr(ProductCol::UpdatedAt, Expr::value(now()))
            .filter(ProductCol::Id.eq(id))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for OrmStore {
    async fn get_cart_by_customer(&self, customer_id: Uuid) -> StoreResult<Cart> {
        let cart = Carts::find()
            .filter(CartCol::CustomerId.eq(customer_id))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let items = CartItems::find()
            .filter(CartItemCol::CartId.eq(cart.id))
            .order_by_asc(CartItemCol::CreatedAt)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|item| CartItem {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();

        Ok(Cart {
            id: cart.id,
            customer_id: cart.customer_id,
            items,
        })
    }

    async fn create_cart(&self, customer_id: Uuid) -> StoreResult<Cart> {
        // Two first-time adds may race; the unique customer_id keeps one cart.
        Carts::insert(CartActive {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: NotSet,
            updated_at: NotSet,
        })
        .on_conflict(
            OnConflict::column(CartCol::CustomerId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;

        self.get_cart_by_customer(customer_id).await
    }

    async fn add_cart_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        CartItems::insert(CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: NotSet,
        })
        .on_conflict(
            OnConflict::columns([CartItemCol::CartId, CartItemCol::ProductId])
                .value(
                    CartItemCol::Quantity,
                    Expr::col((CartItems, CartItemCol::Quantity)).add(quantity),
                )
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;

        Carts::update_many()
            .col_expr(CartCol::UpdatedAt, Expr::value(now()))
            .filter(CartCol::Id.eq(cart_id))
            .exec(&self.conn)
            .await?;

        let item = CartItems::find()
            .filter(CartItemCol::CartId.eq(cart_id))
            .filter(CartItemCol::ProductId.eq(product_id))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(CartItem {
            product_id: item.product_id,
            quantity: item.quantity,
        })
    }

    async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        let result = CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart_id))
            .filter(CartItemCol::ProductId.eq(product_id))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        clear_cart_items(&self.conn, cart_id).await
    }
}

#[async_trait]
impl OrderStore for OrmStore {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let txn = self.conn.begin().await?;
        insert_order(&txn, order).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        order_active(order).update(&self.conn).await?;
        Ok(())
    }

    async fn get_order_by_id(&self, id: Uuid) -> StoreResult<Order> {
        let order = Orders::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(&self.conn)
            .await?;

        order_from_entity(order, items)
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Order>> {
        let finder = Orders::find()
            .filter(OrderCol::CustomerId.eq(customer_id))
            .order_by_desc(OrderCol::CreatedAt);
        let total = finder.clone().count(&self.conn).await?;
        let orders = finder.limit(limit).offset(offset).all(&self.conn).await?;

        let ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        if !ids.is_empty() {
            for item in OrderItems::find()
                .filter(OrderItemCol::OrderId.is_in(ids))
                .all(&self.conn)
                .await?
            {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let items = orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                order_from_entity(order, items)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page { items, total })
    }

    async fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        TransactionActive {
            id: Set(transaction.id.clone()),
            order_id: Set(transaction.order_id),
            payment_status: Set(transaction.payment_status.as_str().to_string()),
            payment_date: Set(transaction.payment_date.map(Into::into)),
            amount: Set(transaction.amount),
            created_at: NotSet,
        }
        .insert(&self.conn)
        .await?;
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        write_transaction(&self.conn, transaction).await
    }

    async fn get_transaction_by_id(&self, id: &str) -> StoreResult<Transaction> {
        let model = Transactions::find_by_id(id.to_string())
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        transaction_from_entity(model)
    }
}

#[async_trait]
impl CustomerStore for OrmStore {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let customer = Customers::find()
            .filter(CustomerCol::Email.eq(email))
            .one(&self.conn)
            .await?
            .map(customer_from_entity);
        Ok(customer)
    }

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()> {
        CustomerActive {
            id: Set(customer.id),
            email: Set(customer.email.clone()),
            password_hash: Set(customer.password_hash.clone()),
            address: Set(customer.address.clone()),
            role: Set(customer.role.clone()),
            created_at: Set(customer.created_at.into()),
        }
        .insert(&self.conn)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::StateConflict(format!(
                "email {} already registered",
                customer.email
            )),
            _ => StoreError::Db(err),
        })?;
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for OrmStore {
    async fn settle_payment(&self, settlement: &PaymentSettlement) -> StoreResult<()> {
        let order = &settlement.order;
        let txn = self.conn.begin().await?;

        // Guarded on the stored status so two confirmations cannot both land.
        let result = Orders::update_many()
            .col_expr(OrderCol::PaymentStatus, Expr::value(order.payment_status.as_str()))
            .col_expr(OrderCol::OrderStatus, Expr::value(order.order_status.as_str()))
            .col_expr(
                OrderCol::PaymentDate,
                Expr::value(order.payment_date.map(DateTimeWithTimeZone::from)),
            )
            .col_expr(
                OrderCol::OrderDate,
                Expr::value(DateTimeWithTimeZone::from(order.order_date)),
            )
            .col_expr(OrderCol::UpdatedAt, Expr::value(now()))
            .filter(OrderCol::Id.eq(order.id))
            .filter(OrderCol::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::StateConflict(format!(
                "order {} is no longer pending",
                order.id
            )));
        }

        write_transaction(&txn, &settlement.transaction).await?;

        for item in &order.items {
            decrement_stock(&txn, item.product_id, item.quantity).await?;
        }

        if let Some(cart) = Carts::find()
            .filter(CartCol::CustomerId.eq(settlement.customer_id))
            .one(&txn)
            .await?
        {
            clear_cart_items(&txn, cart.id).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn discard_order(&self, order_id: Uuid) -> StoreResult<()> {
        let txn = self.conn.begin().await?;
        Transactions::delete_many()
            .filter(TransactionCol::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        OrderItems::delete_many()
            .filter(OrderItemCol::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        Orders::delete_by_id(order_id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }
}

async fn find_product<C: ConnectionTrait>(conn: &C, id: Uuid) -> StoreResult<Option<ProductModel>> {
    Ok(Products::find_by_id(id).one(conn).await?)
}

/// `UPDATE products SET stock = stock - qty WHERE id = ? AND stock >= qty`.
async fn decrement_stock<C: ConnectionTrait>(conn: &C, product_id: Uuid, quantity: i32) -> StoreResult<()> {
    if quantity <= 0 {
        return Err(StoreError::StateConflict(format!(
            "cannot take {quantity} units of product {product_id}"
        )));
    }

    let result = Products::update_many()
        .col_expr(ProductCol::Stock, Expr::col(ProductCol::Stock).sub(quantity))
        .col_expr(ProductCol::UpdatedAt, Expr::value(now()))
        .filter(ProductCol::Id.eq(product_id))
        .filter(ProductCol::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    match find_product(conn, product_id).await? {
        None => Err(StoreError::ProductMissing(product_id)),
        Some(product) => Err(StoreError::StockConflict {
            product_id,
            requested: quantity,
            available: product.stock,
        }),
    }
}

async fn clear_cart_items<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> StoreResult<()> {
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn insert_order<C: ConnectionTrait>(conn: &C, order: &Order) -> StoreResult<()> {
    let mut active = order_active(order);
    active.created_at = NotSet;
    active.updated_at = NotSet;
    active.insert(conn).await?;

    if order.items.is_empty() {
        return Ok(());
    }

    let items = order.items.iter().map(|item| OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        product_id: Set(item.product_id),
        product_name: Set(item.product_name.clone()),
        product_price: Set(item.product_price),
        quantity: Set(item.quantity),
        subtotal: Set(item.subtotal),
    });
    OrderItems::insert_many(items).exec(conn).await?;
    Ok(())
}

async fn write_transaction<C: ConnectionTrait>(conn: &C, transaction: &Transaction) -> StoreResult<()> {
    let result = Transactions::update_many()
        .col_expr(
            TransactionCol::PaymentStatus,
            Expr::value(transaction.payment_status.as_str()),
        )
        .col_expr(
            TransactionCol::PaymentDate,
            Expr::value(transaction.payment_date.map(DateTimeWithTimeZone::from)),
        )
        .filter(TransactionCol::Id.eq(transaction.id.as_str()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Order columns as an active model. Amounts are written once at insert;
/// updates carry them unchanged.
fn order_active(order: &Order) -> OrderActive {
    OrderActive {
        id: Set(order.id),
        order_number: Set(order.order_number.clone()),
        customer_id: Set(order.customer_id),
        order_by: Set(order.order_by.clone()),
        shipping_address: Set(order.shipping_address.clone()),
        billing_address: Set(order.billing_address.clone()),
        order_date: Set(order.order_date.into()),
        subtotal: Set(order.subtotal),
        shipping_fee: Set(order.shipping_fee),
        tax: Set(order.tax),
        discount: Set(order.discount),
        total: Set(order.total),
        order_status: Set(order.order_status.as_str().to_string()),
        payment_status: Set(order.payment_status.as_str().to_string()),
        payment_id: Set(order.payment_id.clone()),
        payment_date: Set(order.payment_date.map(Into::into)),
        currency: Set(order.currency.clone()),
        created_at: NotSet,
        updated_at: Set(now()),
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn parse_payment_status(raw: &str) -> StoreResult<PaymentStatus> {
    raw.parse()
        .map_err(|_| StoreError::InvalidPaymentStatus(raw.to_string()))
}

fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        category: model.category,
        description: model.description,
        price: model.price,
        stock: model.stock,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn customer_from_entity(model: CustomerModel) -> Customer {
    Customer {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        address: model.address,
        role: model.role,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn order_from_entity(model: OrderModel, items: Vec<OrderItemModel>) -> StoreResult<Order> {
    let payment_status = parse_payment_status(&model.payment_status)?;
    let order_status: OrderStatus = model
        .order_status
        .parse()
        .map_err(|err| StoreError::Corrupt(format!("order {}: {err}", model.id)))?;

    Ok(Order {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        order_by: model.order_by,
        shipping_address: model.shipping_address,
        billing_address: model.billing_address,
        order_date: model.order_date.with_timezone(&Utc),
        items: items
            .into_iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                product_name: item.product_name,
                product_price: item.product_price,
                quantity: item.quantity,
                subtotal: item.subtotal,
            })
            .collect(),
        subtotal: model.subtotal,
        shipping_fee: model.shipping_fee,
        tax: model.tax,
        discount: model.discount,
        total: model.total,
        order_status,
        payment_status,
        payment_id: model.payment_id,
        payment_date: model.payment_date.map(|dt| dt.with_timezone(&Utc)),
        currency: model.currency,
    })
}

fn transaction_from_entity(model: TransactionModel) -> StoreResult<Transaction> {
    Ok(Transaction {
        payment_status: parse_payment_status(&model.payment_status)?,
        id: model.id,
        order_id: model.order_id,
        payment_date: model.payment_date.map(|dt| dt.with_timezone(&Utc)),
        amount: model.amount,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn order_row(payment_status: &str) -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            order_number: format!("ORD-{}", Uuid::new_v4()),
            customer_id: Uuid::new_v4(),
            order_by: "buyer@example.com".into(),
            shipping_address: "Jl. Asia Afrika 8, Bandung".into(),
            billing_address: "Jl. Asia Afrika 8, Bandung".into(),
            order_date: now(),
            subtotal: Decimal::new(250, 0),
            shipping_fee: Decimal::new(8_000, 0),
            tax: Decimal::new(25, 0),
            discount: Decimal::new(125, 1),
            total: Decimal::new(82_625, 1),
            order_status: "pending".into(),
            payment_status: payment_status.into(),
            payment_id: format!("PAY-{}", Uuid::new_v4()),
            payment_date: None,
            currency: "IDR".into(),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn transaction_row(payment_status: &str) -> TransactionModel {
        TransactionModel {
            id: format!("PAY-{}", Uuid::new_v4()),
            order_id: Uuid::new_v4(),
            payment_status: payment_status.into(),
            payment_date: None,
            amount: Decimal::new(82_625, 1),
            created_at: now(),
        }
    }

    #[test]
    fn known_statuses_load() {
        let order = order_from_entity(order_row("pending"), Vec::new()).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        let transaction = transaction_from_entity(transaction_row("paid")).unwrap();
        assert_eq!(transaction.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn unknown_payment_status_is_rejected() {
        let err = order_from_entity(order_row("refunded"), Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPaymentStatus(ref s) if s == "refunded"));

        let err = transaction_from_entity(transaction_row("refunded")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPaymentStatus(ref s) if s == "refunded"));
    }

    #[test]
    fn unknown_order_status_is_corrupt() {
        let mut row = order_row("pending");
        row.order_status = "shipped".into();
        let err = order_from_entity(row, Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
