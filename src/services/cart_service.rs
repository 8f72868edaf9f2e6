use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dto::cart::{CartLine, CartView},
    error::{AppError, AppResult},
    middleware::auth::CustomerIdentity,
    models::{Cart, CartItem},
    store::{CartStore, ProductStore, StoreError},
};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

pub struct CartService<S> {
    store: Arc<S>,
}

impl<S> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CartStore + ProductStore> CartService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Cart lines joined with their current product records. A customer
    /// without a cart gets an empty view.
    pub async fn get_cart(&self, customer: &CustomerIdentity) -> AppResult<CartView> {
        let cart = match self.find_cart(customer.id).await? {
            Some(cart) => cart,
            None => {
                return Ok(CartView {
                    cart_id: None,
                    items: Vec::new(),
                });
            }
        };

        let mut items = Vec::with_capacity(cart.items.len());
        for line in cart.items {
            let product = self.store.get_product(line.product_id).await.map_err(|err| {
                match err {
                    StoreError::NotFound => AppError::ProductNotFound(line.product_id),
                    other => AppError::ProductRetrievalFailed(line.product_id, other.to_string()),
                }
            })?;
            items.push(CartLine {
                product,
                quantity: line.quantity,
            });
        }

        Ok(CartView {
            cart_id: Some(cart.id),
            items,
        })
    }

    pub async fn add_to_cart(
        &self,
        customer: &CustomerIdentity,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<CartItem> {
        if quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
        self.store
            .get_product(product_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AppError::ProductNotFound(product_id),
                other => AppError::ProductRetrievalFailed(product_id, other.to_string()),
            })?;

        let cart = match self.find_cart(customer.id).await? {
            Some(cart) => cart,
            None => self
                .store
                .create_cart(customer.id)
                .await
                .map_err(AppError::persistence("create cart"))?,
        };

        let current = cart
            .items
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity);
        if current
            .checked_add(quantity)
            .is_none_or(|merged| merged > MAX_LINE_QUANTITY)
        {
            return Err(line_limit_exceeded());
        }

        let item = self
            .store
            .add_cart_item(cart.id, product_id, quantity)
            .await
            .map_err(|err| match err {
                StoreError::StateConflict(_) => line_limit_exceeded(),
                other => AppError::persistence("add cart item")(other),
            })?;
        tracing::debug!(customer_id = %customer.id, %product_id, quantity = item.quantity, "cart updated");
        Ok(item)
    }

    pub async fn remove_from_cart(
        &self,
        customer: &CustomerIdentity,
        product_id: Uuid,
    ) -> AppResult<()> {
        let cart = self.find_cart(customer.id).await?.ok_or(AppError::NotFound)?;
        match self.store.remove_cart_item(cart.id, product_id).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AppError::NotFound),
            Err(err) => Err(AppError::persistence("remove cart item")(err)),
        }
    }

    async fn find_cart(&self, customer_id: Uuid) -> AppResult<Option<Cart>> {
        match self.store.get_cart_by_customer(customer_id).await {
            Ok(cart) => Ok(Some(cart)),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(AppError::CartRetrievalFailed(err.into())),
        }
    }
}

fn line_limit_exceeded() -> AppError {
    AppError::BadRequest(format!(
        "a cart line cannot hold more than {MAX_LINE_QUANTITY} units"
    ))
}
