use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, Lookup},
    middleware::auth::CustomerIdentity,
    models::{Order, OrderItem, OrderStatus, PaymentStatus, Transaction},
    response::Meta,
    routes::params::Pagination,
    services::{deadline::Deadline, pricing::Pricing},
    store::{CommerceStore, PaymentSettlement, StoreError},
};

/// Checkout and payment confirmation over a [`CommerceStore`].
pub struct OrderService<S> {
    store: Arc<S>,
    pricing: Pricing,
}

impl<S> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pricing: self.pricing.clone(),
        }
    }
}

impl<S: CommerceStore> OrderService<S> {
    pub fn new(store: Arc<S>, pricing: Pricing) -> Self {
        Self { store, pricing }
    }

    /// Converts the customer's cart into a priced order plus a pending
    /// transaction. The cart is left untouched.
    #[tracing::instrument(skip_all, fields(customer_id = %customer.id))]
    pub async fn checkout(
        &self,
        customer: &CustomerIdentity,
        deadline: Deadline,
    ) -> AppResult<Order> {
        tracing::debug!("checkout started");

        let cart = match deadline
            .guard(self.store.get_cart_by_customer(customer.id))
            .await?
        {
            Ok(cart) => cart,
            Err(StoreError::NotFound) => return Err(AppError::CartEmpty),
            Err(err) => return Err(AppError::CartRetrievalFailed(err.into())),
        };
        if cart.is_empty() {
            return Err(AppError::CartEmpty);
        }

        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let product = deadline
                .guard(self.store.get_product(line.product_id))
                .await?
                .map_err(|err| match err {
                    StoreError::NotFound | StoreError::ProductMissing(_) => {
                        AppError::ProductNotFound(line.product_id)
                    }
                    other => AppError::ProductRetrievalFailed(line.product_id, other.to_string()),
                })?;
            let item = OrderItem::snapshot(&product, line.quantity).ok_or_else(amount_overflow)?;
            items.push(item);
        }

        let quote = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.subtotal))
            .and_then(|subtotal| self.pricing.quote(&cart.items, subtotal))
            .ok_or_else(amount_overflow)?;
        let now = Utc::now();

        let order = Order {
            id: Uuid::new_v4(),
            order_number: format!("ORD-{}", Uuid::new_v4()),
            customer_id: customer.id,
            order_by: customer.email.clone(),
            shipping_address: customer.address.clone(),
            billing_address: customer.address.clone(),
            order_date: now,
            items,
            subtotal: quote.subtotal,
            shipping_fee: quote.shipping_fee,
            tax: quote.tax,
            discount: quote.discount,
            total: quote.total,
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: format!("PAY-{}", Uuid::new_v4()),
            payment_date: None,
            currency: self.pricing.currency().to_string(),
        };

        match deadline.guard(self.store.create_order(&order)).await {
            Ok(result) => result.map_err(AppError::persistence("create order"))?,
            // The write may have landed before the deadline fired.
            Err(err) => {
                self.discard(order.id).await;
                return Err(err);
            }
        }

        let transaction = Transaction::pending_for(&order);
        let recorded = deadline
            .guard(self.store.create_transaction(&transaction))
            .await
            .and_then(|result| result.map_err(AppError::persistence("create transaction")));
        if let Err(err) = recorded {
            self.discard(order.id).await;
            return Err(err);
        }

        tracing::info!(
            order_number = %order.order_number,
            total = %order.total,
            "checkout completed"
        );
        Ok(order)
    }

    /// Marks the order paid, takes stock for its items and empties the cart,
    /// all in one settlement.
    #[tracing::instrument(skip_all, fields(customer_id = %customer.id, order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        customer: &CustomerIdentity,
        order_id: Uuid,
        deadline: Deadline,
    ) -> AppResult<Order> {
        let mut order = match deadline.guard(self.store.get_order_by_id(order_id)).await? {
            Ok(order) => order,
            Err(StoreError::InvalidPaymentStatus(status)) => {
                return Err(AppError::InvalidPaymentStatus(status));
            }
            Err(err) => return Err(AppError::OrderRetrievalFailed(err.into())),
        };
        if order.customer_id != customer.id {
            return Err(AppError::OrderRetrievalFailed(Lookup::NotFound));
        }
        if !order.is_awaiting_payment() {
            return Err(AppError::OrderNotPending {
                order_id,
                status: order.payment_status,
            });
        }

        let mut transaction = deadline
            .guard(self.store.get_transaction_by_id(&order.payment_id))
            .await?
            .map_err(|err| AppError::TransactionRetrievalFailed(err.into()))?;

        let paid_at = Utc::now();
        order.mark_paid(paid_at);
        transaction.mark_paid(paid_at);

        let settlement = PaymentSettlement {
            order,
            transaction,
            customer_id: customer.id,
        };
        deadline
            .guard(self.store.settle_payment(&settlement))
            .await?
            .map_err(|err| settlement_error(order_id, err))?;

        tracing::info!(payment_id = %settlement.transaction.id, "payment confirmed");
        Ok(settlement.order)
    }

    pub async fn get_order(&self, customer: &CustomerIdentity, order_id: Uuid) -> AppResult<Order> {
        let order = self
            .store
            .get_order_by_id(order_id)
            .await
            .map_err(|err| AppError::OrderRetrievalFailed(err.into()))?;
        if order.customer_id != customer.id {
            return Err(AppError::OrderRetrievalFailed(Lookup::NotFound));
        }
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        customer: &CustomerIdentity,
        pagination: &Pagination,
    ) -> AppResult<(Vec<Order>, Meta)> {
        let (page, per_page, offset) = pagination.normalize();
        let page_of = self
            .store
            .list_orders_by_customer(customer.id, per_page as u64, offset as u64)
            .await
            .map_err(|err| AppError::OrderRetrievalFailed(err.into()))?;

        let meta = Meta::for_page(page, per_page, page_of.total);
        Ok((page_of.items, meta))
    }

    /// Removes an order whose checkout did not complete. Runs without the
    /// request deadline so an expired request still cleans up.
    async fn discard(&self, order_id: Uuid) {
        tracing::warn!(%order_id, "checkout incomplete, discarding order");
        if let Err(err) = self.store.discard_order(order_id).await {
            tracing::error!(%order_id, error = %err, "failed to discard orphaned order");
        }
    }
}

fn amount_overflow() -> AppError {
    AppError::BadRequest("order amount exceeds the supported range".into())
}

fn settlement_error(order_id: Uuid, err: StoreError) -> AppError {
    match err {
        StoreError::StockConflict {
            product_id,
            requested,
            available,
        } => {
            tracing::warn!(%product_id, requested, available, "stock conflict on payment");
            AppError::StockUnavailable {
                product_id,
                requested,
                available,
            }
        }
        StoreError::ProductMissing(product_id) => AppError::ProductNotFound(product_id),
        StoreError::StateConflict(_) => AppError::OrderNotPending {
            order_id,
            status: PaymentStatus::Paid,
        },
        StoreError::InvalidPaymentStatus(status) => AppError::InvalidPaymentStatus(status),
        other => AppError::persistence("settle payment")(other),
    }
}
