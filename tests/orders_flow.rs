use std::sync::Arc;

use chrono::Utc;
use checkout_api::{
    config::PricingConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    error::AppError,
    middleware::auth::CustomerIdentity,
    models::{Customer, PaymentStatus, Product},
    services::{
        cart_service::CartService, deadline::Deadline, order_service::OrderService,
        pricing::Pricing,
    },
    store::{CartStore, CustomerStore, OrderStore, OrmStore, ProductStore},
};
use rust_decimal::Decimal;
use uuid::Uuid;

// Integration flow against Postgres: cart -> checkout -> pay, then a second
// buyer loses the race for the remaining stock.
#[tokio::test]
async fn checkout_and_payment_against_postgres() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    let store = Arc::new(OrmStore::new(create_orm_conn(&pool)));
    let orders = OrderService::new(
        Arc::clone(&store),
        Pricing::from_config(&PricingConfig::default()),
    );
    let carts = CartService::new(Arc::clone(&store));

    let buyer = create_customer(&store, "buyer").await?;
    let rival = create_customer(&store, "rival").await?;

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        name: format!("Test Widget {}", Uuid::new_v4()),
        category: "widgets".into(),
        description: Some("A product for testing".into()),
        price: Decimal::new(100, 0),
        stock: 3,
        created_at: now,
        updated_at: now,
    };
    store.insert_product(&product).await?;

    carts.add_to_cart(&buyer, product.id, 2).await?;
    carts.add_to_cart(&rival, product.id, 2).await?;

    let order = orders.checkout(&buyer, Deadline::none()).await?;
    assert_eq!(order.subtotal, Decimal::new(200, 0));
    assert_eq!(
        order.total,
        order.subtotal + order.shipping_fee + order.tax - order.discount
    );
    let rival_order = orders.checkout(&rival, Deadline::none()).await?;

    let stored = store.get_order_by_id(order.id).await?;
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.total, order.total);

    let paid = orders
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await?;
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(store.get_product(product.id).await?.stock, 1);
    assert!(store.get_cart_by_customer(buyer.id).await?.is_empty());

    let transaction = store.get_transaction_by_id(&order.payment_id).await?;
    assert_eq!(transaction.payment_status, PaymentStatus::Paid);

    let err = orders
        .confirm_payment(&rival, rival_order.id, Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StockUnavailable { available: 1, .. }));
    assert_eq!(store.get_product(product.id).await?.stock, 1);
    assert_eq!(
        store.get_order_by_id(rival_order.id).await?.payment_status,
        PaymentStatus::Pending
    );

    Ok(())
}

async fn create_customer(store: &OrmStore, label: &str) -> anyhow::Result<CustomerIdentity> {
    let customer = Customer {
        id: Uuid::new_v4(),
        email: format!("{label}-{}@example.com", Uuid::new_v4()),
        password_hash: "not-a-real-hash".into(),
        address: format!("{label} street 1"),
        role: "customer".into(),
        created_at: Utc::now(),
    };
    store.create_customer(&customer).await?;

    Ok(CustomerIdentity {
        id: customer.id,
        email: customer.email,
        address: customer.address,
    })
}
