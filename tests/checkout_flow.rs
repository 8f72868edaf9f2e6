use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use checkout_api::{
    error::{AppError, Lookup},
    middleware::auth::CustomerIdentity,
    models::{OrderStatus, PaymentStatus, Product},
    services::{deadline::Deadline, order_service::OrderService, pricing::Pricing},
    store::{CartStore, InMemoryStore, OrderStore, ProductStore},
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn service(store: &Arc<InMemoryStore>) -> OrderService<InMemoryStore> {
    OrderService::new(Arc::clone(store), Pricing::default())
}

fn customer(email: &str) -> CustomerIdentity {
    CustomerIdentity {
        id: Uuid::new_v4(),
        email: email.to_string(),
        address: "Jl. Thamrin 10, Jakarta".to_string(),
    }
}

async fn add_product(
    store: &InMemoryStore,
    name: &str,
    price: Decimal,
    stock: i32,
) -> anyhow::Result<Product> {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category: "merch".to_string(),
        description: None,
        price,
        stock,
        created_at: now,
        updated_at: now,
    };
    store.insert_product(&product).await?;
    Ok(product)
}

async fn fill_cart(
    store: &InMemoryStore,
    customer: &CustomerIdentity,
    lines: &[(Uuid, i32)],
) -> anyhow::Result<()> {
    let cart = store.create_cart(customer.id).await?;
    for (product_id, quantity) in lines {
        store.add_cart_item(cart.id, *product_id, *quantity).await?;
    }
    Ok(())
}

#[tokio::test]
async fn checkout_prices_reference_cart() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let a = add_product(&store, "Product A", Decimal::new(100, 0), 10).await?;
    let b = add_product(&store, "Product B", Decimal::new(50, 0), 10).await?;
    let buyer = customer("buyer@example.com");
    fill_cart(&store, &buyer, &[(a.id, 2), (b.id, 1)]).await?;

    let order = service(&store).checkout(&buyer, Deadline::none()).await?;

    assert_eq!(order.subtotal, Decimal::new(250, 0));
    assert_eq!(order.shipping_fee, Decimal::new(8_000, 0));
    assert_eq!(order.tax, Decimal::new(25, 0));
    assert_eq!(order.discount, Decimal::new(125, 1));
    assert_eq!(order.total, Decimal::new(82_625, 1));
    assert_eq!(
        order.total,
        order.subtotal + order.shipping_fee + order.tax - order.discount
    );

    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.payment_date, None);
    assert_eq!(order.shipping_address, buyer.address);
    assert_eq!(order.billing_address, buyer.address);
    assert_eq!(order.order_by, buyer.email);
    assert_eq!(order.items.len(), 2);

    let transaction = store.get_transaction_by_id(&order.payment_id).await?;
    assert_eq!(transaction.order_id, order.id);
    assert_eq!(transaction.amount, order.total);
    assert_eq!(transaction.payment_status, PaymentStatus::Pending);

    // The cart is only cleared once payment is confirmed.
    let cart = store.get_cart_by_customer(buyer.id).await?;
    assert_eq!(cart.items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn subtotal_is_exact_sum_of_line_totals() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let prices = [Decimal::new(1999, 2), Decimal::new(5, 1), Decimal::new(123_456, 3)];
    let quantities = [3, 7, 2];

    let buyer = customer("decimals@example.com");
    let mut lines = Vec::new();
    let mut expected = Decimal::ZERO;
    for (i, (price, qty)) in prices.iter().zip(quantities).enumerate() {
        let product = add_product(&store, &format!("Item {i}"), *price, 100).await?;
        lines.push((product.id, qty));
        expected += *price * Decimal::from(qty);
    }
    fill_cart(&store, &buyer, &lines).await?;

    let order = service(&store).checkout(&buyer, Deadline::none()).await?;

    assert_eq!(order.subtotal, expected);
    assert_eq!(order.subtotal, Decimal::new(310_382, 3));
    for item in &order.items {
        assert_eq!(item.subtotal, item.product_price * Decimal::from(item.quantity));
    }
    assert_eq!(
        order.total,
        order.subtotal + order.shipping_fee + order.tax - order.discount
    );
    Ok(())
}

#[tokio::test]
async fn empty_cart_is_rejected_without_writes() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let buyer = customer("empty@example.com");
    store.create_cart(buyer.id).await?;
    let writes = store.write_count().await;

    let err = service(&store)
        .checkout(&buyer, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CartEmpty));
    assert_eq!(store.write_count().await, writes);
    assert_eq!(store.order_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn customer_without_cart_gets_cart_empty() {
    let store = Arc::new(InMemoryStore::new());
    let err = service(&store)
        .checkout(&customer("new@example.com"), Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CartEmpty));
}

#[tokio::test]
async fn unavailable_store_is_a_cart_retrieval_failure() {
    let store = Arc::new(InMemoryStore::new());
    store.set_unavailable(true).await;

    let err = service(&store)
        .checkout(&customer("down@example.com"), Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CartRetrievalFailed(Lookup::Store(_))));
}

#[tokio::test]
async fn missing_product_fails_checkout() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let buyer = customer("ghost@example.com");
    let ghost = Uuid::new_v4();
    fill_cart(&store, &buyer, &[(ghost, 1)]).await?;

    let err = service(&store)
        .checkout(&buyer, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProductNotFound(id) if id == ghost));
    assert_eq!(store.order_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn order_numbers_and_payment_ids_are_unique() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Ferris Mug", Decimal::new(120, 0), 100).await?;
    let buyer = customer("repeat@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    let service = service(&store);

    let mut numbers = HashSet::new();
    let mut payment_ids = HashSet::new();
    for _ in 0..20 {
        let order = service.checkout(&buyer, Deadline::none()).await?;
        assert!(order.order_number.starts_with("ORD-"));
        assert!(order.payment_id.starts_with("PAY-"));
        assert!(numbers.insert(order.order_number));
        assert!(payment_ids.insert(order.payment_id));
    }
    assert_eq!(store.transaction_count().await, 20);
    Ok(())
}

#[tokio::test]
async fn failed_transaction_write_discards_the_order() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Axum Hoodie", Decimal::new(550, 0), 5).await?;
    let buyer = customer("flaky@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    store.set_fail_transaction_writes(true).await;

    let err = service(&store)
        .checkout(&buyer, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::PersistenceFailed {
            action: "create transaction",
            ..
        }
    ));
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.transaction_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn checkout_rejects_amounts_beyond_decimal_range() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let price = Decimal::MAX / Decimal::TWO + Decimal::ONE;
    let product = add_product(&store, "Crown Jewels", price, 5).await?;
    let buyer = customer("whale@example.com");
    fill_cart(&store, &buyer, &[(product.id, 2)]).await?;

    let err = service(&store)
        .checkout(&buyer, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.transaction_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_order_write_is_discarded() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Slow Ack", Decimal::new(10, 0), 10).await?;
    let buyer = customer("ack@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    store
        .set_order_ack_delay(Some(Duration::from_millis(300)))
        .await;

    let err = service(&store)
        .checkout(&buyer, Deadline::after(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.transaction_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn confirm_payment_takes_stock_and_clears_cart() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let a = add_product(&store, "Product A", Decimal::new(100, 0), 5).await?;
    let b = add_product(&store, "Product B", Decimal::new(50, 0), 3).await?;
    let buyer = customer("payer@example.com");
    fill_cart(&store, &buyer, &[(a.id, 2), (b.id, 1)]).await?;
    let service = service(&store);

    let order = service.checkout(&buyer, Deadline::none()).await?;
    let paid = service
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await?;

    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order_status, OrderStatus::Confirmed);
    assert!(paid.payment_date.is_some());
    assert_eq!(paid.total, order.total);

    let stored = store.get_order_by_id(order.id).await?;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    let transaction = store.get_transaction_by_id(&order.payment_id).await?;
    assert_eq!(transaction.payment_status, PaymentStatus::Paid);
    assert_eq!(transaction.amount, order.total);

    assert_eq!(store.get_product(a.id).await?.stock, 3);
    assert_eq!(store.get_product(b.id).await?.stock, 2);
    assert!(store.get_cart_by_customer(buyer.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn confirm_uses_order_items_not_later_cart_additions() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let a = add_product(&store, "Product A", Decimal::new(100, 0), 5).await?;
    let late = add_product(&store, "Late Addition", Decimal::new(10, 0), 5).await?;
    let buyer = customer("late@example.com");
    fill_cart(&store, &buyer, &[(a.id, 1)]).await?;
    let service = service(&store);

    let order = service.checkout(&buyer, Deadline::none()).await?;
    let cart = store.get_cart_by_customer(buyer.id).await?;
    store.add_cart_item(cart.id, late.id, 2).await?;

    service
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await?;

    assert_eq!(store.get_product(a.id).await?.stock, 4);
    assert_eq!(store.get_product(late.id).await?.stock, 5);
    Ok(())
}

#[tokio::test]
async fn unknown_order_has_no_side_effects() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let writes = store.write_count().await;

    let err = service(&store)
        .confirm_payment(&customer("nobody@example.com"), Uuid::new_v4(), Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OrderRetrievalFailed(Lookup::NotFound)));
    assert_eq!(store.write_count().await, writes);
    Ok(())
}

#[tokio::test]
async fn order_without_transaction_fails_confirmation() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Ferris Mug", Decimal::new(120, 0), 5).await?;
    let buyer = customer("orphan@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    let service = service(&store);
    let placed = service.checkout(&buyer, Deadline::none()).await?;

    let mut orphan = placed.clone();
    orphan.id = Uuid::new_v4();
    orphan.order_number = format!("ORD-{}", Uuid::new_v4());
    orphan.payment_id = format!("PAY-{}", Uuid::new_v4());
    store.create_order(&orphan).await?;

    let err = service
        .confirm_payment(&buyer, orphan.id, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::TransactionRetrievalFailed(Lookup::NotFound)
    ));
    assert_eq!(store.get_product(product.id).await?.stock, 5);
    assert_eq!(
        store.get_order_by_id(orphan.id).await?.payment_status,
        PaymentStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_leaves_everything_untouched() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let plenty = add_product(&store, "Plenty", Decimal::new(10, 0), 50).await?;
    let scarce = add_product(&store, "Scarce", Decimal::new(10, 0), 2).await?;
    let buyer = customer("greedy@example.com");
    fill_cart(&store, &buyer, &[(plenty.id, 1), (scarce.id, 3)]).await?;
    let service = service(&store);

    let order = service.checkout(&buyer, Deadline::none()).await?;
    let err = service
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::StockUnavailable {
            product_id,
            requested: 3,
            available: 2,
        } if product_id == scarce.id
    ));
    assert_eq!(store.get_product(plenty.id).await?.stock, 50);
    assert_eq!(store.get_product(scarce.id).await?.stock, 2);
    assert_eq!(
        store.get_order_by_id(order.id).await?.payment_status,
        PaymentStatus::Pending
    );
    assert_eq!(store.get_cart_by_customer(buyer.id).await?.items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_confirms_do_not_oversell() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let last = add_product(&store, "Last One", Decimal::new(99, 0), 1).await?;
    let first_buyer = customer("first@example.com");
    let second_buyer = customer("second@example.com");
    fill_cart(&store, &first_buyer, &[(last.id, 1)]).await?;
    fill_cart(&store, &second_buyer, &[(last.id, 1)]).await?;
    let service = service(&store);

    let first_order = service.checkout(&first_buyer, Deadline::none()).await?;
    let second_order = service.checkout(&second_buyer, Deadline::none()).await?;

    let (first, second) = tokio::join!(
        service.confirm_payment(&first_buyer, first_order.id, Deadline::none()),
        service.confirm_payment(&second_buyer, second_order.id, Deadline::none()),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let stock_failures = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::StockUnavailable { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(stock_failures, 1);
    assert_eq!(store.get_product(last.id).await?.stock, 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_confirms_on_separate_tasks_do_not_oversell() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let last = add_product(&store, "Last One", Decimal::new(99, 0), 1).await?;
    let service = service(&store);

    let mut handles = Vec::new();
    for i in 0..4 {
        let buyer = customer(&format!("buyer{i}@example.com"));
        fill_cart(&store, &buyer, &[(last.id, 1)]).await?;
        let order = service.checkout(&buyer, Deadline::none()).await?;
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .confirm_payment(&buyer, order.id, Deadline::none())
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(AppError::StockUnavailable { .. }) => {}
            Err(other) => anyhow::bail!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(store.get_product(last.id).await?.stock, 0);
    Ok(())
}

#[tokio::test]
async fn paying_twice_is_rejected() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Ferris Mug", Decimal::new(120, 0), 10).await?;
    let buyer = customer("twice@example.com");
    fill_cart(&store, &buyer, &[(product.id, 2)]).await?;
    let service = service(&store);

    let order = service.checkout(&buyer, Deadline::none()).await?;
    service
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await?;
    let err = service
        .confirm_payment(&buyer, order.id, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::OrderNotPending {
            status: PaymentStatus::Paid,
            ..
        }
    ));
    assert_eq!(store.get_product(product.id).await?.stock, 8);
    Ok(())
}

#[tokio::test]
async fn another_customer_cannot_confirm_the_order() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Ferris Mug", Decimal::new(120, 0), 10).await?;
    let owner = customer("owner@example.com");
    fill_cart(&store, &owner, &[(product.id, 1)]).await?;
    let service = service(&store);

    let order = service.checkout(&owner, Deadline::none()).await?;
    let err = service
        .confirm_payment(&customer("intruder@example.com"), order.id, Deadline::none())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OrderRetrievalFailed(Lookup::NotFound)));
    assert_eq!(store.get_product(product.id).await?.stock, 10);
    Ok(())
}

#[tokio::test]
async fn expired_deadline_cancels_checkout() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Slow Item", Decimal::new(10, 0), 10).await?;
    let buyer = customer("slow@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    store.set_latency(Some(Duration::from_millis(200))).await;

    let err = service(&store)
        .checkout(&buyer, Deadline::after(Duration::from_millis(20)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    store.set_latency(None).await;
    assert_eq!(store.order_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn expired_deadline_cancels_confirmation_without_partial_writes() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Slow Item", Decimal::new(10, 0), 10).await?;
    let buyer = customer("slowpay@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    let service = service(&store);
    let order = service.checkout(&buyer, Deadline::none()).await?;

    store.set_latency(Some(Duration::from_millis(200))).await;
    let err = service
        .confirm_payment(&buyer, order.id, Deadline::after(Duration::from_millis(20)))
        .await
        .unwrap_err();
    store.set_latency(None).await;

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(store.get_product(product.id).await?.stock, 10);
    assert_eq!(
        store.get_order_by_id(order.id).await?.payment_status,
        PaymentStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn order_history_is_scoped_and_paginated() -> anyhow::Result<()> {
    use checkout_api::routes::params::Pagination;

    let store = Arc::new(InMemoryStore::new());
    let product = add_product(&store, "Ferris Mug", Decimal::new(120, 0), 100).await?;
    let buyer = customer("history@example.com");
    let other = customer("other@example.com");
    fill_cart(&store, &buyer, &[(product.id, 1)]).await?;
    fill_cart(&store, &other, &[(product.id, 1)]).await?;
    let service = service(&store);

    let mut placed = Vec::new();
    for _ in 0..3 {
        placed.push(service.checkout(&buyer, Deadline::none()).await?);
    }
    let foreign = service.checkout(&other, Deadline::none()).await?;

    let (first_page, meta) = service
        .list_orders(
            &buyer,
            &Pagination {
                page: Some(1),
                per_page: Some(2),
            },
        )
        .await?;
    assert_eq!(first_page.len(), 2);
    assert_eq!(meta.total, Some(3));
    assert_eq!(first_page[0].id, placed[2].id);
    assert!(first_page.iter().all(|order| order.customer_id == buyer.id));

    let fetched = service.get_order(&buyer, placed[0].id).await?;
    assert_eq!(fetched.order_number, placed[0].order_number);

    let err = service.get_order(&buyer, foreign.id).await.unwrap_err();
    assert!(matches!(err, AppError::OrderRetrievalFailed(Lookup::NotFound)));
    Ok(())
}
