use std::sync::Arc;

use chrono::Utc;
use checkout_api::{
    error::AppError,
    middleware::auth::CustomerIdentity,
    models::Product,
    routes::params::ProductQuery,
    services::{
        cart_service::{CartService, MAX_LINE_QUANTITY},
        product_service::ProductService,
    },
    store::{InMemoryStore, ProductStore},
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn customer() -> CustomerIdentity {
    CustomerIdentity {
        id: Uuid::new_v4(),
        email: "cart@example.com".to_string(),
        address: "Jl. Gatot Subroto 5, Jakarta".to_string(),
    }
}

async fn add_product(
    store: &InMemoryStore,
    name: &str,
    category: &str,
    price: i64,
) -> anyhow::Result<Product> {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category: category.to_string(),
        description: Some(format!("{name} for testing")),
        price: Decimal::from(price),
        stock: 10,
        created_at: now,
        updated_at: now,
    };
    store.insert_product(&product).await?;
    Ok(product)
}

#[tokio::test]
async fn cart_is_created_lazily_and_merges_lines() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let mug = add_product(&store, "Ferris Mug", "merch", 120).await?;
    let carts = CartService::new(Arc::clone(&store));
    let buyer = customer();

    let empty = carts.get_cart(&buyer).await?;
    assert!(empty.cart_id.is_none());
    assert!(empty.items.is_empty());

    carts.add_to_cart(&buyer, mug.id, 1).await?;
    let line = carts.add_to_cart(&buyer, mug.id, 2).await?;
    assert_eq!(line.quantity, 3);

    let view = carts.get_cart(&buyer).await?;
    assert!(view.cart_id.is_some());
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product.id, mug.id);
    assert_eq!(view.items[0].quantity, 3);
    Ok(())
}

#[tokio::test]
async fn invalid_additions_are_rejected() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let mug = add_product(&store, "Ferris Mug", "merch", 120).await?;
    let carts = CartService::new(Arc::clone(&store));
    let buyer = customer();

    let err = carts.add_to_cart(&buyer, mug.id, 0).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let missing = Uuid::new_v4();
    let err = carts.add_to_cart(&buyer, missing, 1).await.unwrap_err();
    assert!(matches!(err, AppError::ProductNotFound(id) if id == missing));

    assert!(carts.get_cart(&buyer).await?.cart_id.is_none());
    Ok(())
}

#[tokio::test]
async fn line_quantity_is_capped() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let mug = add_product(&store, "Ferris Mug", "merch", 120).await?;
    let carts = CartService::new(Arc::clone(&store));
    let buyer = customer();

    let err = carts.add_to_cart(&buyer, mug.id, i32::MAX).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    carts.add_to_cart(&buyer, mug.id, MAX_LINE_QUANTITY).await?;
    let err = carts.add_to_cart(&buyer, mug.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let view = carts.get_cart(&buyer).await?;
    assert_eq!(view.items[0].quantity, MAX_LINE_QUANTITY);
    Ok(())
}

#[tokio::test]
async fn removing_lines() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let mug = add_product(&store, "Ferris Mug", "merch", 120).await?;
    let hoodie = add_product(&store, "Axum Hoodie", "apparel", 550).await?;
    let carts = CartService::new(Arc::clone(&store));
    let buyer = customer();

    let err = carts.remove_from_cart(&buyer, mug.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    carts.add_to_cart(&buyer, mug.id, 1).await?;
    carts.add_to_cart(&buyer, hoodie.id, 1).await?;
    carts.remove_from_cart(&buyer, mug.id).await?;

    let view = carts.get_cart(&buyer).await?;
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product.id, hoodie.id);

    let err = carts.remove_from_cart(&buyer, mug.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn catalog_filters_by_category_and_paginates() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    for i in 0..5 {
        add_product(&store, &format!("Sticker {i}"), "stickers", 5).await?;
    }
    let hoodie = add_product(&store, "Axum Hoodie", "apparel", 550).await?;
    let catalog = ProductService::new(Arc::clone(&store));

    let (items, meta) = catalog
        .list_products(&ProductQuery {
            page: Some(2),
            per_page: Some(2),
            category: Some("stickers".into()),
        })
        .await?;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|p| p.category == "stickers"));
    assert_eq!(meta.total, Some(5));
    assert_eq!(meta.page, Some(2));

    let (all, meta) = catalog.list_products(&ProductQuery::default()).await?;
    assert_eq!(all.len(), 6);
    assert_eq!(meta.total, Some(6));

    assert_eq!(catalog.get_product(hoodie.id).await?.name, "Axum Hoodie");
    let err = catalog.get_product(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::ProductNotFound(_)));
    Ok(())
}
