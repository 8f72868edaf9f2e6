use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Utc;
use checkout_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    models::{Customer, Product},
    store::{CustomerStore, OrmStore, ProductStore},
};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let store = OrmStore::new(create_orm_conn(&pool));

    let customer_id = ensure_customer(
        &store,
        "user@example.com",
        "user123",
        "Jl. Sudirman No. 1, Jakarta",
    )
    .await?;
    seed_products(&store).await?;

    println!("Seed completed. Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_customer(
    store: &OrmStore,
    email: &str,
    password: &str,
    address: &str,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = store.find_customer_by_email(email).await? {
        println!("Customer {email} already present");
        return Ok(existing.id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let customer = Customer {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash,
        address: address.to_string(),
        role: "customer".into(),
        created_at: Utc::now(),
    };
    store.create_customer(&customer).await?;

    println!("Created customer {email}");
    Ok(customer.id)
}

async fn seed_products(store: &OrmStore) -> anyhow::Result<()> {
    let products = [
        ("Axum Hoodie", "apparel", "Warm hoodie for Rustaceans", 550_000, 50),
        ("Ferris Mug", "merch", "Coffee tastes better with Ferris", 120_000, 100),
        ("Rust Sticker Pack", "merch", "Decorate your laptop", 50_000, 200),
        ("E-book: Async Rust", "books", "Learn async Rust patterns", 250_000, 75),
    ];

    let existing = store.list_products(None, 100, 0).await?;
    for (name, category, desc, price, stock) in products {
        if let Some(product) = existing.items.iter().find(|p| p.name == name) {
            // Re-running the seed tops stock back up.
            store.update_stock(product.id, stock).await?;
            continue;
        }

        let now = Utc::now();
        store
            .insert_product(&Product {
                id: Uuid::new_v4(),
                name: name.to_string(),
                category: category.to_string(),
                description: Some(desc.to_string()),
                price: Decimal::from(price),
                stock,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    println!("Seeded products");
    Ok(())
}
