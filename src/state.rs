use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::AppConfig,
    db::DbPool,
    middleware::auth::JwtKeys,
    services::{
        auth_service::AuthService, cart_service::CartService, order_service::OrderService,
        pricing::Pricing, product_service::ProductService,
    },
    store::OrmStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub orders: OrderService<OrmStore>,
    pub carts: CartService<OrmStore>,
    pub catalog: ProductService<OrmStore>,
    pub auth: AuthService<OrmStore>,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig, store: OrmStore) -> Self {
        let store = Arc::new(store);
        let keys = JwtKeys::new(config.jwt_secret.clone(), config.jwt_ttl_hours);
        let pricing = Pricing::from_config(&config.pricing);

        Self {
            pool,
            orders: OrderService::new(Arc::clone(&store), pricing),
            carts: CartService::new(Arc::clone(&store)),
            catalog: ProductService::new(Arc::clone(&store)),
            auth: AuthService::new(store, keys.clone()),
            keys,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
