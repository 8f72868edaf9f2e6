use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Product,
    response::Meta,
    routes::params::ProductQuery,
    store::{ProductStore, StoreError},
};

pub struct ProductService<S> {
    store: Arc<S>,
}

impl<S> Clone for ProductService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ProductStore> ProductService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list_products(&self, query: &ProductQuery) -> AppResult<(Vec<Product>, Meta)> {
        let (page, per_page, offset) = query.pagination().normalize();
        let category = query.category.as_deref().filter(|c| !c.is_empty());

        let page_of = self
            .store
            .list_products(category, per_page as u64, offset as u64)
            .await
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;

        let meta = Meta::for_page(page, per_page, page_of.total);
        Ok((page_of.items, meta))
    }

    pub async fn get_product(&self, id: Uuid) -> AppResult<Product> {
        self.store.get_product(id).await.map_err(|err| match err {
            StoreError::NotFound => AppError::ProductNotFound(id),
            other => AppError::ProductRetrievalFailed(id, other.to_string()),
        })
    }
}
