use std::sync::Arc;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::{AppError, AppResult},
    middleware::auth::JwtKeys,
    models::Customer,
    store::{CustomerStore, StoreError},
};

pub struct AuthService<S> {
    store: Arc<S>,
    keys: JwtKeys,
}

impl<S> Clone for AuthService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
        }
    }
}

impl<S: CustomerStore> AuthService<S> {
    pub fn new(store: Arc<S>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    pub async fn register(&self, payload: RegisterRequest) -> AppResult<Customer> {
        let RegisterRequest {
            email,
            password,
            address,
        } = payload;
        if email.trim().is_empty() || password.is_empty() || address.trim().is_empty() {
            return Err(AppError::BadRequest(
                "email, password and address are required".into(),
            ));
        }

        let existing = self
            .store
            .find_customer_by_email(&email)
            .await
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
        if existing.is_some() {
            return Err(AppError::BadRequest("Email is already taken".to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
            .to_string();

        let customer = Customer {
            id: Uuid::new_v4(),
            email,
            password_hash,
            address,
            role: "customer".into(),
            created_at: Utc::now(),
        };
        // A concurrent registration can win between the lookup and the insert.
        self.store
            .create_customer(&customer)
            .await
            .map_err(|err| match err {
                StoreError::StateConflict(_) => {
                    AppError::BadRequest("Email is already taken".to_string())
                }
                other => AppError::persistence("create customer")(other),
            })?;

        Ok(customer)
    }

    pub async fn login(&self, payload: LoginRequest) -> AppResult<(Customer, LoginResponse)> {
        let LoginRequest { email, password } = payload;
        let customer = self
            .store
            .find_customer_by_email(&email)
            .await
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?
            .ok_or_else(|| AppError::BadRequest("Invalid email or password".into()))?;

        let parsed_hash = PasswordHash::new(&customer.password_hash)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Err(AppError::BadRequest("Invalid email or password".into()));
        }

        let token = self.keys.issue(&customer)?;
        let resp = LoginResponse {
            token: format!("Bearer {}", token),
        };
        Ok((customer, resp))
    }
}
