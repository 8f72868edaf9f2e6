use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    audit,
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::AppResult,
    models::Customer,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register customer", body = ApiResponse<Customer>),
        (status = 400, description = "Email taken or missing fields")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Customer>>)> {
    let customer = state.auth.register(payload).await?;

    audit::record(
        &state.pool,
        customer.id,
        "customer_register",
        "customers",
        serde_json::json!({ "customer_id": customer.id }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Customer created", customer, None)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login customer", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let (customer, resp) = state.auth.login(payload).await?;

    audit::record(
        &state.pool,
        customer.id,
        "customer_login",
        "customers",
        serde_json::json!({ "customer_id": customer.id }),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Logged in",
        resp,
        Some(Meta::empty()),
    )))
}
