use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
};

use crate::{
    audit,
    dto::orders::ConfirmPaymentQuery,
    error::AppResult,
    middleware::auth::CustomerIdentity,
    models::Order,
    response::{ApiResponse, Meta},
    services::deadline::Deadline,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout))
        .route("/paid", post(confirm_payment))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    responses(
        (status = 201, description = "Order created from the cart, payment pending", body = ApiResponse<Order>),
        (status = 400, description = "Missing identity or empty cart"),
        (status = 404, description = "A product in the cart no longer exists"),
        (status = 504, description = "Deadline exceeded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    customer: CustomerIdentity,
) -> AppResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let deadline = Deadline::after(state.config.request_timeout);
    let order = state.orders.checkout(&customer, deadline).await?;

    audit::record(
        &state.pool,
        customer.id,
        "order_checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Order created",
            order,
            Some(Meta::empty()),
        )),
    ))
}

#[utoipa::path(
    post,
    path = "/api/checkout/paid",
    params(ConfirmPaymentQuery),
    responses(
        (status = 200, description = "Payment recorded, stock taken and cart cleared", body = ApiResponse<Order>),
        (status = 404, description = "Order or transaction not found"),
        (status = 409, description = "Insufficient stock or order already paid"),
        (status = 504, description = "Deadline exceeded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    customer: CustomerIdentity,
    Query(query): Query<ConfirmPaymentQuery>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let deadline = Deadline::after(state.config.request_timeout);
    let order = state
        .orders
        .confirm_payment(&customer, query.order_id, deadline)
        .await?;

    audit::record(
        &state.pool,
        customer.id,
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": order.id, "payment_id": order.payment_id }),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Payment recorded",
        order,
        Some(Meta::empty()),
    )))
}
