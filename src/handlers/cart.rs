use crate::handlers::common::{message_response, success_response};
use crate::{auth::AuthUser, errors::ServiceError, AppState};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Cart endpoints; all scoped to the authenticated user
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).post(add_to_cart))
        .route("/cart-remove-item", post(remove_from_cart))
        .route("/cart-delete-item", post(delete_from_cart))
}

#[derive(Debug, Deserialize)]
struct CartItemRequest {
    #[serde(rename = "productId")]
    product_id: Uuid,
}

/// Read the cart with resolved products and the accumulated total
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(success_response(cart))
}

/// Add one unit of a product
async fn add_to_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .add_line(user.user_id, payload.product_id)
        .await?;
    Ok(message_response("Product added to cart!"))
}

/// Remove one unit of a product
async fn remove_from_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .decrement_line(user.user_id, payload.product_id)
        .await?;
    Ok(message_response("Product removed from cart!"))
}

/// Drop a product's line entirely
async fn delete_from_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .delete_line(user.user_id, payload.product_id)
        .await?;
    Ok(message_response("Product deleted from cart!"))
}
