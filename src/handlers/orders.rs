use crate::handlers::common::success_response;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::invoice::{invoice_filename, render_invoice},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use serde_json::json;
use uuid::Uuid;

/// Order history and invoice endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{order_id}", get(get_invoice))
}

/// List the authenticated user's orders
async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_orders(user.user_id).await?;
    Ok(success_response(json!({ "orders": orders })))
}

/// Stream the invoice document for one of the user's orders
async fn get_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .get_order_for_user(order_id, user.user_id)
        .await?;

    let document = render_invoice(&order, &items);
    let disposition = format!("inline; filename=\"{}\"", invoice_filename(order.id));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    )
        .into_response())
}
