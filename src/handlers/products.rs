use crate::handlers::common::{created_response, message_response, success_response};
use crate::{
    errors::ServiceError,
    services::catalog::{CreateProductInput, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Public catalog endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{product_id}", get(get_product))
}

/// Catalog administration endpoints; the caller must hold the admin role
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/products", post(create_product))
        .route(
            "/admin/products/{product_id}",
            put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u64>,
}

/// One page of the catalog
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .catalog
        .list_products(query.page.unwrap_or(1))
        .await?;
    Ok(success_response(page))
}

/// Product detail
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(product_id).await?;
    Ok(success_response(json!({ "product": product })))
}

/// Create a product
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(json!({ "product": product })))
}

/// Update a product
async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .catalog
        .update_product(product_id, payload)
        .await?;
    Ok(success_response(json!({ "product": product })))
}

/// Delete a product
async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.delete_product(product_id).await?;
    Ok(message_response("Product deleted!"))
}
