//! Storefront API Library
//!
//! Product catalog, per-user shopping carts, hosted checkout and idempotent
//! order finalization behind a JSON REST surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payments;
pub mod services;

use crate::auth::{AuthRouterExt, AuthService};
use crate::entities::user::UserRole;
use axum::{extract::State, routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Uniform response envelope.
///
/// The storefront client switches on `responseCode` (1 = success,
/// 0 = failure) in every JSON body; payload fields sit flattened beside it.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "responseCode")]
    pub response_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            response_code: 1,
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<Value> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            response_code: 1,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Assembles the full HTTP surface.
///
/// Catalog reads and the webhook are public (the webhook authenticates by
/// signature); cart, checkout and order history require a customer identity
/// assertion; catalog administration requires the admin role.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let public = Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(handlers::products::routes())
        .merge(handlers::webhooks::routes());

    let shopper = Router::new()
        .merge(handlers::cart::routes())
        .merge(handlers::checkout::routes())
        .merge(handlers::orders::routes())
        .with_role(auth_service.clone(), UserRole::Customer);

    let admin = handlers::products::admin_routes().with_role(auth_service, UserRole::Admin);

    Router::new()
        .merge(public)
        .merge(shopper)
        .merge(admin)
        .with_state(state)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "storefront-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
