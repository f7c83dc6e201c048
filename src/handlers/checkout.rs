use crate::handlers::common::success_response;
use crate::{
    auth::AuthUser, errors::ServiceError, services::finalizer::FinalizeOutcome, ApiResponse,
    AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

/// Checkout endpoints: session creation plus the redirect-triggered commit
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout-stripe", get(begin_checkout))
        .route("/checkout/success", get(checkout_success))
}

/// Open a hosted payment session from the current cart
async fn begin_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.checkout.begin_checkout(user.user_id).await?;
    Ok(success_response(summary))
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Confirmation redirect target: finalize the session the shopper just paid
///
/// This is one of the two triggers of the idempotent commit; the provider
/// webhook is the other. Re-entry (refresh, webhook raced us) answers 200
/// without re-committing.
async fn checkout_success(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .finalizer
        .finalize_session(&query.session_id, user.user_id)
        .await?;

    let response = match outcome {
        FinalizeOutcome::Committed { .. } => (
            StatusCode::CREATED,
            Json(ApiResponse::message("Payment successful!")),
        ),
        FinalizeOutcome::AlreadyCommitted => (
            StatusCode::OK,
            Json(ApiResponse::message("Order processed!")),
        ),
    };
    Ok(response)
}
