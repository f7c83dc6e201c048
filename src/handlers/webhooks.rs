use crate::handlers::common::success_response;
use crate::{errors::ServiceError, payments::stripe::verify_webhook_signature, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

/// Webhook endpoint; unauthenticated but signature-verified
pub fn routes() -> Router<AppState> {
    Router::new().route("/stripe-webhook", post(stripe_webhook))
}

/// Asynchronous confirmation trigger from the payment provider.
///
/// Signature verification happens before anything else; a completed
/// checkout event then funnels into the same idempotent finalize operation
/// the redirect path uses. Redelivery of an already-committed session is
/// answered with 200 and no effect.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.stripe_webhook_secret.as_deref() {
        let signature = headers
            .get("Stripe-Signature")
            .and_then(|value| value.to_str().ok())
            .ok_or(ServiceError::WebhookSignatureInvalid)?;
        if !verify_webhook_signature(
            signature,
            &body,
            secret,
            state.config.stripe_webhook_tolerance_secs,
        ) {
            warn!("Stripe webhook signature verification failed");
            return Err(ServiceError::WebhookSignatureInvalid);
        }
    } else {
        warn!("Stripe webhook secret not configured; accepting unsigned event");
    }

    let event: Value = serde_json::from_slice(&body).map_err(|e| {
        ServiceError::ValidationFailed(vec![format!("invalid webhook payload: {}", e)])
    })?;

    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
    match event_type {
        "checkout.session.completed" => {
            let object = &event["data"]["object"];
            let session_id = object.get("id").and_then(Value::as_str).ok_or_else(|| {
                ServiceError::ValidationFailed(vec!["event is missing session id".to_string()])
            })?;
            let user_id = object
                .get("client_reference_id")
                .and_then(Value::as_str)
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or_else(|| {
                    ServiceError::ValidationFailed(vec![
                        "event is missing a usable client_reference_id".to_string(),
                    ])
                })?;

            let outcome = state
                .services
                .finalizer
                .finalize_session(session_id, user_id)
                .await?;
            info!(
                "Webhook finalization for session {} resulted in {:?}",
                session_id, outcome
            );
        }
        other => {
            info!("Unhandled Stripe webhook type: {}", other);
        }
    }

    Ok(success_response(json!({ "received": true })))
}
