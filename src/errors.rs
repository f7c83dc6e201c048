use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// Error body rendered for every failed request.
///
/// The storefront client keys off `responseCode` (1 = success, 0 = failure)
/// on every JSON body, so failures carry the same envelope as successes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "responseCode")]
    pub response_code: u8,
    pub message: String,
    /// Field-level validation messages, when the failure is a validation one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    #[error("Payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Validation failed")]
    ValidationFailed(Vec<String>),

    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let messages = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid value", field),
                })
            })
            .collect();
        ServiceError::ValidationFailed(messages)
    }
}

impl ServiceError {
    /// Whether a database error is a unique-constraint violation.
    ///
    /// The order finalizer relies on this to turn a lost insert race on
    /// `orders.session_id` into the idempotent-success case.
    pub fn is_unique_violation(err: &DbErr) -> bool {
        matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::EmptyCart
            | Self::ValidationFailed(_)
            | Self::WebhookSignatureInvalid
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::PaymentNotConfirmed => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::CommitFailed(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message rendered to the client. Internal failures return generic
    /// messages so storage details never leak into responses.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::CommitFailed(_) => "Failed to process payment!".to_string(),
            Self::PaymentNotConfirmed => "Failed to process payment!".to_string(),
            Self::PaymentProviderUnavailable(_) => {
                "Creating checkout session failed.".to_string()
            }
            Self::EmptyCart => "Cart is empty!".to_string(),
            Self::ValidationFailed(_) => "Validation failed".to_string(),
            Self::WebhookSignatureInvalid => "Invalid webhook signature".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let errors = match &self {
            ServiceError::ValidationFailed(messages) => Some(messages.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            response_code: 0,
            message: self.response_message(),
            errors,
        };
        (status, Json(body)).into_response()
    }
}
