//! Payment provider integration.
//!
//! The storefront never talks to Stripe directly from handlers or services;
//! everything goes through the [`PaymentProvider`] trait so the provider can
//! be swapped for a scripted double in tests.

pub mod stripe;

pub use stripe::StripeClient;

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One line of a hosted checkout session, in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub description: String,
    /// Unit price in minor units (cents).
    pub unit_amount: i64,
    pub quantity: i64,
}

/// Request to open a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    /// Carried through the provider round trip so the webhook can recover
    /// which user the session belongs to.
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Handle returned when a hosted session is created.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub id: String,
    /// Hosted payment page the client redirects the shopper to.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Provider-reported state of a checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatus {
    pub id: String,
    pub payment_status: PaymentStatus,
    pub client_reference_id: Option<String>,
    pub amount_total: Option<i64>,
}

impl SessionStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status, PaymentStatus::Paid)
    }
}

/// External payment provider surface used by checkout and finalization.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Opens a hosted checkout session for the given line items.
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ServiceError>;

    /// Retrieves the current payment status of a session.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<SessionStatus, ServiceError>;
}
