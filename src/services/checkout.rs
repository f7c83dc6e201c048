use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{CreateSessionRequest, PaymentProvider, SessionLineItem},
    services::cart::CartService,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Opens hosted payment sessions from the current cart.
///
/// Totals are computed from the live catalog price, not the cart's
/// accumulated line totals: the cart total is a display estimate and the
/// catalog is authoritative at checkout time.
#[derive(Clone)]
pub struct CheckoutService {
    cart: Arc<CartService>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    client_url: String,
}

impl CheckoutService {
    pub fn new(
        cart: Arc<CartService>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        client_url: String,
    ) -> Self {
        Self {
            cart,
            provider,
            event_sender,
            client_url,
        }
    }

    /// Snapshots the cart, opens a provider session and returns its handle.
    ///
    /// Fails with `EmptyCart` before any provider call when the cart has no
    /// lines; provider failures leave no local state behind.
    #[instrument(skip(self))]
    pub async fn begin_checkout(&self, user_id: Uuid) -> Result<CheckoutSummary, ServiceError> {
        let lines = self.cart.resolved_lines(user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut total_amount = Decimal::ZERO;
        let mut line_items = Vec::with_capacity(lines.len());
        for (line, product) in &lines {
            total_amount += product.price * Decimal::from(line.quantity);
            line_items.push(SessionLineItem {
                name: product.title.clone(),
                description: product.description.clone(),
                unit_amount: to_minor_units(product.price)?,
                quantity: i64::from(line.quantity),
            });
        }

        let request = CreateSessionRequest {
            line_items,
            client_reference_id: user_id.to_string(),
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.client_url
            ),
            cancel_url: format!("{}/checkout/cancel", self.client_url),
        };

        let session = self.provider.create_checkout_session(request).await?;

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                user_id,
                session_id: session.id.clone(),
            })
            .await;

        info!(
            "Opened checkout session {} for user {} (total {})",
            session.id, user_id, total_amount
        );

        Ok(CheckoutSummary {
            session_id: session.id,
            total_amount,
            url: session.url,
        })
    }
}

/// Converts a catalog price to minor currency units (cents).
pub(crate) fn to_minor_units(price: Decimal) -> Result<i64, ServiceError> {
    price
        .checked_mul(Decimal::from(100))
        .and_then(|cents| cents.round().to_i64())
        .ok_or_else(|| {
            ServiceError::InvalidOperation(format!("Price {} out of representable range", price))
        })
}

/// Handle returned to the client, which redirects to the hosted page.
#[derive(Debug, Serialize)]
pub struct CheckoutSummary {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "totalSum")]
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
