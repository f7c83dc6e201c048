use super::{CreateSessionRequest, PaymentProvider, ProviderSession, SessionStatus};
use crate::errors::ServiceError;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Stripe Checkout client over the hosted sessions API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            secret_key: secret_key.into(),
        }
    }

    fn unavailable(context: &str, err: impl std::fmt::Display) -> ServiceError {
        ServiceError::PaymentProviderUnavailable(format!("{}: {}", context, err))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ServiceError> {
        // Stripe's form encoding addresses nested fields with bracketed keys.
        let mut params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url),
            ("cancel_url".to_string(), request.cancel_url),
            (
                "client_reference_id".to_string(),
                request.client_reference_id,
            ),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                "usd".to_string(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.to_string(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][description]", i),
                item.description.clone(),
            ));
            params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| Self::unavailable("session create request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "stripe rejected session create: {}", body);
            return Err(Self::unavailable("session create rejected", status));
        }

        response
            .json::<ProviderSession>()
            .await
            .map_err(|e| Self::unavailable("invalid session create response", e))
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<SessionStatus, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| Self::unavailable("session retrieve request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::unavailable("session retrieve rejected", status));
        }

        response
            .json::<SessionStatus>()
            .await
            .map_err(|e| Self::unavailable("invalid session retrieve response", e))
    }
}

/// Verifies a `Stripe-Signature` header (`t=<ts>,v1=<hex>` scheme) against
/// the raw request body. The signed payload is `{timestamp}.{body}` and the
/// timestamp must fall within the configured tolerance.
pub fn verify_webhook_signature(
    signature_header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let mut ts = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().split('=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let Ok(body) = std::str::from_utf8(payload) else {
        return false;
    };
    let signed = format!("{}.{}", ts, body);
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, v1)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::{PaymentStatus, SessionLineItem};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sign(payload: &str, secret: &str, ts: i64) -> String {
        let signed = format!("{}.{}", ts, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!("t={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(payload, "whsec_test", chrono::Utc::now().timestamp());
        assert!(verify_webhook_signature(&header, payload.as_bytes(), "whsec_test", 300));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_test", chrono::Utc::now().timestamp());
        assert!(!verify_webhook_signature(
            &header,
            br#"{"id":"evt_2"}"#,
            "whsec_test",
            300
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_test", chrono::Utc::now().timestamp());
        assert!(!verify_webhook_signature(&header, payload.as_bytes(), "whsec_other", 300));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_test", chrono::Utc::now().timestamp() - 3600);
        assert!(!verify_webhook_signature(&header, payload.as_bytes(), "whsec_test", 300));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(!verify_webhook_signature("nonsense", b"{}", "whsec_test", 300));
        assert!(!verify_webhook_signature("t=,v1=", b"{}", "whsec_test", 300));
    }

    #[tokio::test]
    async fn create_session_posts_form_encoded_line_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("mode=payment"))
            .and(body_string_contains("client_reference_id=user-1"))
            .and(body_string_contains("unit_amount%5D=1099"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_123",
                "url": "https://checkout.stripe.test/pay/cs_test_123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new("sk_test_123", server.uri());
        let session = client
            .create_checkout_session(CreateSessionRequest {
                line_items: vec![SessionLineItem {
                    name: "Widget".to_string(),
                    description: "A widget".to_string(),
                    unit_amount: 1099,
                    quantity: 2,
                }],
                client_reference_id: "user-1".to_string(),
                success_url: "http://client/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                    .to_string(),
                cancel_url: "http://client/checkout/cancel".to_string(),
            })
            .await
            .expect("session should be created");

        assert_eq!(session.id, "cs_test_123");
        assert!(session.url.is_some());
    }

    #[tokio::test]
    async fn retrieve_session_parses_payment_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_test_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_123",
                "payment_status": "paid",
                "client_reference_id": "user-1",
                "amount_total": 2198
            })))
            .mount(&server)
            .await;

        let client = StripeClient::new("sk_test_123", server.uri());
        let status = client
            .retrieve_checkout_session("cs_test_123")
            .await
            .expect("session should be retrieved");

        assert!(status.is_paid());
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.client_reference_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn provider_error_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = StripeClient::new("sk_test_123", server.uri());
        let err = client.retrieve_checkout_session("cs_down").await.unwrap_err();
        assert!(matches!(err, ServiceError::PaymentProviderUnavailable(_)));
    }
}
