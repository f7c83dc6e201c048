#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{product, user, user::UserRole, ProductModel, UserModel},
    errors::ServiceError,
    events::EventSender,
    handlers::AppServices,
    payments::{
        CreateSessionRequest, PaymentProvider, PaymentStatus, ProviderSession, SessionStatus,
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Scripted stand-in for the hosted payment provider.
///
/// Sessions are created unpaid; tests flip them to paid to simulate the
/// shopper completing the hosted flow.
#[derive(Default)]
pub struct MockPaymentProvider {
    sessions: StdMutex<HashMap<String, SessionStatus>>,
    counter: AtomicUsize,
    create_calls: AtomicUsize,
    fail_retrieve: AtomicBool,
}

impl MockPaymentProvider {
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Simulates the shopper paying on the hosted page.
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .expect("session must exist before it can be paid");
        session.payment_status = PaymentStatus::Paid;
    }

    /// Registers a session without going through checkout.
    pub fn seed_session(&self, session_id: &str, user_id: Uuid, paid: bool) {
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            SessionStatus {
                id: session_id.to_string(),
                payment_status: if paid {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::Unpaid
                },
                client_reference_id: Some(user_id.to_string()),
                amount_total: None,
            },
        );
    }

    pub fn set_fail_retrieve(&self, fail: bool) {
        self.fail_retrieve.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("cs_test_{}", n);
        let amount_total: i64 = request
            .line_items
            .iter()
            .map(|item| item.unit_amount * item.quantity)
            .sum();

        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            SessionStatus {
                id: session_id.clone(),
                payment_status: PaymentStatus::Unpaid,
                client_reference_id: Some(request.client_reference_id),
                amount_total: Some(amount_total),
            },
        );

        Ok(ProviderSession {
            url: Some(format!("https://checkout.test/pay/{}", session_id)),
            id: session_id,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<SessionStatus, ServiceError> {
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentProviderUnavailable(
                "provider offline".to_string(),
            ));
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::PaymentProviderUnavailable(format!(
                    "unknown session {}",
                    session_id
                ))
            })
    }
}

/// Helper harness: application state backed by a throwaway SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub auth_service: Arc<AuthService>,
    pub provider: Arc<MockPaymentProvider>,
    router: Router,
    _tmp_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_webhook_secret(None).await
    }

    pub async fn with_webhook_secret(webhook_secret: Option<&str>) -> Self {
        let tmp_dir = TempDir::new().expect("failed to create temp dir");
        let db_file = tmp_dir.path().join("storefront_test.db");

        let cfg = AppConfig {
            database_url: format!("sqlite://{}?mode=rwc", db_file.display()),
            jwt_secret: "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            auth_issuer: "storefront-auth".to_string(),
            auth_audience: "storefront-api".to_string(),
            host: "127.0.0.1".to_string(),
            port: 18_080,
            environment: "test".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            cors_allowed_origins: None,
            client_url: "http://localhost:8080".to_string(),
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_api_base: "https://api.stripe.invalid".to_string(),
            stripe_webhook_secret: webhook_secret.map(str::to_string),
            stripe_webhook_tolerance_secs: 300,
            event_channel_capacity: 64,
        };

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(storefront_api::events::process_events(event_rx));

        let provider = Arc::new(MockPaymentProvider::default());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            provider.clone(),
            cfg.client_url.clone(),
        );

        let auth_service = Arc::new(AuthService::new(AuthConfig {
            jwt_secret: cfg.jwt_secret.clone(),
            issuer: cfg.auth_issuer.clone(),
            audience: cfg.auth_audience.clone(),
            token_ttl: Duration::from_secs(3600),
        }));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = storefront_api::app_router(state.clone(), auth_service.clone());

        Self {
            state,
            auth_service,
            provider,
            router,
            _tmp_dir: tmp_dir,
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Inserts a user row and returns it.
    pub async fn create_user(&self, role: UserRole) -> UserModel {
        let user_id = Uuid::new_v4();
        let model = user::ActiveModel {
            id: Set(user_id),
            email: Set(format!("user-{}@example.com", user_id)),
            username: Set(format!("user-{}", user_id)),
            role: Set(role),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to insert test user")
    }

    /// Inserts a catalog product and returns it.
    pub async fn create_product(&self, title: &str, price: Decimal) -> ProductModel {
        let product_id = Uuid::new_v4();
        let model = product::ActiveModel {
            id: Set(product_id),
            title: Set(title.to_string()),
            price: Set(price),
            description: Set(format!("{} description", title)),
            image_url: Set(format!("https://img.test/{}.png", product_id)),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to insert test product")
    }

    pub fn token_for(&self, user: &UserModel) -> String {
        self.auth_service
            .issue_token(user.id, &user.email, user.role)
            .expect("failed to issue test token")
    }

    /// Fires one request at the router and decodes the JSON response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("failed to build request"),
            None => builder.body(Body::empty()).expect("failed to build request"),
        };

        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("request should not fail at the transport level");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, json)
    }
}
