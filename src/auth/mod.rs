use crate::entities::user::UserRole;
use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware,
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Claim structure for the identity assertion issued by the external auth
/// service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
}

/// Verifies identity assertions. Token issuance belongs to the external
/// auth service; `issue_token` exists for that service's contract and for
/// test harnesses.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Validates a bearer token and extracts the authenticated user.
    pub fn validate_token(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.set_issuer(&[self.config.issuer.clone()]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {}", e)))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid subject claim".to_string()))?;
        let role = UserRole::parse(&data.claims.role)
            .ok_or_else(|| ServiceError::Unauthorized("Unknown role claim".to_string()))?;

        Ok(AuthUser {
            user_id,
            email: data.claims.email,
            role,
        })
    }

    /// Signs an identity assertion for the given user.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: UserRole,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            iat: now,
            exp: now + self.config.token_ttl.as_secs() as i64,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Failed to sign token: {}", e)))
    }
}

/// Authentication middleware: validates the bearer token and stores the
/// authenticated user in request extensions.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        return ServiceError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    match auth.validate_token(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Authorization middleware requiring a specific role. Runs after
/// `auth_middleware`, which populates the `AuthUser` extension.
pub async fn role_middleware(
    State(required): State<UserRole>,
    request: Request,
    next: Next,
) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.role == required => next.run(request).await,
        Some(_) => ServiceError::Forbidden(format!("{} role required", required.as_str()))
            .into_response(),
        None => ServiceError::Unauthorized("Authentication required".to_string()).into_response(),
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self, auth: Arc<AuthService>) -> Self;
    fn with_role(self, auth: Arc<AuthService>, role: UserRole) -> Self;
}

impl<S> AuthRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self, auth: Arc<AuthService>) -> Self {
        self.layer(middleware::from_fn_with_state(auth, auth_middleware))
    }

    fn with_role(self, auth: Arc<AuthService>, role: UserRole) -> Self {
        self.layer(middleware::from_fn_with_state(role, role_middleware))
            .with_auth(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            issuer: "storefront-auth".to_string(),
            audience: "storefront-api".to_string(),
            token_ttl: Duration::from_secs(3600),
        })
    }

    #[test]
    fn token_round_trip() {
        let service = test_service();
        let user_id = Uuid::new_v4();
        let token = service
            .issue_token(user_id, "shopper@example.com", UserRole::Customer)
            .expect("token should sign");

        let user = service.validate_token(&token).expect("token should validate");
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email, "shopper@example.com");
        assert_eq!(user.role, UserRole::Customer);
        assert!(!user.is_admin());
    }

    #[test]
    fn admin_role_round_trip() {
        let service = test_service();
        let token = service
            .issue_token(Uuid::new_v4(), "admin@example.com", UserRole::Admin)
            .unwrap();
        let user = service.validate_token(&token).unwrap();
        assert!(user.is_admin());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let service = test_service();
        assert!(matches!(
            service.validate_token("not-a-token"),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let service = test_service();
        let other = AuthService::new(AuthConfig {
            jwt_secret: "another_secret_key_that_is_long_enough_000000".to_string(),
            issuer: "storefront-auth".to_string(),
            audience: "storefront-api".to_string(),
            token_ttl: Duration::from_secs(3600),
        });
        let token = other
            .issue_token(Uuid::new_v4(), "shopper@example.com", UserRole::Customer)
            .unwrap();
        assert!(service.validate_token(&token).is_err());
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let service = test_service();
        let other = AuthService::new(AuthConfig {
            jwt_secret: "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            issuer: "storefront-auth".to_string(),
            audience: "another-api".to_string(),
            token_ttl: Duration::from_secs(3600),
        });
        let token = other
            .issue_token(Uuid::new_v4(), "shopper@example.com", UserRole::Customer)
            .unwrap();
        assert!(service.validate_token(&token).is_err());
    }
}
