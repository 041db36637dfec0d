//! Bearer-token authentication.
//!
//! Verifies an HS256 token from `Authorization: Bearer <jwt>` (or a
//! `?token=` query parameter on signed links) and inserts the resulting
//! [`Principal`] as a request extension.

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use powermason_core::principal::{Principal, TokenClaims};

use crate::error::AppError;

#[derive(Clone)]
pub struct JwtConfig {
    key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Unauthenticated(format!("invalid token: {e}")))?;
        Principal::from_claims(&data.claims).map_err(|e| AppError::Unauthenticated(e.to_string()))
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());
    }
    request.uri().query().and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .map(str::to_string)
    })
}

pub async fn jwt_auth(
    Extension(config): Extension<JwtConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return AppError::Unauthenticated("missing bearer token".into()).into_response();
    };
    match config.verify(&token) {
        Ok(principal) => {
            tracing::debug!(user_id = principal.user_id, role = %principal.role, "authenticated");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use powermason_core::types::Role;

    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-at-least-32-bytes!!";

    fn token(sub: &str, role: &str, exp: usize) -> String {
        let claims = TokenClaims {
            sub: Some(sub.into()),
            role: Some(role.into()),
            email: None,
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[test]
    fn valid_token_yields_principal() {
        let config = JwtConfig::from_secret(SECRET);
        let p = config.verify(&token("9", "PM", 4_000_000_000)).unwrap();
        assert_eq!(p.user_id, 9);
        assert_eq!(p.role, Role::ProjectManager);
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let config = JwtConfig::from_secret(SECRET);
        assert!(config.verify(&token("9", "PM", 1)).is_err());
        assert!(config.verify(&token("9", "superuser", 4_000_000_000)).is_err());
        let other = JwtConfig::from_secret(b"another-secret-that-is-also-long-enough");
        assert!(other.verify(&token("9", "PM", 4_000_000_000)).is_err());
    }

    #[test]
    fn token_is_read_from_header_or_query() {
        let req = axum::http::Request::builder()
            .uri("/projects")
            .header(AUTHORIZATION, "Bearer abc.def")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def"));

        let req = axum::http::Request::builder()
            .uri("/projects/1/files?name=a.pdf&token=xyz")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req).as_deref(), Some("xyz"));
    }
}
