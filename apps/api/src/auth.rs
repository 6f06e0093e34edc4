//! Bearer-token authentication.
//!
//! Handlers take an `AuthUser` argument; the extractor reads
//! `Authorization: Bearer <token>` and asks the `TokenVerifier` in `AppState`
//! who it belongs to. Any failure is a 401.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::state::AppState;

const VERIFY_TIMEOUT_SECS: u64 = 10;

/// The authenticated caller. Other profile fields the provider returns are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub uid: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected")]
    Rejected,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;
}

/// Posts `{"token": ...}` to the identity provider and reads `{uid}` from the reply.
pub struct HttpTokenVerifier {
    client: Client,
    url: String,
}

impl HttpTokenVerifier {
    pub fn new(url: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(VERIFY_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<AuthUser>()
                .await
                .map_err(|e| AuthError::Unavailable(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => Err(AuthError::Rejected),
            status => Err(AuthError::Unavailable(format!("verify endpoint returned {status}"))),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        match state.verifier.verify(token).await {
            Ok(user) => Ok(user),
            Err(AuthError::Rejected) => {
                debug!("bearer token rejected");
                Err(AppError::Unauthorized)
            }
            Err(e) => {
                warn!(error = %e, "token verification failed");
                Err(AppError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_provider_reply_with_profile_fields() {
        let user: AuthUser = serde_json::from_value(serde_json::json!({
            "uid": "u-9",
            "email": "jane@example.com",
            "name": "Jane"
        }))
        .expect("reply");
        assert_eq!(user.uid, "u-9");
    }

    #[test]
    fn test_bearer_token_requires_scheme_and_value() {
        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer  abc ")
            .body(())
            .expect("request")
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc"));

        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(())
            .expect("request")
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
