//! Session guard.
//!
//! The identity provider signs an HS256 session token after sign-in. It
//! arrives as a Bearer token or in the `echome_session` cookie. A valid
//! token resolves to a user row (upserted by email); anything else is
//! `Unauthorized` before a handler performs any side effect.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::user::UserProfile;

pub const SESSION_COOKIE: &str = "echome_session";

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The user's email address.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            email: self.sub.clone(),
            name: self.name.clone(),
            image: self.picture.clone(),
        }
    }
}

/// Verifies session tokens against the shared signing secret.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(AuthError::InvalidToken)?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingEmail);
        }
        Ok(claims)
    }
}

/// Sign a session token. Used by local tooling and tests in place of the
/// identity provider.
pub fn issue_session_token(secret: &str, claims: &SessionClaims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(AuthError::InvalidToken)
}

/// Pull the raw session token from the request headers.
fn session_token(parts: &Parts) -> Option<&str> {
    if let Some(token) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }

    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
}

/// The signed-in user, resolved before any handler side effect.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let claims = state.sessions.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::Unauthorized
        })?;

        let user = state.store.upsert_user(&claims.profile()).await?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            name: user.name,
            image: user.image,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Session token has no email")]
    MissingEmail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const SECRET: &str = "test-secret";

    fn claims(email: &str, exp_offset_secs: i64) -> SessionClaims {
        SessionClaims {
            sub: email.to_string(),
            name: Some("Ann".into()),
            picture: None,
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        }
    }

    #[test]
    fn valid_token_round_trips() {
        let token = issue_session_token(SECRET, &claims("ann@example.com", 3600)).unwrap();
        let verified = SessionVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(verified.sub, "ann@example.com");
        assert_eq!(verified.profile().name.as_deref(), Some("Ann"));
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let verifier = SessionVerifier::new(SECRET);
        let expired = issue_session_token(SECRET, &claims("ann@example.com", -3600)).unwrap();
        let foreign = issue_session_token("other", &claims("ann@example.com", 3600)).unwrap();

        assert!(verifier.verify(&expired).is_err());
        assert!(verifier.verify(&foreign).is_err());
        assert!(verifier.verify("garbage").is_err());
    }

    #[test]
    fn empty_email_is_rejected() {
        let token = issue_session_token(SECRET, &claims("  ", 3600)).unwrap();
        assert!(matches!(
            SessionVerifier::new(SECRET).verify(&token),
            Err(AuthError::MissingEmail)
        ));
    }

    #[test]
    fn token_is_read_from_bearer_or_cookie() {
        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(session_token(&parts), Some("abc"));

        let (parts, _) = Request::builder()
            .header(COOKIE, "theme=dark; echome_session=xyz; other=1")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(session_token(&parts), Some("xyz"));

        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(session_token(&parts), None);
    }
}
