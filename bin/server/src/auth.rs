//! Bearer-token authentication.
//!
//! Every route sits behind [`require_bearer`], which pulls the token out of
//! the `Authorization` header and hands it to the configured
//! [`AuthValidator`]. Tokens are minted elsewhere with the shared secret.

use crate::AppState;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims carried by an accepted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer …` header.
    MissingToken,
    /// Signature, format or claims check failed.
    InvalidToken { reason: String },
    Expired,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing bearer token"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::Expired => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let message = match e {
            AuthError::MissingToken => "Missing bearer token",
            AuthError::InvalidToken { .. } => "Token is invalid",
            AuthError::Expired => "Token is invalid or expired",
        };
        Self::Unauthorized {
            message: message.to_string(),
        }
    }
}

/// Decides whether a bearer token is acceptable.
pub trait AuthValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 JWT validation against a shared secret. `exp` is required.
pub struct JwtAuthValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthValidator {
    #[must_use]
    pub fn new(secret: &str, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_seconds;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl AuthValidator for JwtAuthValidator {
    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken {
                    reason: e.to_string(),
                },
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Rejects requests without a valid bearer token with a 401 envelope.
/// Accepted claims are stored as a request extension.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = {
        let token = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
        state.auth.validate(token).inspect_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
        })?
    };
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
