use std::collections::HashMap;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{errors::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    RestaurantAdmin,
    SuperAdmin,
}

/// Who is calling, as established by credential verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub account_id: String,
    pub role: Role,
}

/// A bearer token issued elsewhere and the identity it stands for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    pub account_id: String,
    pub role: Role,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer credential")]
    Missing,
    #[error("malformed authorization header")]
    Malformed,
    #[error("unknown or revoked credential")]
    Unknown,
}

/// Verifies bearer credentials against the tokens configured at startup.
///
/// Issuing tokens is someone else's job; this only answers "who is this?".
#[derive(Debug, Clone, Default)]
pub struct TokenVerifier {
    by_token: HashMap<String, Identity>,
}

impl TokenVerifier {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        TokenVerifier {
            by_token: credentials
                .into_iter()
                .map(|c| {
                    (
                        c.token,
                        Identity {
                            account_id: c.account_id,
                            role: c.role,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.by_token.get(token).cloned().ok_or(AuthError::Unknown)
    }

    /// Verifies a raw `Authorization` header value (`Bearer <token>`).
    pub fn verify_header(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let (scheme, token) = header.trim().split_once(' ').ok_or(AuthError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
            return Err(AuthError::Malformed);
        }
        self.verify(token.trim())
    }
}

/// Extractor for an authenticated caller. Rejects with 401.
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AppError::Unauthorized(AuthError::Malformed))?),
            None => None,
        };
        let identity = state.verifier.verify_header(header).map_err(|e| {
            debug!("rejecting request: {e}");
            AppError::Unauthorized(e)
        })?;
        Ok(Caller(identity))
    }
}
