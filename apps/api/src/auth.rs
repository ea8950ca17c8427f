//! Identity provider boundary.
//!
//! Bearer tokens are verified by an `IdentityProvider`; the default one checks
//! HS256 JWTs carrying `uid` (or `sub`), `role`, `email`, `exp`, and an
//! optional `jti` that can be revoked.

use std::collections::HashSet;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Candidate,
    Recruiter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Recruiter => "recruiter",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "candidate" => Some(Role::Candidate),
            "recruiter" => Some(Role::Recruiter),
            _ => None,
        }
    }
}

/// Verified claims of a bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub subject_id: String,
    pub role: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token verification failed: {0}")]
    Verification(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    uid: Option<String>,
    sub: Option<String>,
    role: Option<String>,
    email: Option<String>,
    exp: i64,
    jti: Option<String>,
}

pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
    revoked: HashSet<String>,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            revoked: HashSet::new(),
        }
    }

    /// Token ids (`jti`) that must be refused even if otherwise valid.
    pub fn with_revoked(mut self, token_ids: impl IntoIterator<Item = String>) -> Self {
        self.revoked.extend(token_ids);
        self
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidKeyFormat => AuthError::Verification(e.to_string()),
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;
        let claims = data.claims;

        if claims
            .jti
            .as_ref()
            .is_some_and(|jti| self.revoked.contains(jti))
        {
            return Err(AuthError::Revoked);
        }

        let subject_id = claims
            .uid
            .or(claims.sub)
            .ok_or_else(|| AuthError::Invalid("missing subject".to_string()))?;
        let role = claims
            .role
            .ok_or_else(|| AuthError::Invalid("missing role claim".to_string()))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::Invalid("exp out of range".to_string()))?;

        Ok(Identity {
            subject_id,
            role,
            email: claims.email,
            expires_at,
        })
    }
}

/// Authenticated caller, extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

impl AuthUser {
    pub fn uid(&self) -> &str {
        &self.identity.subject_id
    }

    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.identity.role)
    }

    /// 403 unless the caller holds `role`.
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role() == Some(role) {
            return Ok(());
        }
        warn!(
            "User {} with role '{}' denied: {} role required",
            self.uid(),
            self.identity.role,
            role.as_str()
        );
        Err(AppError::Forbidden(format!(
            "Access restricted to the {} role",
            role.as_str()
        )))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let identity = state.identity.verify(token).await.map_err(|e| {
            warn!("Rejected bearer token: {e}");
            AppError::Unauthorized
        })?;
        Ok(AuthUser { identity })
    }
}
