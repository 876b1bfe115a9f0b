//! Identity verification.
//!
//! A verifier turns an opaque bearer credential into a [`VerifiedUser`]. The
//! relay and the REST layer only see the [`IdentityVerifier`] trait, so tests
//! plug in [`StaticTokenVerifier`] while deployments use a signed-token or
//! remote-introspection verifier.

pub mod remote;
pub mod token;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::AuthError;

pub use remote::HttpTokenVerifier;
pub use token::{HmacTokenVerifier, TokenClaims};

/// An authenticated user as reported by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "name", alias = "displayName")]
    pub display_name: Option<String>,
}

impl VerifiedUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None, display_name: None }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedUser, AuthError>;
}

/// Verify an optional credential. Absent or blank credentials are rejected
/// without consulting the verifier.
pub async fn authenticate(
    verifier: &dyn IdentityVerifier,
    credential: Option<&str>,
) -> Result<VerifiedUser, AuthError> {
    let credential = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::Missing)?;
    let user = verifier.verify(credential).await?;
    if user.uid.trim().is_empty() {
        return Err(AuthError::Invalid("verifier returned an empty identity".to_string()));
    }
    Ok(user)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Fixed token → user table. For tests and local demos.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    users: HashMap<String, VerifiedUser>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user: VerifiedUser) -> Self {
        self.users.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedUser, AuthError> {
        self.users
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::Invalid("unknown token".to_string()))
    }
}

/// Build the verifier named by the configuration. The remote endpoint wins
/// when both sources are set.
pub fn from_config(config: &ServerConfig) -> anyhow::Result<Arc<dyn IdentityVerifier>> {
    if let Some(url) = config.verify_url.as_deref().filter(|u| !u.is_empty()) {
        tracing::info!(url, "Using remote token verifier");
        return Ok(Arc::new(HttpTokenVerifier::new(url)?));
    }
    if let Some(secret) = config.token_secret.as_deref().filter(|s| !s.is_empty()) {
        tracing::info!("Using HMAC token verifier");
        return Ok(Arc::new(HmacTokenVerifier::new(secret)?));
    }
    anyhow::bail!("no identity verifier configured: set --verify-url or --token-secret")
}
