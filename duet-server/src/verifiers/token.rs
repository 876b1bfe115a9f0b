//! Locally signed bearer tokens.
//!
//! Format: `base64url(claims_json) "." base64url(hmac_sha256(secret, claims_segment))`,
//! both segments unpadded. Issued by the `duet-token` binary.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{IdentityVerifier, VerifiedUser};
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

pub struct HmacTokenVerifier {
    /// Keyed MAC state, cloned per token.
    mac: HmacSha256,
}

impl HmacTokenVerifier {
    pub fn new(secret: &str) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self { mac: HmacSha256::new_from_slice(secret.as_bytes())? })
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    pub fn issue(&self, claims: &TokenClaims) -> String {
        let body = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(body);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{payload}.{sig}")
    }

    /// Check signature and expiry against `now_secs`.
    pub fn check(&self, token: &str, now_secs: i64) -> Result<TokenClaims, AuthError> {
        let (payload, sig) = token
            .split_once('.')
            .ok_or_else(|| AuthError::Invalid("malformed token".to_string()))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| AuthError::Invalid("malformed signature".to_string()))?;
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| AuthError::Invalid("bad signature".to_string()))?;

        let body = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Invalid("malformed payload".to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&body)
            .map_err(|e| AuthError::Invalid(format!("bad claims: {e}")))?;
        if claims.exp <= now_secs {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedUser, AuthError> {
        let claims = self.check(credential, chrono::Utc::now().timestamp())?;
        Ok(VerifiedUser { uid: claims.sub, email: claims.email, display_name: claims.name })
    }
}
