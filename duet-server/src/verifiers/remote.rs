//! Remote token introspection.
//!
//! POSTs `{"token": "..."}` to the configured endpoint. A 2xx answer carries
//! `{"uid", "email"?, "name"?}`; 401/403 mean the token is bad; anything else
//! means the verifier itself is unavailable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{IdentityVerifier, VerifiedUser};
use crate::error::AuthError;

pub struct HttpTokenVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenVerifier {
    pub fn new(url: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url: url.to_string() })
    }
}

#[async_trait]
impl IdentityVerifier for HttpTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedUser, AuthError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "token": credential }))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        match resp.status() {
            s if s.is_success() => resp
                .json::<VerifiedUser>()
                .await
                .map_err(|e| AuthError::Unavailable(format!("bad verifier response: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::Invalid("rejected by verifier".to_string()))
            }
            s => Err(AuthError::Unavailable(format!("verifier returned {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as Status, routing::post};

    async fn spawn_introspector() -> String {
        async fn introspect(Json(body): Json<serde_json::Value>) -> Result<Json<serde_json::Value>, Status> {
            match body["token"].as_str() {
                Some("good") => Ok(Json(serde_json::json!({"uid": "u1", "email": "u1@example.com"}))),
                Some("broken") => Err(Status::BAD_GATEWAY),
                _ => Err(Status::UNAUTHORIZED),
            }
        }
        let app = Router::new().route("/introspect", post(introspect));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/introspect")
    }

    #[tokio::test]
    async fn maps_introspection_answers() {
        let v = HttpTokenVerifier::new(&spawn_introspector().await).unwrap();

        let user = v.verify("good").await.unwrap();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.email.as_deref(), Some("u1@example.com"));

        assert!(matches!(v.verify("bad").await, Err(AuthError::Invalid(_))));
        assert!(matches!(v.verify("broken").await, Err(AuthError::Unavailable(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let v = HttpTokenVerifier::new("http://127.0.0.1:9/introspect").unwrap();
        assert!(matches!(v.verify("good").await, Err(AuthError::Unavailable(_))));
    }
}
