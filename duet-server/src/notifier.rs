//! Push notifications to an external collaborator.
//!
//! Fire-and-forget: the relay hands a [`Notification`] to [`dispatch`], which
//! runs it on its own task. Nothing flows back; failures are logged and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::NotifyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub receiver_id: String,
    pub sender_id: String,
    pub message_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// POSTs the notification as JSON.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(notification).send().await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Logs instead of calling out.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(receiver = %n.receiver_id, sender = %n.sender_id, message_id = %n.message_id, "notify");
        Ok(())
    }
}

/// Run `notification` on a detached task. The handle is only for tests.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                receiver = %notification.receiver_id,
                message_id = %notification.message_id,
                "Notification failed: {e}"
            );
        }
    })
}

pub fn from_config(config: &ServerConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.notify_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            tracing::info!(url, "Push notifications enabled");
            let timeout = Duration::from_millis(config.notify_timeout_ms);
            Ok(Arc::new(HttpNotifier::new(url, timeout)?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}
