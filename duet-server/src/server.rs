//! Server state and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::connection::RelayEngine;
use crate::notifier::{self, Notifier};
use crate::registry::ConnectionRegistry;
use crate::store::SqliteStore;
use crate::verifiers::{self, IdentityVerifier};

/// Shared state accessible by all connection handlers and REST endpoints.
pub struct SharedState {
    pub server_name: String,
    pub config: ServerConfig,
    /// identity -> live connection
    pub registry: Arc<ConnectionRegistry>,
    pub relay: RelayEngine,
    /// Message history and user directory.
    pub store: Arc<SqliteStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub started_at: Instant,
}

pub struct Server {
    config: ServerConfig,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, verifier: None, notifier: None }
    }

    /// Use a specific verifier instead of the configured one (for testing).
    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use a specific notifier instead of the configured one (for testing).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build SharedState, opening the database and the collaborators.
    fn build_state(&self) -> Result<Arc<SharedState>> {
        let store = match &self.config.db_path {
            Some(path) => {
                tracing::info!("Opening database: {path}");
                SqliteStore::open(path).map_err(|e| anyhow::anyhow!("Failed to open database: {e}"))?
            }
            None => {
                tracing::info!("No database path set, history is kept in memory");
                SqliteStore::open_memory()?
            }
        };
        let store = Arc::new(store);

        let verifier = match &self.verifier {
            Some(v) => Arc::clone(v),
            None => verifiers::from_config(&self.config)?,
        };
        let notifier = match &self.notifier {
            Some(n) => Arc::clone(n),
            None => notifier::from_config(&self.config)?,
        };

        let registry = Arc::new(ConnectionRegistry::new());
        let relay = RelayEngine::new(Arc::clone(&registry), store.clone(), notifier)
            .with_max_message_bytes(self.config.max_message_bytes);

        Ok(Arc::new(SharedState {
            server_name: self.config.server_name.clone(),
            config: self.config.clone(),
            registry,
            relay,
            store,
            verifier,
            started_at: Instant::now(),
        }))
    }

    /// Run the server, blocking forever.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("HTTP/WebSocket listener on {}", listener.local_addr()?);
        serve(listener, state).await
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let handle = tokio::spawn(serve(listener, state));
        Ok((addr, handle))
    }
}

async fn serve(listener: TcpListener, state: Arc<SharedState>) -> Result<()> {
    let router = crate::web::router(state);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
