//! Server configuration. Every flag can also be set through a `DUET_*`
//! environment variable.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "duet-server", version, about = "One-to-one chat relay")]
pub struct ServerConfig {
    /// Address for the HTTP/WebSocket listener.
    #[arg(long, env = "DUET_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Name reported by the health endpoint.
    #[arg(long, env = "DUET_SERVER_NAME", default_value = "duet")]
    pub server_name: String,

    /// SQLite database path. In-memory when unset.
    #[arg(long, env = "DUET_DB_PATH")]
    pub db_path: Option<String>,

    /// HMAC secret for locally issued bearer tokens (see `duet-token`).
    #[arg(long, env = "DUET_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Remote token introspection endpoint. Takes precedence over
    /// `--token-secret` when both are set.
    #[arg(long, env = "DUET_VERIFY_URL")]
    pub verify_url: Option<String>,

    /// Push notification endpoint. Notifications are only logged when unset.
    #[arg(long, env = "DUET_NOTIFY_URL")]
    pub notify_url: Option<String>,

    /// Timeout for a single notification request, in milliseconds.
    #[arg(long, env = "DUET_NOTIFY_TIMEOUT_MS", default_value_t = 3000)]
    pub notify_timeout_ms: u64,

    /// Allowed CORS origins, comma separated. `*` wildcards are accepted
    /// (e.g. `https://*.web.app`). Any origin is allowed when empty.
    #[arg(long, env = "DUET_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Upper bound for page sizes on the history endpoints.
    #[arg(long, env = "DUET_HISTORY_LIMIT_MAX", default_value_t = 200)]
    pub history_limit_max: usize,

    /// Longest accepted chat message body, in bytes after JSON decoding.
    #[arg(long, env = "DUET_MAX_MESSAGE_BYTES", default_value_t = crate::protocol::DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Depth of each connection's outbound frame queue.
    #[arg(long, env = "DUET_OUTBOUND_BUFFER", default_value_t = 256)]
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            server_name: "duet".to_string(),
            db_path: None,
            token_secret: None,
            verify_url: None,
            notify_url: None,
            notify_timeout_ms: 3000,
            cors_origins: Vec::new(),
            history_limit_max: 200,
            max_message_bytes: crate::protocol::DEFAULT_MAX_MESSAGE_BYTES,
            outbound_buffer: 256,
        }
    }
}
