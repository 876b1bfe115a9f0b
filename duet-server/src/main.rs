use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (DUET_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("DUET_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("duet_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = duet_server::config::ServerConfig::parse();
    tracing::info!("Starting chat relay on {}", config.listen_addr);
    if config.cors_origins.is_empty() {
        tracing::warn!("No CORS origins configured, allowing any origin");
    }
    if config.db_path.is_none() {
        tracing::warn!("No --db-path given, history will not survive a restart");
    }

    let server = duet_server::server::Server::new(config);
    server.run().await
}
