//! Kimai MCP remote server.
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!   MCP client           │                 REMOTE SERVER                     │
//!   ─────────────────────┼─▶ trace ─▶ security headers ─▶ cors ─▶ timeout   │
//!                        │        ─▶ rate limit ─▶ enumeration guard         │
//!                        │        ─▶ auth ─▶ /sse, /messages (sessions)      │
//!                        │                                                   │
//!                        │   background: session sweep, protection janitor   │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use kimai_mcp_remote::config::{load_config, validate_config, ConfigError, ServerConfig};
use kimai_mcp_remote::lifecycle::{signals, Shutdown};
use kimai_mcp_remote::observability::{logging, metrics};
use kimai_mcp_remote::security::ServerToken;
use kimai_mcp_remote::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "kimai-mcp-remote")]
#[command(version, about = "Remote HTTP/SSE server for the Kimai MCP tools")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    port: Option<u16>,

    /// Kimai server URL
    #[arg(long, env = "KIMAI_URL")]
    kimai_url: Option<String>,

    /// Token clients must present (generated when unset)
    #[arg(long, env = "MCP_SERVER_TOKEN", hide_env_values = true)]
    server_token: Option<String>,

    /// Allowed CORS origins
    #[arg(long, num_args = 1..)]
    allowed_origins: Option<Vec<String>>,

    #[arg(long)]
    requests_per_minute: Option<u32>,

    #[arg(long)]
    burst_limit: Option<u32>,

    /// Disable rate limiting
    #[arg(long)]
    no_rate_limit: bool,

    #[arg(long)]
    max_sessions: Option<usize>,

    /// Session idle timeout in seconds
    #[arg(long)]
    session_ttl: Option<u64>,

    #[arg(long)]
    max_404_per_minute: Option<u32>,

    /// Enumeration block duration in seconds
    #[arg(long)]
    block_duration: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if self.host.is_some() || self.port.is_some() {
            let (default_host, default_port) = config
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(h, p)| (h.to_string(), p.parse().unwrap_or(8000)))
                .unwrap_or_else(|| ("0.0.0.0".to_string(), 8000));
            let host = self.host.unwrap_or(default_host);
            let port = self.port.unwrap_or(default_port);
            config.listener.bind_address = format!("{host}:{port}");
        }
        if let Some(url) = self.kimai_url {
            config.kimai.base_url = url;
        }
        if let Some(token) = self.server_token {
            config.auth.server_token = Some(token);
        }
        if let Some(origins) = self.allowed_origins {
            config.cors.allowed_origins = origins;
        }
        if let Some(v) = self.requests_per_minute {
            config.rate_limit.requests_per_minute = v;
        }
        if let Some(v) = self.burst_limit {
            config.rate_limit.burst_limit = v;
        }
        if self.no_rate_limit {
            config.rate_limit.enabled = false;
        }
        if let Some(v) = self.max_sessions {
            config.sessions.max_sessions = v;
        }
        if let Some(v) = self.session_ttl {
            config.sessions.session_ttl_seconds = v;
        }
        if let Some(v) = self.max_404_per_minute {
            config.enumeration.max_404_per_minute = v;
        }
        if let Some(v) = self.block_duration {
            config.enumeration.block_duration_seconds = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("kimai-mcp-remote v{} starting", env!("CARGO_PKG_VERSION"));

    let token = match &config.auth.server_token {
        Some(token) => ServerToken::new(token.clone()),
        None => {
            let token = ServerToken::generate();
            tracing::info!("Generated authentication token for this server: {}", token.expose());
            tracing::info!("Clients must send it as 'Authorization: Bearer <token>'");
            token
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        kimai_url = %config.kimai.base_url,
        rate_limit_enabled = config.rate_limit.enabled,
        requests_per_minute = config.rate_limit.requests_per_minute,
        burst_limit = config.rate_limit.burst_limit,
        max_sessions = config.sessions.max_sessions,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config, token)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
