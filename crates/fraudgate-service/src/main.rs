use clap::Parser;
use fraudgate_core::artifact::registry::DEFAULT_MANIFEST_PATH;
use fraudgate_core::audit::DEFAULT_AUDIT_LOG_PATH;
use fraudgate_core::{GatewayConfig, Role};
use fraudgate_service::{build_router, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "fraudgate_service=info,fraudgate_core=info,info";

#[derive(Debug, Parser)]
#[command(name = "fraudgated", version, about = "Fraud scoring admission gateway")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8000
    #[arg(long, default_value = "127.0.0.1:8000", env = "FRAUDGATE_LISTEN")]
    listen: SocketAddr,
    /// Manifest naming the active model artifact and its SHA-256.
    #[arg(long, default_value = DEFAULT_MANIFEST_PATH, env = "FRAUDGATE_MANIFEST")]
    manifest: PathBuf,
    /// JSON Lines audit log.
    #[arg(long, default_value = DEFAULT_AUDIT_LOG_PATH, env = "FRAUDGATE_AUDIT_LOG")]
    audit_log: PathBuf,
    /// Requests admitted per identity per window.
    #[arg(long, default_value_t = 60, env = "FRAUDGATE_RATE_LIMIT_MAX")]
    rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    #[arg(long, default_value_t = 60, env = "FRAUDGATE_RATE_LIMIT_WINDOW_SECS")]
    rate_limit_window_secs: u64,
    /// Emit logs as JSON.
    #[arg(long, env = "FRAUDGATE_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        if self.rate_limit_max == 0 || self.rate_limit_window_secs == 0 {
            anyhow::bail!("rate limit max and window must both be greater than zero");
        }

        let mut config = GatewayConfig::from_env();
        config.manifest_path = self.manifest.clone();
        config.audit_log_path = self.audit_log.clone();
        config.rate_limit.max_requests = self.rate_limit_max;
        config.rate_limit.window_secs = self.rate_limit_window_secs;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = cli.gateway_config()?;
    let roles: Vec<&str> = config
        .credentials
        .configured_roles()
        .iter()
        .map(Role::as_str)
        .collect();
    if roles.is_empty() {
        warn!("no API keys configured; every scoring call will be rejected");
    } else {
        info!(roles = ?roles, "API keys configured");
    }

    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("fraudgate listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("fraudgate shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received terminate signal, shutting down");
        }
    }
}
