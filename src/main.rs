//! Greenlight API server.
//!
//! ```text
//!   client ──▶ net::Listener ──▶ lifecycle::ShutdownCoordinator (accept loop)
//!                                        │
//!                                        ▼
//!                               http::server router
//!          request id → trace → panic guard → metrics → timeout → admission
//!                                        │
//!                                        ▼
//!                     movies / users handlers ──▶ store (versioned)
//!                                        │
//!                                        └──▶ tasks::BackgroundTasks (mail)
//! ```
//!
//! Exit status: 0 after a clean shutdown, 2 when the drain had to force
//! connections closed, 1 on startup or listener failure.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};

use greenlight::config::{load_config, validate_config, ApiConfig, ConfigError, ConfigWatcher, Environment};
use greenlight::lifecycle::{forward_signals, ShutdownCoordinator};
use greenlight::mailer::LogMailer;
use greenlight::net::Listener;
use greenlight::observability::{logging, metrics};
use greenlight::tasks::BackgroundTasks;
use greenlight::HttpServer;

#[derive(Debug, Clone, Parser)]
#[command(name = "greenlight", version, about = "Greenlight movie catalogue API")]
struct Cli {
    /// TOML configuration file. Its admission section is reloaded on change.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, keeping the configured host.
    #[arg(long)]
    port: Option<u16>,

    /// Deployment environment (development, staging, production).
    #[arg(long)]
    env: Option<Environment>,

    /// Enable or disable per-client admission control.
    #[arg(long, action = ArgAction::Set)]
    limiter_enabled: Option<bool>,

    /// Sustained requests per second per client.
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Bucket capacity per client.
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Seconds in-flight requests get to finish after shutdown starts.
    #[arg(long)]
    grace_secs: Option<u64>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ApiConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{port}"),
            };
        }
        if let Some(env) = self.env {
            config.environment = env;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.admission.enabled = enabled;
        }
        if let Some(rps) = self.limiter_rps {
            config.admission.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.admission.burst = burst;
        }
        if let Some(grace) = self.grace_secs {
            config.shutdown.grace_secs = grace;
        }
    }

    fn build_config(&self) -> Result<ApiConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ApiConfig::default(),
        };
        self.apply_overrides(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("greenlight: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("greenlight: logging already initialised: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        bind_address = %config.listener.bind_address,
        admission_enabled = config.admission.enabled,
        requests_per_second = config.admission.requests_per_second,
        burst = config.admission.burst,
        grace_secs = config.shutdown.grace_secs,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listener");
            return ExitCode::from(1);
        }
    };

    let coordinator = Arc::new(ShutdownCoordinator::new(
        Duration::from_secs(config.shutdown.grace_secs),
        BackgroundTasks::new(),
    ));
    let server = HttpServer::new(config, Arc::clone(&coordinator), Arc::new(LogMailer));

    {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = forward_signals(coordinator).await {
                tracing::error!(error = %e, "signal handling failed");
            }
        });
    }

    // Kept alive until main returns.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => {
                    let limiter = server.limiter();
                    let cli = cli.clone();
                    tokio::spawn(async move {
                        while let Some(mut reloaded) = updates.recv().await {
                            cli.apply_overrides(&mut reloaded);
                            limiter.update_settings(reloaded.admission);
                        }
                    });
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    match server.run(listener).await {
        Ok(report) if report.drain_timed_out() => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped with an error");
            ExitCode::from(1)
        }
    }
}
