//! OIDC Server - Entry Point
//!
//! Exits with status 0 after a deliberate shutdown and 1 on any fatal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oidc_server::bootstrap;
use oidc_server::config::{self, Config, EnvOverrides};

#[derive(Parser, Debug)]
#[command(name = "oidc-server")]
#[command(about = "OpenID Connect identity provider")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Accept a plain-http issuer on non-loopback hosts
    #[arg(long, env = "OIDC_INSECURE")]
    insecure: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

/// Load an env file. An explicit file must exist; a missing default `.env` is
/// skipped. A file that exists but cannot be read or parsed is an error.
fn load_environment(path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    config::load_env_file(path).context("Cannot load environment")
}

#[tokio::main]
async fn main() -> ExitCode {
    // Env-backed flags are read again once the file is loaded.
    let env_file = Cli::parse().env_file;
    let loaded = load_environment(env_file.as_deref());
    let cli = Cli::parse();

    // After loading, so RUST_LOG from the file takes effect.
    init_tracing(&cli.log_level, cli.json_logs);

    match loaded {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded env file"),
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting OIDC server");

    let config = Config::from_env_vars(Config::default());
    let env = EnvOverrides::from_env();

    let shutdown = bootstrap::shutdown_signal();
    match bootstrap::run(config, env, cli.insecure, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(phase = %e.phase(), error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
