//! OIDC Server
//!
//! Bootstraps a small OpenID Connect identity provider: resolves configuration,
//! registers the configured client, selects a user store, provisions a fresh
//! signing key, and serves the provider engine over HTTP.
//!
//! # Features
//!
//! - **Zero-config demo mode**: an in-memory store seeded with a user bound to the issuer
//! - **File-defined users**: a JSON users file parsed once at startup
//! - **Fail-fast startup**: every bootstrap error is fatal, nothing is retried
//! - **Per-process key**: 32 random bytes, never persisted, never rotated
//!
//! # Example
//!
//! ```no_run
//! use oidc_server::bootstrap::{self, Bootstrap};
//! use oidc_server::config::{Config, EnvOverrides};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env_vars(Config::default());
//!     let prepared = Bootstrap::new(config, EnvOverrides::from_env()).prepare()?;
//!     prepared.bind().await?.serve(bootstrap::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod key;
pub mod op;
pub mod storage;

pub use bootstrap::{Bootstrap, Phase};
pub use config::{Config, EnvOverrides};
pub use error::{BootstrapError, BootstrapResult};
pub use storage::{Storage, UserStore};
