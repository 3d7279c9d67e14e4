//! Bootstrap orchestration.
//!
//! Startup is a linear state machine with no back-edges:
//!
//! ```text
//! Start → ConfigResolved → ClientsRegistered → StoreSelected → FacadeBuilt
//!       → KeyProvisioned → EngineConstructed → Listening
//! ```
//!
//! Any failure is fatal. The provider never serves traffic from a partially
//! built state; there is no retry anywhere on this path.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{Config, EnvOverrides, resolve_issuer};
use crate::error::{BootstrapError, BootstrapResult};
use crate::key::provision_key;
use crate::op;
use crate::storage::{Client, ClientRegistry, Storage, select_store};

/// Bootstrap state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Start,
    ConfigResolved,
    ClientsRegistered,
    StoreSelected,
    FacadeBuilt,
    KeyProvisioned,
    EngineConstructed,
    Listening,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ConfigResolved => "config_resolved",
            Self::ClientsRegistered => "clients_registered",
            Self::StoreSelected => "store_selected",
            Self::FacadeBuilt => "facade_built",
            Self::KeyProvisioned => "key_provisioned",
            Self::EngineConstructed => "engine_constructed",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives startup from resolved configuration to a constructed engine.
#[derive(Debug)]
pub struct Bootstrap {
    config: Config,
    env: EnvOverrides,
    insecure: bool,
    phase: Phase,
}

impl Bootstrap {
    /// Start a bootstrap from an already-resolved configuration.
    #[must_use]
    pub fn new(config: Config, env: EnvOverrides) -> Self {
        let mut bootstrap = Self {
            config,
            env,
            insecure: false,
            phase: Phase::Start,
        };
        bootstrap.advance(Phase::ConfigResolved);
        bootstrap
    }

    /// Engine debug/insecure flag.
    #[must_use]
    pub const fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "bootstrap phases only move forward");
        tracing::debug!(from = %self.phase, to = %next, "Bootstrap phase");
        self.phase = next;
    }

    /// Client descriptors from `CLIENT_ID`, `CLIENT_SECRET`, and the configured
    /// redirect URIs. Empty when no client id is set.
    #[must_use]
    pub fn client_descriptors(&self) -> Vec<Client> {
        if self.env.client_id.is_empty() {
            tracing::warn!("CLIENT_ID is not set; every authorization request will be rejected");
            return Vec::new();
        }
        if self.config.redirect_uris.is_empty() {
            tracing::warn!(client_id = %self.env.client_id, "Client has no redirect URIs");
        }

        vec![Client::web(
            self.env.client_id.clone(),
            self.env.client_secret.clone(),
            self.config.redirect_uris.iter().cloned(),
        )]
    }

    /// Run every step up to `EngineConstructed`.
    pub fn prepare(mut self) -> BootstrapResult<Prepared> {
        let issuer = resolve_issuer(&self.config, &self.env.issuer)?;
        let port = self.config.port_number()?;

        let mut clients = ClientRegistry::new();
        clients.register_clients(self.client_descriptors())?;
        self.advance(Phase::ClientsRegistered);

        let users = select_store(&self.config, &issuer)?;
        tracing::info!(kind = users.kind().as_str(), users = users.len(), "User store ready");
        if users.is_empty() {
            tracing::warn!("User store is empty; every login will be rejected");
        }
        self.advance(Phase::StoreSelected);

        let storage = Arc::new(Storage::new(users, clients));
        self.advance(Phase::FacadeBuilt);

        let key = provision_key()?;
        self.advance(Phase::KeyProvisioned);

        let router = op::setup_server(&issuer, key, Arc::clone(&storage), self.insecure)?;
        self.advance(Phase::EngineConstructed);

        Ok(Prepared {
            issuer,
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            router,
            storage,
        })
    }
}

/// A fully constructed provider that has not bound its listener yet.
#[derive(Debug)]
pub struct Prepared {
    issuer: String,
    addr: SocketAddr,
    router: Router,
    storage: Arc<Storage>,
}

impl Prepared {
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Address the listener will bind (`0.0.0.0:<port>`).
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// The engine router, for driving requests in-process.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind the listener.
    pub async fn bind(self) -> BootstrapResult<Server> {
        let addr = self.addr;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(BootstrapError::Bind { addr, source }),
        };

        Ok(Server {
            listener,
            router: self.router,
            storage: self.storage,
            issuer: self.issuer,
        })
    }
}

/// A bound provider, ready to accept connections.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    router: Router,
    storage: Arc<Storage>,
    issuer: String,
}

impl Server {
    /// Actual bound address (useful when the port was `0`).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves.
    ///
    /// A deliberate shutdown returns `Ok(())`; any other termination of the
    /// listener is an error. Background tasks are stopped either way.
    pub async fn serve<F>(self, shutdown: F) -> BootstrapResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr().map_err(BootstrapError::Listener)?;
        let cleanup = Arc::clone(self.storage.grants()).start_cleanup_task();

        tracing::info!(
            phase = %Phase::Listening,
            addr = %addr,
            issuer = %self.issuer,
            "Server listening, press ctrl+c to stop"
        );

        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;
        stop_task(cleanup, "grant_cleanup").await;
        served.map_err(BootstrapError::Listener)?;

        tracing::info!("Server shut down");
        Ok(())
    }
}

/// Abort a background task and wait until it has been dropped.
async fn stop_task(task: JoinHandle<()>, name: &'static str) {
    task.abort();
    match task.await {
        Err(e) if e.is_panic() => {
            tracing::warn!(task = name, error = %e, "Background task panicked");
        }
        _ => tracing::debug!(task = name, "Background task stopped"),
    }
}

/// Run the whole bootstrap and serve until `shutdown` resolves.
pub async fn run<F>(
    config: Config,
    env: EnvOverrides,
    insecure: bool,
    shutdown: F,
) -> BootstrapResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let prepared = Bootstrap::new(config, env).insecure(insecure).prepare()?;
    prepared.bind().await?.serve(shutdown).await
}

/// Resolves on ctrl+c, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(client_id: &str) -> EnvOverrides {
        EnvOverrides {
            client_id: client_id.into(),
            client_secret: "s3cr3t".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_starts_config_resolved() {
        let bootstrap = Bootstrap::new(Config::default(), EnvOverrides::default());
        assert_eq!(bootstrap.phase(), Phase::ConfigResolved);
    }

    #[test]
    fn test_no_client_without_client_id() {
        let bootstrap = Bootstrap::new(Config::default(), EnvOverrides::default());
        assert!(bootstrap.client_descriptors().is_empty());
    }

    #[test]
    fn test_client_uses_configured_redirects() {
        let mut config = Config::default();
        config.redirect_uris = vec!["http://localhost:9998/callback".into()];
        let clients = Bootstrap::new(config, env("app1")).client_descriptors();

        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, "app1");
        assert!(clients[0].allows_redirect("http://localhost:9998/callback"));
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Start < Phase::ConfigResolved);
        assert!(Phase::EngineConstructed < Phase::Listening);
        assert_eq!(Phase::KeyProvisioned.to_string(), "key_provisioned");
    }

    #[tokio::test]
    async fn test_stop_task_drops_future() {
        let held = Arc::new(());
        let in_task = Arc::clone(&held);
        let task = tokio::spawn(async move {
            let _held = in_task;
            std::future::pending::<()>().await;
        });

        stop_task(task, "test").await;
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_prepare_rejects_bad_port() {
        let err = Bootstrap::new(Config::new("not-a-port"), EnvOverrides::default())
            .prepare()
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }
}
