//! OpenID Connect provider engine.
//!
//! [`setup_server`] is the single construction call used by the bootstrap: it
//! takes the issuer, the signing key, the storage facade, and the insecure flag,
//! and returns an HTTP router.
//!
//! ## Endpoints
//! - `GET /.well-known/openid-configuration`: discovery document
//! - `GET /authorize`: authorization request, renders the login form
//! - `POST /login`: credential check, redirects back with a code
//! - `POST /oauth/token`: authorization code and refresh grants
//! - `GET /userinfo`: claims for a bearer access token
//! - `GET /healthz`, `GET /ready`

pub mod handlers;
pub mod login;
pub mod pkce;
pub mod token;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::{Host, Url};

use crate::error::{ConfigError, EngineError};
use crate::key::SigningKey;
use crate::storage::Storage;
use token::IdTokenSigner;

/// Route paths, relative to the issuer.
pub mod paths {
    pub const DISCOVERY: &str = ".well-known/openid-configuration";
    pub const AUTHORIZE: &str = "authorize";
    pub const LOGIN: &str = "login";
    pub const TOKEN: &str = "oauth/token";
    pub const USERINFO: &str = "userinfo";
}

/// Absolute endpoint URLs advertised in discovery.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorization: String,
    pub token: String,
    pub userinfo: String,
}

impl Endpoints {
    fn new(issuer: &Url) -> Result<Self, EngineError> {
        let join = |path: &'static str| {
            issuer
                .join(path)
                .map(String::from)
                .map_err(|source| EngineError::Endpoint { path, source })
        };

        Ok(Self {
            authorization: join(paths::AUTHORIZE)?,
            token: join(paths::TOKEN)?,
            userinfo: join(paths::USERINFO)?,
        })
    }
}

/// Shared state for engine handlers.
pub struct OpState {
    /// Issuer exactly as resolved by the bootstrap.
    pub issuer: String,
    pub endpoints: Endpoints,
    pub storage: Arc<Storage>,
    pub signer: IdTokenSigner,
}

impl std::fmt::Debug for OpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpState")
            .field("issuer", &self.issuer)
            .field("storage", &self.storage)
            .finish()
    }
}

/// Build the provider engine router.
///
/// Unless `insecure` is set, a plain-http issuer is only accepted for loopback
/// hosts.
pub fn setup_server(
    issuer: &str,
    key: SigningKey,
    storage: Arc<Storage>,
    insecure: bool,
) -> Result<Router, EngineError> {
    let url = Url::parse(issuer)
        .map_err(|e| ConfigError::invalid_issuer(issuer, e.to_string()))?;

    if url.scheme() == "http" && !insecure && !is_loopback(&url) {
        let err = ConfigError::InsecureIssuer {
            issuer: issuer.to_owned(),
        };
        return Err(EngineError::Issuer(err));
    }
    if insecure {
        tracing::warn!(issuer, "Provider engine running in insecure mode");
    }

    let state = Arc::new(OpState {
        issuer: issuer.to_owned(),
        endpoints: Endpoints::new(&url)?,
        storage,
        signer: IdTokenSigner::new(&key),
    });

    Ok(create_router(state))
}

fn create_router(state: Arc<OpState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/ready", get(readiness_check))
        .route(&at(paths::DISCOVERY), get(handlers::handle_discovery))
        .route(&at(paths::AUTHORIZE), get(handlers::handle_authorize))
        .route(&at(paths::LOGIN), post(handlers::handle_login))
        .route(&at(paths::TOKEN), post(handlers::handle_token))
        .route(&at(paths::USERINFO), get(handlers::handle_userinfo))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router path for an issuer-relative `path`.
fn at(path: &str) -> String {
    format!("/{path}")
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "oidc-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<OpState>>) -> impl IntoResponse {
    let storage = &state.storage;
    Json(serde_json::json!({
        "status": "ready",
        "service": "oidc-server",
        "version": env!("CARGO_PKG_VERSION"),
        "issuer": state.issuer,
        "user_store": storage.users().kind().as_str(),
        "users": storage.users().len(),
        "clients": storage.clients().len()
    }))
}
