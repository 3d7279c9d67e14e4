//! Error types for the identity provider bootstrap.
//!
//! Every variant here is fatal at startup: the bootstrap never retries and never
//! serves from a partially-initialized provider.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::bootstrap::Phase;

/// Configuration errors (environment values, issuer, port).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Issuer override is not an absolute http(s) URL with a host.
    #[error("Invalid issuer '{issuer}': {reason}")]
    InvalidIssuer {
        /// Issuer value as supplied
        issuer: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Issuer uses plain http for a non-loopback host while insecure mode is off.
    #[error("Issuer '{issuer}' must use https unless it is loopback or insecure mode is on")]
    InsecureIssuer {
        /// Issuer value as supplied
        issuer: String,
    },

    /// Port does not parse as a TCP port number.
    #[error("Invalid port '{port}'")]
    InvalidPort {
        /// Port value as supplied
        port: String,
    },

    /// Env file exists but could not be loaded, or an explicit one is missing.
    #[error("Failed to load env file {path}: {source}")]
    EnvFile {
        /// Env file path
        path: PathBuf,
        /// Read or parse failure
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigError {
    /// Create an invalid issuer error.
    #[must_use]
    pub fn invalid_issuer(issuer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIssuer {
            issuer: issuer.into(),
            reason: reason.into(),
        }
    }

    /// Create an env file error tagged with its path.
    #[must_use]
    pub fn env_file(path: impl Into<PathBuf>, source: dotenvy::Error) -> Self {
        Self::EnvFile {
            path: path.into(),
            source,
        }
    }
}

/// Client registry errors.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A client with the same id was already registered.
    #[error("Client '{client_id}' is already registered")]
    DuplicateClient {
        /// Conflicting client id
        client_id: String,
    },

    /// Client id is empty.
    #[error("Client id must not be empty")]
    EmptyClientId,
}

/// User store construction errors.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Users file could not be read.
    #[error("Failed to read users file {path}: {source}")]
    Io {
        /// Users file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Users file is not valid JSON for the expected shape.
    #[error("Failed to parse users file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A record's `id` disagrees with the key it is stored under.
    #[error("User record under key '{key}' has mismatched id '{id}'")]
    MismatchedId {
        /// Map key in the users file
        key: String,
        /// `id` field of the record
        id: String,
    },

    /// Two records share an id.
    #[error("User id '{id}' is defined more than once")]
    DuplicateId {
        /// Conflicting id
        id: String,
    },

    /// Two records share a username.
    #[error("Username '{username}' is defined more than once")]
    DuplicateUsername {
        /// Conflicting username
        username: String,
    },
}

impl StoreError {
    /// Create an I/O error tagged with the users file path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Key provisioning errors.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// The operating system random source failed.
    #[error("Random source failed: {0}")]
    RandomSource(#[from] rand::rand_core::OsError),
}

/// Provider engine construction errors.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Issuer rejected by the engine.
    #[error(transparent)]
    Issuer(#[from] ConfigError),

    /// An endpoint URL could not be joined onto the issuer.
    #[error("Failed to build endpoint '{path}': {source}")]
    Endpoint {
        /// Relative endpoint path
        path: &'static str,
        /// URL join failure
        #[source]
        source: url::ParseError,
    },
}

/// Authentication failures raised by user stores and the client registry.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No such user or client.
    #[error("Unknown principal")]
    UnknownPrincipal,

    /// Credentials did not match.
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Fatal bootstrap failure, one variant per failing step.
#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    /// Configuration or issuer resolution failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client registration failed.
    #[error("Client registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// User store selection failed.
    #[error("Cannot create user store: {0}")]
    Store(#[from] StoreError),

    /// Signing key provisioning failed.
    #[error("Cannot generate random key: {0}")]
    Key(#[from] KeyError),

    /// Provider engine construction failed.
    #[error("Cannot construct provider engine: {0}")]
    Engine(#[from] EngineError),

    /// Listener could not bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested socket address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Listener terminated for a reason other than a deliberate shutdown.
    #[error("Server terminated: {0}")]
    Listener(#[source] io::Error),
}

impl BootstrapError {
    /// Last phase reached before the failure.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Config(_) | Self::Registry(_) => Phase::ConfigResolved,
            Self::Store(_) => Phase::ClientsRegistered,
            Self::Key(_) => Phase::FacadeBuilt,
            Self::Engine(_) => Phase::KeyProvisioned,
            Self::Bind { .. } => Phase::EngineConstructed,
            Self::Listener(_) => Phase::Listening,
        }
    }
}

/// Result type alias for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_path() {
        let source = io::Error::from(io::ErrorKind::NotFound);
        let err = StoreError::io("/nope/users.json", source);
        assert!(err.to_string().contains("/nope/users.json"));
    }

    #[test]
    fn test_bootstrap_error_phase() {
        let source = io::Error::from(io::ErrorKind::NotFound);
        let err: BootstrapError = StoreError::io("users.json", source).into();
        assert_eq!(err.phase(), Phase::ClientsRegistered);

        let err: BootstrapError = RegistryError::EmptyClientId.into();
        assert_eq!(err.phase(), Phase::ConfigResolved);

        let err = BootstrapError::Listener(io::Error::other("boom"));
        assert_eq!(err.phase(), Phase::Listening);
    }

    #[test]
    fn test_bootstrap_error_message_names_step() {
        let err: BootstrapError = ConfigError::InvalidPort {
            port: "http".into(),
        }
        .into();
        assert!(err.to_string().contains("http"));
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
