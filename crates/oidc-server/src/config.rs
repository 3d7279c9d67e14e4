//! Configuration for the identity provider.
//!
//! A [`Config`] is built once by overlaying environment variables onto a set of
//! defaults and is never mutated afterwards.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ConfigError;

/// Default values.
pub mod defaults {
    /// Default listen port.
    pub const PORT: &str = "9998";

    /// Host used when synthesizing the issuer from the port.
    pub const ISSUER_HOST: &str = "localhost";

    /// Env file loaded when no explicit file is given.
    pub const ENV_FILE: &str = ".env";
}

/// Environment variable names.
pub mod vars {
    /// Listen port.
    pub const PORT: &str = "PORT";

    /// Path to a JSON users file.
    pub const USERS_FILE: &str = "USERS_FILE";

    /// Comma-separated redirect URIs for the registered client.
    pub const REDIRECT_URI: &str = "REDIRECT_URI";

    /// Issuer URL override.
    pub const ISSUER: &str = "ISSUER";

    /// Client id of the registered client.
    pub const CLIENT_ID: &str = "CLIENT_ID";

    /// Client secret of the registered client.
    pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen port, kept as given.
    pub port: String,

    /// Users file; `None` selects the ephemeral store.
    pub users_file: Option<PathBuf>,

    /// Redirect URIs for the registered client, in configuration order.
    pub redirect_uris: Vec<String>,
}

impl Config {
    /// Create a configuration with the given port and no users file or redirect URIs.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            users_file: None,
            redirect_uris: Vec::new(),
        }
    }

    /// Overlay the process environment onto `defaults`.
    #[must_use]
    pub fn from_env_vars(defaults: Self) -> Self {
        Self::from_lookup(defaults, |name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup` onto `defaults`.
    ///
    /// Variables that are unset or empty leave the default in place.
    #[must_use]
    pub fn from_lookup<F>(defaults: Self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Self {
            port: get(vars::PORT).unwrap_or(defaults.port),
            users_file: get(vars::USERS_FILE)
                .map(PathBuf::from)
                .or(defaults.users_file),
            redirect_uris: get(vars::REDIRECT_URI)
                .map(|v| split_list(&v))
                .unwrap_or(defaults.redirect_uris),
        }
    }

    /// Create a test configuration on an ephemeral port.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new("0")
    }

    /// Parse the port as a TCP port number.
    pub fn port_number(&self) -> Result<u16, ConfigError> {
        let port = self.port.clone();
        self.port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort { port })
    }

    /// Issuer synthesized from the port: `http://localhost:<port>/`.
    #[must_use]
    pub fn local_issuer(&self) -> String {
        format!("http://{}:{}/", defaults::ISSUER_HOST, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(defaults::PORT)
    }
}

/// Values read from the environment next to [`Config`]: issuer override and
/// client credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `ISSUER`; empty means "compute from the port".
    pub issuer: String,

    /// `CLIENT_ID`.
    pub client_id: String,

    /// `CLIENT_SECRET`.
    pub client_secret: String,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`; missing variables become empty strings.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            issuer: lookup(vars::ISSUER).unwrap_or_default(),
            client_id: lookup(vars::CLIENT_ID).unwrap_or_default(),
            client_secret: lookup(vars::CLIENT_SECRET).unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for EnvOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvOverrides")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &!self.client_secret.is_empty())
            .finish()
    }
}

/// Resolve the issuer URL.
///
/// A non-empty `env_override` wins and is kept verbatim, except that a missing
/// trailing slash is appended. Otherwise the issuer is `http://localhost:<port>/`.
/// The override must be an absolute http(s) URL with a host.
pub fn resolve_issuer(config: &Config, env_override: &str) -> Result<String, ConfigError> {
    let env_override = env_override.trim();
    if env_override.is_empty() {
        return Ok(config.local_issuer());
    }

    let invalid = |reason: String| ConfigError::invalid_issuer(env_override, reason);

    let url = Url::parse(env_override)
        .map_err(|err| invalid(err.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".into()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment".into()));
    }

    if env_override.ends_with('/') {
        Ok(env_override.to_owned())
    } else {
        Ok(format!("{env_override}/"))
    }
}

/// Load environment variables from an env file.
///
/// An explicit `path` must exist. Without one, `./.env` is optional: only a
/// missing file is skipped, any other failure (unreadable, malformed) is an
/// error. Returns the path that was loaded.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => load_from(path).map(|()| Some(path.to_path_buf())),
        None => load_optional(Path::new(defaults::ENV_FILE)),
    }
}

/// Load `path` if it exists.
pub fn load_optional(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(e) if e.not_found() => Ok(None),
        Err(source) => Err(ConfigError::env_file(path, source)),
    }
}

fn load_from(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path).map_err(|source| ConfigError::env_file(path, source))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port, "9998");
        assert!(config.users_file.is_none());
        assert!(config.redirect_uris.is_empty());
    }

    #[test]
    fn test_overlay_keeps_defaults_when_unset() {
        let config = Config::from_lookup(Config::default(), lookup(&[]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overlay_applies_env() {
        let config = Config::from_lookup(
            Config::default(),
            lookup(&[
                ("PORT", "8080"),
                ("USERS_FILE", "/etc/oidc/users.json"),
                ("REDIRECT_URI", "http://a/cb, http://b/cb,,"),
            ]),
        );
        assert_eq!(config.port, "8080");
        let users_file = PathBuf::from("/etc/oidc/users.json");
        assert_eq!(config.users_file, Some(users_file));
        assert_eq!(config.redirect_uris, vec!["http://a/cb", "http://b/cb"]);
    }

    #[test]
    fn test_empty_env_value_is_absent() {
        let config = Config::from_lookup(Config::default(), lookup(&[("PORT", "")]));
        assert_eq!(config.port, "9998");
    }

    #[test]
    fn test_port_number() {
        assert_eq!(Config::default().port_number().unwrap(), 9998);
        assert!(matches!(
            Config::new("http").port_number(),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_resolve_issuer_local() {
        let issuer = resolve_issuer(&Config::default(), "").unwrap();
        assert_eq!(issuer, "http://localhost:9998/");
    }

    #[test]
    fn test_resolve_issuer_override_verbatim() {
        let issuer = "https://id.example.com/";
        assert_eq!(resolve_issuer(&Config::default(), issuer).unwrap(), issuer);
    }

    #[test]
    fn test_resolve_issuer_appends_slash() {
        let issuer = "https://id.example.com/realm";
        let resolved = resolve_issuer(&Config::default(), issuer).unwrap();
        assert_eq!(resolved, "https://id.example.com/realm/");
    }

    #[test]
    fn test_resolve_issuer_rejects_garbage() {
        let config = Config::default();
        assert!(resolve_issuer(&config, "not a url").is_err());
        assert!(resolve_issuer(&config, "ftp://id.example.com/").is_err());
        let with_query = "https://id.example.com/?a=b";
        assert!(resolve_issuer(&config, with_query).is_err());
    }

    #[test]
    fn test_env_overrides_debug_hides_secret() {
        let env = EnvOverrides::from_lookup(lookup(&[
            ("CLIENT_ID", "app1"),
            ("CLIENT_SECRET", "super-secret"),
        ]));
        let debug = format!("{env:?}");
        assert!(debug.contains("app1"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_missing_default_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_optional(&dir.path().join(".env")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_malformed_env_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "OIDC_TEST_BEFORE_BAD_LINE=1\nthis is not valid\n").unwrap();

        let err = load_optional(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));

        let err = load_env_file(Some(&path)).unwrap_err();
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn test_missing_explicit_env_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prod.env");
        assert!(load_env_file(Some(&path)).is_err());
    }

    #[test]
    fn test_env_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(&path, "OIDC_TEST_ENV_FILE_VALUE=loaded\n").unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();
        assert_eq!(loaded, Some(path));
        let value = std::env::var("OIDC_TEST_ENV_FILE_VALUE").unwrap();
        assert_eq!(value, "loaded");
    }
}
