//! Registered OAuth/OIDC clients.
//!
//! The registry is filled once during bootstrap and is read-only afterwards, so
//! it needs no locking.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use super::secrets_match;
use crate::error::{AuthError, RegistryError};

/// Kind of application behind a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    /// Server-side application able to keep a secret.
    Web,
    /// Installed or mobile application.
    Native,
}

impl ApplicationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Native => "native",
        }
    }
}

/// How a client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// HTTP Basic with `client_id:client_secret`.
    ClientSecretBasic,
    /// `client_id` and `client_secret` form fields.
    ClientSecretPost,
}

impl AuthMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

/// Response types a client may request at the authorization endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Code,
}

impl ResponseType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
        }
    }

    /// Parse a `response_type` request parameter.
    #[must_use]
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Grant types a client may use at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parse a `grant_type` request parameter.
    #[must_use]
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

/// A registered client and what it is allowed to do.
#[derive(Clone, PartialEq, Eq)]
pub struct Client {
    /// Client identifier.
    pub id: String,
    secret: String,
    /// Exact-match redirect URIs.
    pub redirect_uris: BTreeSet<String>,
    pub application_type: ApplicationType,
    /// Accepted token endpoint authentication methods.
    pub auth_methods: Vec<AuthMethod>,
    pub response_types: Vec<ResponseType>,
    pub grant_types: Vec<GrantType>,
}

impl Client {
    /// Confidential web client using the code flow with refresh tokens.
    ///
    /// It may authenticate with either client secret method.
    #[must_use]
    pub fn web<I, S>(id: impl Into<String>, secret: impl Into<String>, redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            secret: secret.into(),
            redirect_uris: redirect_uris.into_iter().map(Into::into).collect(),
            application_type: ApplicationType::Web,
            auth_methods: vec![AuthMethod::ClientSecretBasic, AuthMethod::ClientSecretPost],
            response_types: vec![ResponseType::Code],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        }
    }

    /// True if `uri` is one of the registered redirect URIs.
    #[must_use]
    pub fn allows_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.contains(uri)
    }

    #[must_use]
    pub fn allows_auth_method(&self, method: AuthMethod) -> bool {
        self.auth_methods.contains(&method)
    }

    #[must_use]
    pub fn allows_response_type(&self, response_type: ResponseType) -> bool {
        self.response_types.contains(&response_type)
    }

    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("redirect_uris", &self.redirect_uris)
            .field("application_type", &self.application_type)
            .field("auth_methods", &self.auth_methods)
            .field("response_types", &self.response_types)
            .field("grant_types", &self.grant_types)
            .finish()
    }
}

/// Lookup table of trusted clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one client. Duplicate ids are rejected.
    pub fn register(&mut self, client: Client) -> Result<(), RegistryError> {
        if client.id.is_empty() {
            return Err(RegistryError::EmptyClientId);
        }
        if self.clients.contains_key(&client.id) {
            return Err(RegistryError::DuplicateClient {
                client_id: client.id,
            });
        }

        tracing::debug!(
            client_id = %client.id,
            application_type = client.application_type.as_str(),
            redirect_uris = client.redirect_uris.len(),
            "Registered client"
        );
        self.clients.insert(client.id.clone(), client);
        Ok(())
    }

    /// Register several clients, stopping at the first failure.
    pub fn register_clients<I>(&mut self, clients: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = Client>,
    {
        clients
            .into_iter()
            .try_for_each(|client| self.register(client))
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Check client credentials presented at the token endpoint.
    pub fn authenticate(&self, client_id: &str, secret: &str) -> Result<&Client, AuthError> {
        let client = self.get(client_id).ok_or(AuthError::UnknownPrincipal)?;
        if secrets_match(&client.secret, secret) {
            Ok(client)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Registered client ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLBACK: &str = "http://localhost:9998/callback";

    #[test]
    fn test_register_and_get() {
        let mut registry = ClientRegistry::new();
        let client = Client::web("app1", "s3cr3t", [CALLBACK]);
        registry.register(client).unwrap();

        let client = registry.get("app1").unwrap();
        assert!(client.allows_redirect(CALLBACK));
        assert!(!client.allows_redirect("http://localhost:9998/other"));
        assert!(client.allows_grant(GrantType::RefreshToken));
    }

    #[test]
    fn test_web_client_descriptor() {
        let client = Client::web("app1", "s3cr3t", [CALLBACK]);

        assert_eq!(client.application_type, ApplicationType::Web);
        assert!(client.allows_auth_method(AuthMethod::ClientSecretBasic));
        assert!(client.allows_auth_method(AuthMethod::ClientSecretPost));
        assert!(client.allows_response_type(ResponseType::Code));
        assert!(client.allows_grant(GrantType::AuthorizationCode));
    }

    #[test]
    fn test_restricted_client() {
        let mut client = Client::web("app1", "s3cr3t", [CALLBACK]);
        client.auth_methods = vec![AuthMethod::ClientSecretBasic];
        client.grant_types = vec![GrantType::AuthorizationCode];

        assert!(!client.allows_auth_method(AuthMethod::ClientSecretPost));
        assert!(!client.allows_grant(GrantType::RefreshToken));
    }

    #[test]
    fn test_params() {
        assert_eq!(ResponseType::from_param("code"), Some(ResponseType::Code));
        assert_eq!(ResponseType::from_param("token"), None);
        let grant = GrantType::from_param("refresh_token");
        assert_eq!(grant, Some(GrantType::RefreshToken));
        assert_eq!(GrantType::from_param("password"), None);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ClientRegistry::new();
        let first = Client::web("app1", "a", ["http://a/cb"]);
        let second = Client::web("app1", "b", ["http://b/cb"]);
        registry.register(first).unwrap();

        let err = registry.register(second).unwrap_err();
        let expected = RegistryError::DuplicateClient {
            client_id: "app1".into(),
        };
        assert_eq!(err, expected);

        // First registration wins.
        let client = registry.get("app1").unwrap();
        assert!(client.allows_redirect("http://a/cb"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = ClientRegistry::new();
        let client = Client::web("", "a", Vec::<String>::new());
        let err = registry.register(client).unwrap_err();
        assert_eq!(err, RegistryError::EmptyClientId);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_authenticate() {
        let mut registry = ClientRegistry::new();
        registry
            .register_clients([
                Client::web("app1", "s3cr3t", ["http://a/cb"]),
                Client::web("app2", "other", ["http://b/cb"]),
            ])
            .unwrap();

        assert_eq!(registry.ids(), vec!["app1", "app2"]);
        assert!(registry.authenticate("app1", "s3cr3t").is_ok());

        let err = registry.authenticate("app1", "other").unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        let err = registry.authenticate("nope", "x").unwrap_err();
        assert_eq!(err, AuthError::UnknownPrincipal);
    }

    #[test]
    fn test_debug_hides_secret() {
        let client = Client::web("app1", "super-secret", ["http://a/cb"]);
        assert!(!format!("{client:?}").contains("super-secret"));
    }
}
