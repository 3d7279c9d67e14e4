//! In-memory grant state for the provider engine: pending authorization
//! requests, authorization codes, and issued tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Pending authorization request lifetime: 10 minutes.
const AUTH_REQUEST_LIFETIME: u64 = 600;
/// Auth code lifetime: 10 minutes.
const AUTH_CODE_LIFETIME: u64 = 600;
/// Access token lifetime: 1 hour.
pub const ACCESS_TOKEN_LIFETIME: u64 = 3600;
/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_LIFETIME: u64 = 30 * 24 * 3600;
/// Cleanup interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// An authorization request waiting for the user to log in.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    created_at: Instant,
}

impl AuthRequest {
    #[must_use]
    pub fn new(client_id: String, redirect_uri: String, scope: String) -> Self {
        Self {
            client_id,
            redirect_uri,
            scope,
            state: None,
            nonce: None,
            code_challenge: None,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > AUTH_REQUEST_LIFETIME
    }
}

/// An authorization code issued after a successful login.
struct AuthCode {
    request: AuthRequest,
    user_id: String,
    created_at: Instant,
    used: bool,
}

impl AuthCode {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > AUTH_CODE_LIFETIME
    }
}

struct AccessToken {
    grant: Grant,
    created_at: Instant,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > ACCESS_TOKEN_LIFETIME
    }
}

struct RefreshToken {
    grant: Grant,
    access_token: String,
    created_at: Instant,
}

impl RefreshToken {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > REFRESH_TOKEN_LIFETIME
    }
}

/// Who a code or token was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
}

/// Authorization code details returned on consumption.
#[derive(Debug, Clone)]
pub struct CodeGrant {
    pub grant: Grant,
    pub redirect_uri: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
}

/// A token pair returned from token creation/refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub grant: Grant,
}

/// Grant state store.
#[derive(Default)]
pub struct GrantStore {
    requests: RwLock<HashMap<String, AuthRequest>>,
    auth_codes: RwLock<HashMap<String, AuthCode>>,
    access_tokens: RwLock<HashMap<String, AccessToken>>,
    refresh_tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl GrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a random token using two UUIDs (256 bits).
    fn generate_token() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    /// Park an authorization request until the user logs in. Returns its id.
    pub async fn create_auth_request(&self, request: AuthRequest) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.requests.write().await.insert(id.clone(), request);
        id
    }

    /// Look up a pending, unexpired authorization request.
    pub async fn auth_request(&self, id: &str) -> Option<AuthRequest> {
        let requests = self.requests.read().await;
        requests.get(id).filter(|r| !r.is_expired()).cloned()
    }

    /// Finish a pending request for `user_id`, issuing a one-time code.
    ///
    /// Returns the code and the finished request.
    pub async fn complete_auth_request(
        &self,
        id: &str,
        user_id: &str,
    ) -> Option<(String, AuthRequest)> {
        let request = self.requests.write().await.remove(id)?;
        if request.is_expired() {
            return None;
        }

        let code = Self::generate_token();
        let auth_code = AuthCode {
            request: request.clone(),
            user_id: user_id.to_owned(),
            created_at: Instant::now(),
            used: false,
        };
        self.auth_codes
            .write()
            .await
            .insert(code.clone(), auth_code);

        Some((code, request))
    }

    /// Consume an authorization code (one-time use).
    ///
    /// Returns the code details if valid, unused, and not expired.
    pub async fn consume_auth_code(&self, code: &str) -> Option<CodeGrant> {
        let mut codes = self.auth_codes.write().await;
        let auth_code = codes.get_mut(code)?;

        if auth_code.used || auth_code.is_expired() {
            return None;
        }

        auth_code.used = true;

        Some(CodeGrant {
            grant: Grant {
                client_id: auth_code.request.client_id.clone(),
                user_id: auth_code.user_id.clone(),
                scope: auth_code.request.scope.clone(),
            },
            redirect_uri: auth_code.request.redirect_uri.clone(),
            nonce: auth_code.request.nonce.clone(),
            code_challenge: auth_code.request.code_challenge.clone(),
        })
    }

    /// Create an access + refresh token pair.
    pub async fn create_token_pair(&self, grant: Grant) -> TokenPair {
        let access = Self::generate_token();
        let refresh = Self::generate_token();

        let access_entry = AccessToken {
            grant: grant.clone(),
            created_at: Instant::now(),
        };
        let refresh_entry = RefreshToken {
            grant: grant.clone(),
            access_token: access.clone(),
            created_at: Instant::now(),
        };

        self.access_tokens
            .write()
            .await
            .insert(access.clone(), access_entry);
        self.refresh_tokens
            .write()
            .await
            .insert(refresh.clone(), refresh_entry);

        TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: ACCESS_TOKEN_LIFETIME,
            grant,
        }
    }

    /// Validate an access token. Returns its grant if valid.
    pub async fn validate_access_token(&self, token: &str) -> Option<Grant> {
        let tokens = self.access_tokens.read().await;
        let access = tokens.get(token)?;
        if access.is_expired() {
            return None;
        }
        Some(access.grant.clone())
    }

    /// Refresh a token pair for `client_id`: invalidate old tokens and issue new ones.
    ///
    /// A refresh token presented by a different client is left untouched.
    pub async fn refresh_token_pair(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Option<TokenPair> {
        let old = {
            let mut tokens = self.refresh_tokens.write().await;
            if tokens.get(refresh_token)?.grant.client_id != client_id {
                return None;
            }
            tokens.remove(refresh_token)?
        };

        if old.is_expired() {
            return None;
        }

        self.access_tokens.write().await.remove(&old.access_token);

        Some(self.create_token_pair(old.grant).await)
    }

    /// Start background cleanup of expired requests, codes, and tokens.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    async fn cleanup_expired(&self) {
        self.requests
            .write()
            .await
            .retain(|_, request| !request.is_expired());

        // Used codes are kept until expiry so replays still fail.
        self.auth_codes
            .write()
            .await
            .retain(|_, code| !code.is_expired());

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired());
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired access tokens");
            }
        }

        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired());
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired refresh tokens");
            }
        }
    }
}

impl std::fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthRequest {
        AuthRequest::new(
            "client1".into(),
            "http://localhost/callback".into(),
            "openid".into(),
        )
    }

    fn grant() -> Grant {
        Grant {
            client_id: "client1".into(),
            user_id: "id1".into(),
            scope: "openid".into(),
        }
    }

    async fn is_live(store: &GrantStore, access_token: &str) -> bool {
        store.validate_access_token(access_token).await.is_some()
    }

    #[tokio::test]
    async fn test_auth_request_lifecycle() {
        let store = GrantStore::new();
        let id = store.create_auth_request(request()).await;
        assert!(store.auth_request(&id).await.is_some());

        let (code, finished) = store.complete_auth_request(&id, "id1").await.unwrap();
        assert_eq!(finished.client_id, "client1");
        assert!(!code.is_empty());

        // Request is gone once completed.
        assert!(store.auth_request(&id).await.is_none());
        assert!(store.complete_auth_request(&id, "id1").await.is_none());
    }

    #[tokio::test]
    async fn test_auth_code_is_one_time() {
        let store = GrantStore::new();
        let id = store.create_auth_request(request()).await;
        let (code, _) = store.complete_auth_request(&id, "id1").await.unwrap();

        let info = store.consume_auth_code(&code).await.unwrap();
        assert_eq!(info.grant, grant());
        assert_eq!(info.redirect_uri, "http://localhost/callback");

        assert!(store.consume_auth_code(&code).await.is_none());
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = GrantStore::new();
        let pair = store.create_token_pair(grant()).await;

        let found = store.validate_access_token(&pair.access_token).await;
        assert_eq!(found, Some(grant()));
        assert!(!is_live(&store, "invalid").await);
    }

    #[tokio::test]
    async fn test_refresh_token() {
        let store = GrantStore::new();
        let pair = store.create_token_pair(grant()).await;
        let token = pair.refresh_token.as_str();

        let new_pair = store.refresh_token_pair(token, "client1").await.unwrap();

        assert!(!is_live(&store, &pair.access_token).await);
        assert!(is_live(&store, &new_pair.access_token).await);
        assert!(store.refresh_token_pair(token, "client1").await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_bound_to_client() {
        let store = GrantStore::new();
        let pair = store.create_token_pair(grant()).await;
        let token = pair.refresh_token.as_str();

        assert!(store.refresh_token_pair(token, "intruder").await.is_none());
        // Still usable by its owner.
        assert!(store.refresh_token_pair(token, "client1").await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_task_releases_store_on_abort() {
        let store = Arc::new(GrantStore::new());
        let handle = Arc::clone(&store).start_cleanup_task();
        assert_eq!(Arc::strong_count(&store), 2);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(Arc::strong_count(&store), 1);
    }
}
