//! User and client storage handed to the provider engine.
//!
//! Two user store variants share one lookup/authenticate contract:
//! - [`MemoryUserStore`]: ephemeral, seeded with one demo user bound to the issuer
//! - [`FileUserStore`]: parsed once from a JSON users file, read-only afterwards
//!
//! [`select_store`] picks one from configuration; [`Storage`] bundles it with the
//! client registry and the engine's grant state.

pub mod client;
pub mod file;
pub mod grants;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};

pub use client::{Client, ClientRegistry};
pub use file::FileUserStore;
pub use grants::GrantStore;
pub use memory::MemoryUserStore;

use crate::config::Config;
use crate::error::{AuthError, StoreError};

/// A user known to the identity provider.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Stable subject identifier.
    #[serde(default)]
    pub id: String,
    /// Login name.
    pub username: String,
    /// Plaintext password.
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub phone_verified: bool,
    /// BCP 47 language tag.
    #[serde(default)]
    pub preferred_language: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Display name built from first and last name.
    #[must_use]
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        name.trim().to_owned()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

/// Which construction strategy produced a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-memory, auto-seeded.
    Ephemeral,
    /// Parsed from a users file.
    File,
}

impl StoreKind {
    /// Short label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::File => "file",
        }
    }
}

/// Lookup and authentication contract consumed by the provider engine.
///
/// Stores are immutable once built and may be read concurrently.
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Construction strategy of this store.
    fn kind(&self) -> StoreKind;

    /// Look up a user by subject id.
    fn user_by_id(&self, id: &str) -> Option<&User>;

    /// Look up a user by login name.
    fn user_by_username(&self, username: &str) -> Option<&User>;

    /// Number of users.
    fn len(&self) -> usize;

    /// True if the store holds no users and will reject every login.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check a username/password pair.
    fn authenticate(&self, username: &str, password: &str) -> Result<&User, AuthError> {
        let user = self
            .user_by_username(username)
            .ok_or(AuthError::UnknownPrincipal)?;
        if secrets_match(&user.password, password) {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Pick the user store for `config`.
///
/// Without a users file this builds the ephemeral store seeded from `issuer` and
/// never fails. With a users file, any I/O or parse failure is returned and must
/// be treated as fatal. A file holding zero users is accepted.
pub fn select_store(config: &Config, issuer: &str) -> Result<Arc<dyn UserStore>, StoreError> {
    match config.users_file.as_deref() {
        None => Ok(Arc::new(MemoryUserStore::seeded(issuer))),
        Some(path) => Ok(Arc::new(FileUserStore::from_path(path)?)),
    }
}

/// Single handle over users, clients, and grant state, shared with the engine.
pub struct Storage {
    users: Arc<dyn UserStore>,
    clients: ClientRegistry,
    grants: Arc<GrantStore>,
}

impl Storage {
    /// Wrap a user store and a fully-populated client registry.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, clients: ClientRegistry) -> Self {
        Self {
            users,
            clients,
            grants: Arc::new(GrantStore::new()),
        }
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub const fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    #[must_use]
    pub fn grants(&self) -> &Arc<GrantStore> {
        &self.grants
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("users", &self.users.kind())
            .field("user_count", &self.users.len())
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// Users indexed by id and username. Shared by both store variants.
#[derive(Debug, Default)]
pub(crate) struct UserTable {
    by_id: HashMap<String, User>,
    by_username: HashMap<String, String>,
}

impl UserTable {
    /// Table holding exactly `user`.
    pub(crate) fn single(user: User) -> Self {
        let mut table = Self::default();
        table.index(user);
        table
    }

    /// Add `user`, rejecting a repeated id or username.
    pub(crate) fn insert(&mut self, user: User) -> Result<(), StoreError> {
        if self.by_id.contains_key(&user.id) {
            return Err(StoreError::DuplicateId { id: user.id });
        }
        if self.by_username.contains_key(&user.username) {
            return Err(StoreError::DuplicateUsername {
                username: user.username,
            });
        }
        self.index(user);
        Ok(())
    }

    fn index(&mut self, user: User) {
        self.by_username
            .insert(user.username.clone(), user.id.clone());
        self.by_id.insert(user.id.clone(), user);
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<&User> {
        self.by_id.get(id)
    }

    pub(crate) fn by_username(&self, username: &str) -> Option<&User> {
        self.by_username
            .get(username)
            .and_then(|id| self.by_id.get(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub(crate) fn secrets_match(expected: &str, given: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(given.as_bytes());
    let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
