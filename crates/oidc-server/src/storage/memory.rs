//! Ephemeral in-memory user store.

use url::Url;

use super::{StoreKind, User, UserStore, UserTable};

/// Id of the seeded demo user.
pub const DEMO_USER_ID: &str = "id1";

/// Password of the seeded demo user.
pub const DEMO_PASSWORD: &str = "verysecure";

/// In-memory store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: UserTable,
}

impl MemoryUserStore {
    /// Store holding one demo user whose identity is derived from `issuer`.
    ///
    /// The username and email are `test-user@<issuer host>`, so a local login is
    /// consistent with the issuer the provider runs under.
    #[must_use]
    pub fn seeded(issuer: &str) -> Self {
        Self {
            users: UserTable::single(demo_user(issuer)),
        }
    }
}

impl UserStore for MemoryUserStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Ephemeral
    }

    fn user_by_id(&self, id: &str) -> Option<&User> {
        self.users.by_id(id)
    }

    fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.by_username(username)
    }

    fn len(&self) -> usize {
        self.users.len()
    }
}

/// Demo user for `issuer`.
#[must_use]
pub fn demo_user(issuer: &str) -> User {
    let login = format!("test-user@{}", issuer_host(issuer));
    User {
        id: DEMO_USER_ID.to_owned(),
        username: login.clone(),
        password: DEMO_PASSWORD.to_owned(),
        first_name: "Test".to_owned(),
        last_name: "User".to_owned(),
        email: login,
        email_verified: true,
        phone: "+41791234567".to_owned(),
        phone_verified: false,
        preferred_language: "de".to_owned(),
        is_admin: true,
    }
}

fn issuer_host(issuer: &str) -> String {
    Url::parse(issuer)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| "localhost".to_owned())
}
