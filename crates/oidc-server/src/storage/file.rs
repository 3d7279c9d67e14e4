//! User store loaded from a JSON users file.
//!
//! The file is a JSON object keyed by user id:
//!
//! ```json
//! {
//!   "id1": {
//!     "username": "alice@example.com",
//!     "password": "correct horse",
//!     "first_name": "Alice",
//!     "email": "alice@example.com",
//!     "email_verified": true
//!   }
//! }
//! ```
//!
//! A record's `id` may be omitted; if present it must equal its key. Ids and
//! usernames are unique across the file.

use std::fmt;
use std::path::Path;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

use super::{StoreKind, User, UserStore, UserTable};
use crate::error::StoreError;

/// Raw `(key, record)` entries in file order, repeated keys included.
struct Records(Vec<(String, User)>);

impl<'de> Deserialize<'de> for Records {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = Records;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of user records keyed by id")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Records, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, User>()? {
                    entries.push(entry);
                }
                Ok(Records(entries))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

/// Read-only store parsed once at startup.
#[derive(Debug)]
pub struct FileUserStore {
    users: UserTable,
}

impl FileUserStore {
    /// Read and parse the users file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let store = Self::from_slice(&bytes)?;
        tracing::debug!(path = %path.display(), users = store.len(), "Loaded users file");
        Ok(store)
    }

    /// Parse users file contents.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let Records(records) = serde_json::from_slice(bytes)?;

        let mut users = UserTable::default();
        for (key, mut user) in records {
            if user.id.is_empty() {
                user.id.clone_from(&key);
            } else if user.id != key {
                return Err(StoreError::MismatchedId { key, id: user.id });
            }
            users.insert(user)?;
        }

        Ok(Self { users })
    }
}

impl UserStore for FileUserStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fills_id_from_key() {
        let store = FileUserStore::from_slice(
            br#"{"u1": {"username": "alice", "password": "pw", "email": "alice@example.com"}}"#,
        )
        .unwrap();
        let user = store.user_by_username("alice").unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_admin);
    }

    #[test]
    fn test_parse_empty_object() {
        let store = FileUserStore::from_slice(b"{}").unwrap();
        assert!(store.is_empty());
        assert!(store.authenticate("anyone", "pw").is_err());
    }

    #[test]
    fn test_mismatched_id_rejected() {
        let err = FileUserStore::from_slice(
            br#"{"u1": {"id": "u2", "username": "alice", "password": "pw"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::MismatchedId { .. }));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let err = FileUserStore::from_slice(
            br#"{
                "u1": {"username": "alice", "password": "a"},
                "u2": {"username": "alice", "password": "b"}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername { username } if username == "alice"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = FileUserStore::from_slice(
            br#"{
                "u1": {"username": "alice", "password": "a"},
                "u1": {"username": "bob", "password": "b"}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { id } if id == "u1"));
    }

    #[test]
    fn test_explicit_id_colliding_with_key_rejected() {
        let err = FileUserStore::from_slice(
            br#"{
                "u1": {"username": "alice", "password": "a"},
                "u1": {"id": "u1", "username": "bob", "password": "b"}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn test_records_keep_file_order() {
        let store = FileUserStore::from_slice(
            br#"{
                "b": {"username": "bob", "password": "b"},
                "a": {"username": "alice", "password": "a"}
            }"#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.user_by_username("bob").unwrap().id, "b");
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = FileUserStore::from_slice(b"[1, 2").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));

        let missing_password = br#"{"u1": {"username": "no-password"}}"#;
        let err = FileUserStore::from_slice(missing_password).unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = FileUserStore::from_slice(b"[]").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }
}
