#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_server::storage::{FileUserStore, UserStore};

fuzz_target!(|data: &[u8]| {
    // Must return Ok or Err, never panic
    if let Ok(store) = FileUserStore::from_slice(data) {
        let username = "test-user@localhost";
        if store.authenticate(username, "verysecure").is_ok() {
            assert!(store.user_by_username(username).is_some());
        }
    }
});
