//! Fuzzing library for oidc-server.
//!
//! Targets cover the inputs read at startup: the users file and the issuer
//! override.
//!
//! # Usage
//!
//! ```bash
//! cd crates/oidc-server-fuzz
//! cargo +nightly fuzz run fuzz_users_file -- -max_total_time=60
//! ```

pub use oidc_server::config;
pub use oidc_server::storage;
