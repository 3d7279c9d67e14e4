#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_server::config::{Config, resolve_issuer};

fuzz_target!(|data: &str| {
    // An accepted override always resolves to a slash-terminated issuer
    if let Ok(issuer) = resolve_issuer(&Config::default(), data) {
        assert!(issuer.ends_with('/'));
    }
});
