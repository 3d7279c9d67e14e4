//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! Only the `S256` method is accepted; `plain` is refused at the authorize step.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// The only supported challenge method.
pub const METHOD_S256: &str = "S256";

/// True if `method` names a supported challenge method. A missing method
/// defaults to `plain` per RFC 7636 and is therefore unsupported.
#[must_use]
pub fn is_supported_method(method: Option<&str>) -> bool {
    method == Some(METHOD_S256)
}

/// Verify a code verifier against a stored challenge.
///
/// Computes `BASE64URL(SHA256(code_verifier))` and compares to the stored challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash) == code_challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc_vector() {
        assert!(verify_s256(VERIFIER, CHALLENGE));
    }

    #[test]
    fn test_wrong_verifier() {
        assert!(!verify_s256("wrong-verifier", CHALLENGE));
    }

    #[test]
    fn test_supported_methods() {
        assert!(is_supported_method(Some("S256")));
        assert!(!is_supported_method(Some("plain")));
        assert!(!is_supported_method(None));
    }
}
