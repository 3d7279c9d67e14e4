//! ID token signing with the provisioned key (HS256).

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::key::SigningKey;
use crate::storage::User;

/// ID token lifetime in seconds.
pub const ID_TOKEN_LIFETIME: i64 = 3600;

/// Claims carried by an ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

impl IdTokenClaims {
    /// Claims for `user` issued to `client_id`, valid from `now`.
    ///
    /// Profile and email claims are included when the scope asks for them.
    #[must_use]
    pub fn new(issuer: &str, client_id: &str, user: &User, scope: &str, now: i64) -> Self {
        let has = |s: &str| scope.split_whitespace().any(|x| x == s);
        let profile = has("profile");
        let email = has("email");

        Self {
            iss: issuer.to_owned(),
            sub: user.id.clone(),
            aud: client_id.to_owned(),
            exp: now + ID_TOKEN_LIFETIME,
            iat: now,
            nonce: None,
            preferred_username: profile.then(|| user.username.clone()),
            name: profile.then(|| user.full_name()),
            email: email.then(|| user.email.clone()),
            email_verified: email.then_some(user.email_verified),
        }
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce;
        self
    }
}

/// Signs ID tokens with the process signing key.
pub struct IdTokenSigner {
    key: EncodingKey,
}

impl IdTokenSigner {
    #[must_use]
    pub fn new(key: &SigningKey) -> Self {
        Self {
            key: EncodingKey::from_secret(key.secret()),
        }
    }

    /// Encode and sign `claims` as a compact JWT.
    pub fn sign(&self, claims: &IdTokenClaims) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.key)
    }
}

impl std::fmt::Debug for IdTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenSigner")
            .field("alg", &"HS256")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    use super::*;
    use crate::storage::memory::demo_user;

    const ISSUER: &str = "http://localhost:9998/";

    #[test]
    fn test_claims_follow_scope() {
        let user = demo_user(ISSUER);
        let claims = IdTokenClaims::new(ISSUER, "app1", &user, "openid", 100);
        assert_eq!(claims.sub, "id1");
        assert_eq!(claims.exp, 100 + ID_TOKEN_LIFETIME);
        assert!(claims.email.is_none());
        assert!(claims.name.is_none());

        let scope = "openid email profile";
        let claims = IdTokenClaims::new(ISSUER, "app1", &user, scope, 100);
        assert_eq!(claims.email.as_deref(), Some("test-user@localhost"));
        assert_eq!(claims.name.as_deref(), Some("Test User"));
    }

    #[test]
    fn test_sign_verifies_with_same_key() {
        let key = SigningKey::from_bytes([9; 32]);
        let signer = IdTokenSigner::new(&key);
        let user = demo_user(ISSUER);
        let now = chrono::Utc::now().timestamp();
        let claims = IdTokenClaims::new(ISSUER, "app1", &user, "openid", now);
        let claims = claims.with_nonce(Some("n-0S6_WzA2Mj".into()));

        let jwt = signer.sign(&claims).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["app1"]);
        validation.set_issuer(&[ISSUER]);
        let decoding = DecodingKey::from_secret(key.secret());
        let decoded = decode::<IdTokenClaims>(&jwt, &decoding, &validation).unwrap();
        assert_eq!(decoded.claims, claims);
    }
}
