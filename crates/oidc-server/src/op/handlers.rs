//! OpenID Connect endpoint handlers.
//!
//! Implements:
//! - OpenID Connect Discovery 1.0
//! - RFC 6749: OAuth 2.0 Authorization Code Grant and Refresh
//! - RFC 7636: PKCE (S256, optional for confidential clients)
//! - OpenID Connect Core 1.0: ID token and UserInfo

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::{Basic, Bearer};
use serde::Deserialize;
use url::Url;

use super::OpState;
use super::login::render_login_page;
use super::pkce;
use super::token::IdTokenClaims;
use crate::storage::User;
use crate::storage::client::{AuthMethod, GrantType, ResponseType};
use crate::storage::grants::{AuthRequest, Grant, TokenPair};

/// Scopes advertised in discovery.
const SCOPES_SUPPORTED: &[&str] = &["openid", "profile", "email", "phone", "offline_access"];

// ─── Discovery ───────────────────────────────────────────────────────────────

/// `GET /.well-known/openid-configuration`
pub async fn handle_discovery(State(state): State<Arc<OpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "issuer": state.issuer,
        "authorization_endpoint": state.endpoints.authorization,
        "token_endpoint": state.endpoints.token,
        "userinfo_endpoint": state.endpoints.userinfo,
        "scopes_supported": SCOPES_SUPPORTED,
        "response_types_supported": [ResponseType::Code.as_str()],
        "grant_types_supported": [
            GrantType::AuthorizationCode.as_str(),
            GrantType::RefreshToken.as_str()
        ],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["HS256"],
        "token_endpoint_auth_methods_supported": [
            AuthMethod::ClientSecretBasic.as_str(),
            AuthMethod::ClientSecretPost.as_str()
        ],
        "code_challenge_methods_supported": [pkce::METHOD_S256],
        "claims_supported": [
            "iss", "sub", "aud", "exp", "iat", "nonce", "name", "given_name", "family_name",
            "preferred_username", "email", "email_verified", "phone_number",
            "phone_number_verified", "locale"
        ]
    }))
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// `GET /authorize`
///
/// Errors are shown directly until the redirect URI is known to belong to the
/// client; after that they are sent back to the client as `error` parameters.
pub async fn handle_authorize(
    State(state): State<Arc<OpState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(client_id) = query.client_id.as_deref() else {
        return bad_request("Missing client_id");
    };
    let Some(redirect_uri) = query.redirect_uri.as_deref() else {
        return bad_request("Missing redirect_uri");
    };
    let Some(client) = state.storage.clients().get(client_id) else {
        return bad_request("Unknown client_id");
    };
    if !client.allows_redirect(redirect_uri) {
        return bad_request("redirect_uri not registered for this client");
    }
    let Ok(redirect) = Url::parse(redirect_uri) else {
        return bad_request("redirect_uri is not an absolute URL");
    };

    let oauth_state = query.state.as_deref();

    let response_type = query
        .response_type
        .as_deref()
        .and_then(ResponseType::from_param);
    if !response_type.is_some_and(|rt| client.allows_response_type(rt)) {
        return redirect_with(
            redirect,
            &[("error", "unsupported_response_type")],
            oauth_state,
        );
    }

    let scope = query.scope.as_deref().unwrap_or_default();
    if !has_scope(scope, "openid") {
        return redirect_with(
            redirect,
            &[
                ("error", "invalid_scope"),
                ("error_description", "openid scope is required"),
            ],
            oauth_state,
        );
    }

    if query.code_challenge.is_some()
        && !pkce::is_supported_method(query.code_challenge_method.as_deref())
    {
        return redirect_with(
            redirect,
            &[
                ("error", "invalid_request"),
                ("error_description", "code_challenge_method must be S256"),
            ],
            oauth_state,
        );
    }

    let mut request = AuthRequest::new(
        client_id.to_owned(),
        redirect_uri.to_owned(),
        scope.to_owned(),
    );
    request.state = query.state.clone();
    request.nonce = query.nonce.clone();
    request.code_challenge = query.code_challenge.clone();

    let id = state.storage.grants().create_auth_request(request).await;

    tracing::debug!(client_id = %client_id, auth_request_id = %id, "Created authorization request");

    Html(render_login_page(client_id, &id, "", None)).into_response()
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginForm {
    pub auth_request_id: String,
    pub username: String,
    pub password: String,
}

/// `POST /login`
///
/// Checks the credentials against the user store. On success the pending
/// request becomes a one-time code and the browser is sent back to the client.
pub async fn handle_login(
    State(state): State<Arc<OpState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let grants = state.storage.grants();
    let request_id = form.auth_request_id.as_str();

    let Some(pending) = grants.auth_request(request_id).await else {
        return bad_request("Unknown or expired authorization request");
    };

    let users = state.storage.users();
    let user_id = match users.authenticate(&form.username, &form.password) {
        Ok(user) => user.id.clone(),
        Err(e) => {
            tracing::info!(client_id = %pending.client_id, error = %e, "Login failed");
            let page = render_login_page(
                &pending.client_id,
                request_id,
                &form.username,
                Some("Invalid username or password"),
            );
            return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
        }
    };

    let completed = grants.complete_auth_request(request_id, &user_id);
    let Some((code, request)) = completed.await else {
        return bad_request("Unknown or expired authorization request");
    };
    let Ok(redirect) = Url::parse(&request.redirect_uri) else {
        return bad_request("redirect_uri is not an absolute URL");
    };

    tracing::info!(client_id = %request.client_id, user_id = %user_id, "Issued authorization code");

    redirect_with(redirect, &[("code", &code)], request.state.as_deref())
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

/// `POST /oauth/token`
///
/// Clients authenticate with HTTP Basic or with `client_id`/`client_secret`
/// form fields.
pub async fn handle_token(
    State(state): State<Arc<OpState>>,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    Form(form): Form<TokenRequest>,
) -> Response {
    let basic = basic.map(|TypedHeader(auth)| auth);
    let Some((method, client_id, secret)) = client_credentials(basic.as_ref(), &form) else {
        return token_error(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "Client authentication required",
        );
    };

    let client = match state.storage.clients().authenticate(client_id, secret) {
        Ok(client) => client,
        Err(e) => {
            tracing::info!(client_id = %client_id, error = %e, "Client authentication failed");
            return token_error(
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "Client authentication failed",
            );
        }
    };

    if !client.allows_auth_method(method) {
        tracing::info!(client_id = %client_id, method = method.as_str(), "Auth method not allowed");
        return token_error(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "Authentication method not allowed for this client",
        );
    }

    let Some(grant) = GrantType::from_param(&form.grant_type) else {
        return token_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "Unsupported grant_type",
        );
    };
    if !client.allows_grant(grant) {
        return token_error(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "Grant not allowed for this client",
        );
    }

    match grant {
        GrantType::AuthorizationCode => authorization_code_grant(&state, client_id, &form).await,
        GrantType::RefreshToken => refresh_token_grant(&state, client_id, &form).await,
    }
}

/// Credentials presented by the client and the method used to send them.
fn client_credentials<'a>(
    basic: Option<&'a Authorization<Basic>>,
    form: &'a TokenRequest,
) -> Option<(AuthMethod, &'a str, &'a str)> {
    if let Some(auth) = basic {
        let method = AuthMethod::ClientSecretBasic;
        return Some((method, auth.username(), auth.password()));
    }
    let id = form.client_id.as_deref()?;
    let secret = form.client_secret.as_deref()?;
    Some((AuthMethod::ClientSecretPost, id, secret))
}

async fn authorization_code_grant(
    state: &OpState,
    client_id: &str,
    form: &TokenRequest,
) -> Response {
    let Some(ref code) = form.code else {
        return invalid_request("Missing code");
    };
    let Some(ref redirect_uri) = form.redirect_uri else {
        return invalid_request("Missing redirect_uri");
    };

    // Consume the auth code (one-time)
    let Some(code_grant) = state.storage.grants().consume_auth_code(code).await else {
        return invalid_grant("Invalid or expired authorization code");
    };

    if code_grant.grant.client_id != client_id {
        return invalid_grant("Authorization code was issued to another client");
    }
    if *redirect_uri != code_grant.redirect_uri {
        return invalid_grant("redirect_uri mismatch");
    }
    if let Some(ref challenge) = code_grant.code_challenge {
        let Some(ref verifier) = form.code_verifier else {
            return invalid_request("Missing code_verifier");
        };
        if !pkce::verify_s256(verifier, challenge) {
            return invalid_grant("PKCE verification failed");
        }
    }

    let nonce = code_grant.nonce;
    issue_tokens(state, code_grant.grant, nonce).await
}

async fn refresh_token_grant(state: &OpState, client_id: &str, form: &TokenRequest) -> Response {
    let Some(ref refresh_token) = form.refresh_token else {
        return invalid_request("Missing refresh_token");
    };

    let grants = state.storage.grants();
    let Some(pair) = grants.refresh_token_pair(refresh_token, client_id).await else {
        return invalid_grant("Invalid or expired refresh token");
    };

    tracing::info!(client_id = %client_id, "Refreshed token pair");

    match id_token_for(state, &pair.grant, None) {
        Ok(id_token) => token_success(&pair, id_token.as_deref()),
        Err(response) => response,
    }
}

async fn issue_tokens(state: &OpState, grant: Grant, nonce: Option<String>) -> Response {
    // Sign before storing so a signing failure leaves no orphaned tokens.
    let id_token = match id_token_for(state, &grant, nonce) {
        Ok(id_token) => id_token,
        Err(response) => return response,
    };

    let pair = state.storage.grants().create_token_pair(grant).await;

    tracing::info!(
        client_id = %pair.grant.client_id,
        user_id = %pair.grant.user_id,
        "Issued token pair"
    );

    token_success(&pair, id_token.as_deref())
}

/// Signed ID token for `grant`, or `None` when the `openid` scope is absent.
fn id_token_for(
    state: &OpState,
    grant: &Grant,
    nonce: Option<String>,
) -> Result<Option<String>, Response> {
    if !has_scope(&grant.scope, "openid") {
        return Ok(None);
    }

    let Some(user) = state.storage.users().user_by_id(&grant.user_id) else {
        return Err(invalid_grant("User no longer exists"));
    };

    let now = chrono::Utc::now().timestamp();
    let claims = IdTokenClaims::new(&state.issuer, &grant.client_id, user, &grant.scope, now);
    let claims = claims.with_nonce(nonce);

    match state.signer.sign(&claims) {
        Ok(id_token) => Ok(Some(id_token)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to sign ID token");
            Err(token_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Failed to sign ID token",
            ))
        }
    }
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(pair: &TokenPair, id_token: Option<&str>) -> Response {
    let mut body = serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "refresh_token": pair.refresh_token,
        "scope": pair.grant.scope
    });
    if let Some(id_token) = id_token {
        body["id_token"] = serde_json::Value::from(id_token);
    }

    let mut response = Json(body).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn token_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

fn invalid_request(description: &str) -> Response {
    token_error(StatusCode::BAD_REQUEST, "invalid_request", description)
}

fn invalid_grant(description: &str) -> Response {
    token_error(StatusCode::BAD_REQUEST, "invalid_grant", description)
}

// ─── UserInfo ────────────────────────────────────────────────────────────────

/// `GET /userinfo`
pub async fn handle_userinfo(
    State(state): State<Arc<OpState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let Some(TypedHeader(auth)) = bearer else {
        return unauthorized("invalid_request");
    };
    let grants = state.storage.grants();
    let Some(grant) = grants.validate_access_token(auth.token()).await else {
        return unauthorized("invalid_token");
    };
    let Some(user) = state.storage.users().user_by_id(&grant.user_id) else {
        return unauthorized("invalid_token");
    };

    Json(userinfo_claims(user, &grant.scope)).into_response()
}

/// Claims released for `scope`. `sub` is always present.
#[must_use]
pub fn userinfo_claims(user: &User, scope: &str) -> serde_json::Value {
    let mut claims = serde_json::Map::new();
    let mut put = |name: &str, value: serde_json::Value| {
        claims.insert(name.to_owned(), value);
    };
    put("sub", user.id.clone().into());

    if has_scope(scope, "profile") {
        put("name", user.full_name().into());
        put("given_name", user.first_name.clone().into());
        put("family_name", user.last_name.clone().into());
        put("preferred_username", user.username.clone().into());
        put("locale", user.preferred_language.clone().into());
    }
    if has_scope(scope, "email") {
        put("email", user.email.clone().into());
        put("email_verified", user.email_verified.into());
    }
    if has_scope(scope, "phone") {
        put("phone_number", user.phone.clone().into());
        put("phone_number_verified", user.phone_verified.into());
    }

    serde_json::Value::Object(claims)
}

fn unauthorized(error: &str) -> Response {
    let challenge = format!(r#"Bearer error="{error}""#);
    let body = Json(serde_json::json!({ "error": error }));
    let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        let headers = response.headers_mut();
        headers.insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn has_scope(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Redirect to `url` with `params` (and `state`, if any) appended to its query.
fn redirect_with(mut url: Url, params: &[(&str, &str)], state: Option<&str>) -> Response {
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    let location = [(header::LOCATION, url.to_string())];
    (StatusCode::FOUND, location).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::demo_user;

    #[test]
    fn test_has_scope() {
        assert!(has_scope("openid email", "openid"));
        assert!(!has_scope("openidx", "openid"));
        assert!(!has_scope("", "openid"));
    }

    #[test]
    fn test_userinfo_claims_follow_scope() {
        let user = demo_user("http://localhost:9998/");

        let claims = userinfo_claims(&user, "openid");
        assert_eq!(claims, serde_json::json!({ "sub": "id1" }));

        let claims = userinfo_claims(&user, "openid email phone");
        assert_eq!(claims["email"], "test-user@localhost");
        assert_eq!(claims["email_verified"], true);
        assert_eq!(claims["phone_number"], "+41791234567");
        assert!(claims.get("name").is_none());
    }

    #[test]
    fn test_redirect_with_appends_state() {
        let url = Url::parse("http://localhost:9999/cb?x=1").unwrap();
        let response = redirect_with(url, &[("code", "abc")], Some("s t"));
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(location, "http://localhost:9999/cb?x=1&code=abc&state=s+t");
    }
}
