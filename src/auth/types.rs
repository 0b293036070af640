// Authentication types

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Public management endpoint used when no server is configured
pub const PUBLIC_APIGEE_SERVER: &str = "api.enterprise.apigee.com";

/// Default API path prefix on the management server
pub const DEFAULT_SERVER_PATH: &str = "v1";

/// Token endpoint path used when the OAuth server path is left empty
pub const DEFAULT_OAUTH_SERVER_PATH: &str = "oauth/token";

/// Default HTTPS port for both the management and OAuth servers
pub const DEFAULT_PORT: u16 = 443;

/// Raw credential inputs, after defaults have been applied by the configuration layer.
///
/// Empty strings mean "not set". Immutable once handed to the resolver.
#[derive(Clone, Default)]
pub struct CredentialBundle {
    pub username: String,
    pub password: String,
    pub access_token: String,
    pub server: String,
    pub server_path: String,
    pub port: u16,
    pub oauth_server: String,
    pub oauth_server_path: String,
    pub oauth_port: u16,
    pub organization: String,
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "****"
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("access_token", &redact(&self.access_token))
            .field("server", &self.server)
            .field("server_path", &self.server_path)
            .field("port", &self.port)
            .field("oauth_server", &self.oauth_server)
            .field("oauth_server_path", &self.oauth_server_path)
            .field("oauth_port", &self.oauth_port)
            .field("organization", &self.organization)
            .finish()
    }
}

/// Resolved authentication strategy.
///
/// "No method selected" is not a variant: the resolver reports it as a
/// configuration error instead of building a client that cannot authenticate.
#[derive(Clone, PartialEq)]
pub enum AuthMode {
    /// HTTP Basic with the management user's credentials
    BasicCredentials { username: String, password: String },

    /// Caller-supplied bearer token, used verbatim
    StaticToken { access_token: String },

    /// Bearer tokens obtained from the OAuth server with a password grant
    OAuthPasswordGrant {
        username: String,
        password: String,
        oauth_server: String,
        oauth_server_path: String,
        oauth_port: u16,
    },
}

impl AuthMode {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::BasicCredentials { .. } => "basic",
            AuthMode::StaticToken { .. } => "static_token",
            AuthMode::OAuthPasswordGrant { .. } => "oauth_password_grant",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::BasicCredentials { username, .. } => f
                .debug_struct("BasicCredentials")
                .field("username", username)
                .field("password", &"****")
                .finish(),
            AuthMode::StaticToken { .. } => f
                .debug_struct("StaticToken")
                .field("access_token", &"****")
                .finish(),
            AuthMode::OAuthPasswordGrant {
                username,
                oauth_server,
                oauth_server_path,
                oauth_port,
                ..
            } => f
                .debug_struct("OAuthPasswordGrant")
                .field("username", username)
                .field("password", &"****")
                .field("oauth_server", oauth_server)
                .field("oauth_server_path", oauth_server_path)
                .field("oauth_port", oauth_port)
                .finish(),
        }
    }
}

/// Cached token pair. Always replaced as a whole so the expiry matches the token.
#[derive(Clone)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"****")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "****"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// OAuth token endpoint response
#[derive(Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}
