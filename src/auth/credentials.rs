// Credential resolution
// Picks exactly one authentication strategy from a credential bundle

use super::types::{AuthMode, CredentialBundle, DEFAULT_OAUTH_SERVER_PATH};
use crate::error::ApiError;

const NO_AUTH_METHOD: &str = "no valid authentication method: specify username/password for Basic Authentication, username/password/oauth_server for OAuth Authentication, or access_token";

/// Resolve the authentication strategy for a bundle.
///
/// Pure function; rejects contradictory combinations rather than silently
/// preferring one of them.
pub fn resolve(bundle: &CredentialBundle) -> Result<AuthMode, ApiError> {
    if bundle.organization.trim().is_empty() {
        return Err(ApiError::ConfigError("organization is required".to_string()));
    }

    let has_username = !bundle.username.is_empty();
    let has_password = !bundle.password.is_empty();
    let has_token = !bundle.access_token.is_empty();
    let has_oauth_server = !bundle.oauth_server.is_empty();

    if has_token {
        if has_username || has_password || has_oauth_server {
            return Err(ApiError::ConfigError(
                "access_token conflicts with username, password and oauth_server".to_string(),
            ));
        }
        return Ok(AuthMode::StaticToken {
            access_token: bundle.access_token.clone(),
        });
    }

    if has_username != has_password {
        return Err(ApiError::ConfigError(
            "username and password must be specified together".to_string(),
        ));
    }

    if has_oauth_server && !has_username {
        return Err(ApiError::ConfigError(
            "oauth_server requires username and password".to_string(),
        ));
    }

    if has_username && has_oauth_server {
        let oauth_server_path = if bundle.oauth_server_path.is_empty() {
            DEFAULT_OAUTH_SERVER_PATH.to_string()
        } else {
            bundle.oauth_server_path.clone()
        };
        return Ok(AuthMode::OAuthPasswordGrant {
            username: bundle.username.clone(),
            password: bundle.password.clone(),
            oauth_server: bundle.oauth_server.clone(),
            oauth_server_path,
            oauth_port: bundle.oauth_port,
        });
    }

    if has_username {
        return Ok(AuthMode::BasicCredentials {
            username: bundle.username.clone(),
            password: bundle.password.clone(),
        });
    }

    Err(ApiError::ConfigError(NO_AUTH_METHOD.to_string()))
}
