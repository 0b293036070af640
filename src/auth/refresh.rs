// OAuth token endpoint requests (password grant and refresh)

use chrono::{Duration, Utc};
use reqwest::Client;

use super::types::{OAuthTokenResponse, TokenState};
use crate::error::ApiError;
use crate::http_client::build_base_url;

/// Public client registered with the Apigee login server for CLI tooling
const OAUTH_CLIENT_ID: &str = "edgecli";
const OAUTH_CLIENT_SECRET: &str = "edgeclisecret";

/// Lifetime assumed when the endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: i64 = 1799;

/// Token endpoint plus the credentials used for the password grant
#[derive(Clone)]
pub struct GrantEndpoint {
    client: Client,
    url: String,
    username: String,
    password: String,
}

impl GrantEndpoint {
    pub fn new(
        client: Client,
        oauth_server: &str,
        oauth_server_path: &str,
        oauth_port: u16,
        username: String,
        password: String,
    ) -> Self {
        let url = build_base_url(oauth_server, oauth_port, oauth_server_path);
        Self {
            client,
            url,
            username,
            password,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exchange username/password for a fresh token pair
    pub async fn password_grant(&self) -> Result<TokenState, ApiError> {
        tracing::info!(url = %self.url, "Requesting access token via password grant...");

        let form = [
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        self.post(&form, "password grant").await
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenState, ApiError> {
        tracing::info!(url = %self.url, "Refreshing access token...");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let mut token = self.post(&form, "token refresh").await?;

        // Some servers do not rotate refresh tokens
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn post(&self, form: &[(&str, &str)], what: &str) -> Result<TokenState, ApiError> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(OAUTH_CLIENT_ID, Some(OAUTH_CLIENT_SECRET))
            .header("Accept", "application/json;charset=utf-8")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "OAuth {} failed",
                what
            );
            return Err(ApiError::AuthError(format!(
                "{} failed: {} - {}",
                what, status, error_text
            )));
        }

        let data: OAuthTokenResponse = response.json().await.map_err(|e| {
            ApiError::AuthError(format!("failed to parse {} response: {}", what, e))
        })?;

        if data.access_token.is_empty() {
            return Err(ApiError::AuthError(format!(
                "{} response does not contain access_token",
                what
            )));
        }

        let expires_in = data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN).max(0);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                ApiError::AuthError(format!(
                    "{} response has out-of-range expires_in: {}",
                    what, expires_in
                ))
            })?;

        tracing::info!("Access token obtained via {}, expires: {}", what, expires_at.to_rfc3339());

        Ok(TokenState {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_at,
        })
    }
}
