use anyhow::Context;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::auth::{self, AuthMode, CredentialBundle, GrantEndpoint, TokenManager};
use crate::error::ApiError;

/// Placeholder substituted with the configured organization in request paths
pub const ORGANIZATION_PLACEHOLDER: &str = "{organization}";

/// Transport settings for the shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Idle connections kept per host
    pub max_connections: usize,

    /// Connect timeout in seconds
    pub connect_timeout: u64,

    /// Whole-request timeout in seconds
    pub request_timeout: u64,

    /// Seconds before expiry at which OAuth tokens are refreshed
    pub token_refresh_skew: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_connections: 20,
            connect_timeout: 30,
            request_timeout: 300,
            token_refresh_skew: 60,
        }
    }
}

/// Build `scheme://host:port[/path]`.
///
/// Hosts without a scheme are reached over HTTPS.
pub fn build_base_url(server: &str, port: u16, path: &str) -> String {
    let server = server.trim_end_matches('/');
    let origin = if server.starts_with("http://") || server.starts_with("https://") {
        format!("{}:{}", server, port)
    } else {
        format!("https://{}:{}", server, port)
    };

    let path = path.trim_matches('/');
    if path.is_empty() {
        origin
    } else {
        format!("{}/{}", origin, path)
    }
}

/// Response from the management API, left unparsed for the caller
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .context("Failed to parse response body as JSON")
            .map_err(ApiError::Internal)
    }

    /// Body as (lossy) UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// How the Authorization header is produced
enum Authorizer {
    /// Precomputed header (Basic credentials or static bearer)
    Fixed(HeaderValue),

    /// Bearer token from the OAuth token manager
    OAuth(TokenManager),
}

/// Authenticated client for the Apigee management API.
///
/// Built once per process and shared by every resource operation.
pub struct ApigeeClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// `scheme://server:port/server_path`
    base_url: String,

    organization: String,

    /// Resolved authentication strategy
    mode: AuthMode,

    authorizer: Authorizer,
}

impl ApigeeClient {
    /// Resolve the credentials and build the client.
    ///
    /// Fails before any network call if the bundle is inconsistent.
    pub fn new(bundle: &CredentialBundle, options: &HttpOptions) -> Result<Self, ApiError> {
        let mode = auth::resolve(bundle)?;

        let client = Client::builder()
            .pool_max_idle_per_host(options.max_connections)
            .connect_timeout(Duration::from_secs(options.connect_timeout))
            .timeout(Duration::from_secs(options.request_timeout))
            .build()?;

        let authorizer = match &mode {
            AuthMode::BasicCredentials { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Authorizer::Fixed(sensitive_header(&format!("Basic {}", encoded))?)
            }
            AuthMode::StaticToken { access_token } => {
                Authorizer::Fixed(sensitive_header(&format!("Bearer {}", access_token))?)
            }
            AuthMode::OAuthPasswordGrant {
                username,
                password,
                oauth_server,
                oauth_server_path,
                oauth_port,
            } => {
                let endpoint = GrantEndpoint::new(
                    client.clone(),
                    oauth_server,
                    oauth_server_path,
                    *oauth_port,
                    username.clone(),
                    password.clone(),
                );
                Authorizer::OAuth(TokenManager::new(endpoint, options.token_refresh_skew))
            }
        };

        let base_url = build_base_url(&bundle.server, bundle.port, &bundle.server_path);

        tracing::info!(
            auth_mode = mode.name(),
            base_url = %base_url,
            organization = %bundle.organization,
            "Apigee client configured"
        );

        Ok(Self {
            client,
            base_url,
            organization: bundle.organization.clone(),
            mode,
            authorizer,
        })
    }

    pub fn auth_mode(&self) -> &AuthMode {
        &self.mode
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token manager, present only under the OAuth password grant
    pub fn token_manager(&self) -> Option<&TokenManager> {
        match &self.authorizer {
            Authorizer::OAuth(manager) => Some(manager),
            Authorizer::Fixed(_) => None,
        }
    }

    /// Full URL for a request path, with `{organization}` substituted
    pub fn url_for(&self, path: &str) -> String {
        let path = path
            .trim_start_matches('/')
            .replace(ORGANIZATION_PLACEHOLDER, &self.organization);
        format!("{}/{}", self.base_url, path)
    }

    /// Authorization header for the next request, plus the bearer it carries
    /// when it came from the token manager
    async fn authorization(&self) -> Result<(HeaderValue, Option<String>), ApiError> {
        match &self.authorizer {
            Authorizer::Fixed(value) => Ok((value.clone(), None)),
            Authorizer::OAuth(manager) => {
                let token = manager.current_bearer().await?;
                let value = sensitive_header(&format!("Bearer {}", token))?;
                Ok((value, Some(token)))
            }
        }
    }

    /// Headers the next request would carry for authentication
    pub async fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let (value, _) = self.authorization().await?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Issue one management API call.
    ///
    /// Under the OAuth password grant a 401/403 invalidates the token and the
    /// request is retried exactly once; nothing else is retried here.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .context("Failed to serialize request body")?;
        self.execute(method, path, payload).await
    }

    /// Serialize `body`, issue the call and parse the response as `T`
    pub async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .context("Failed to serialize request body")?;
        self.execute(method, path, payload).await?.json()
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(path);
        let mut attempt = 0;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        loop {
            let (authorization, bearer) = self.authorization().await?;
            let response = self
                .send(&method, &url, payload.as_deref(), authorization)
                .await
                .map_err(|e| {
                    tracing::warn!(
                        error = %e,
                        url = %url,
                        attempt = attempt + 1,
                        "HTTP request error"
                    );
                    ApiError::NetworkError(e)
                })?;

            let status = response.status();
            tracing::debug!(status = %status, attempt = attempt + 1, "Received HTTP response");

            if status.is_success() {
                return into_api_response(response).await;
            }

            let unauthorized =
                status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;

            if let (true, Authorizer::OAuth(manager)) = (unauthorized, &self.authorizer) {
                if attempt == 0 {
                    tracing::warn!("Received {}, refreshing token and retrying...", status);
                    if let Some(ref token) = bearer {
                        manager.invalidate_token(token).await;
                    }
                    attempt += 1;
                    continue;
                }

                let error_text = response.text().await.unwrap_or_default();
                tracing::error!(
                    status = status.as_u16(),
                    url = %url,
                    "Request still unauthorized after token refresh"
                );
                return Err(ApiError::AuthError(format!(
                    "request unauthorized after token refresh: {} - {}",
                    status, error_text
                )));
            }

            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                attempt = attempt + 1,
                "HTTP request failed with error response"
            );
            return Err(ApiError::ApigeeApiError {
                status: status.as_u16(),
                body: error_text,
            });
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        payload: Option<&[u8]>,
        authorization: HeaderValue,
    ) -> reqwest::Result<Response> {
        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json");

        if let Some(payload) = payload {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(payload.to_vec());
        }

        builder.send().await
    }
}

async fn into_api_response(response: Response) -> Result<ApiResponse, ApiError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

fn sensitive_header(value: &str) -> Result<HeaderValue, ApiError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        ApiError::ConfigError("credentials contain characters not allowed in headers".to_string())
    })?;
    header.set_sensitive(true);
    Ok(header)
}
