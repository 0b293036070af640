use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::refresh::GrantEndpoint;
use super::types::TokenState;
use crate::error::ApiError;

/// OAuth token manager
/// Caches the access/refresh token pair and refreshes it with at most one
/// grant request in flight at a time
#[derive(Clone)]
pub struct TokenManager {
    /// Current token pair, replaced wholesale on every refresh
    state: Arc<RwLock<Option<TokenState>>>,

    /// Held for the duration of a refresh or grant request
    refresh_lock: Arc<Mutex<()>>,

    /// OAuth token endpoint
    endpoint: Arc<GrantEndpoint>,

    /// Subtracted from the expiry to refresh before the server rejects the token
    refresh_skew: Duration,
}

impl TokenManager {
    /// Create a manager with an empty cache; the first caller performs the grant
    pub fn new(endpoint: GrantEndpoint, refresh_skew: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            endpoint: Arc::new(endpoint),
            refresh_skew: Duration::try_seconds(i64::try_from(refresh_skew).unwrap_or(i64::MAX))
                .unwrap_or(Duration::MAX),
        }
    }

    /// Create a manager with a pre-seeded token pair
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_with_token(
        endpoint: GrantEndpoint,
        refresh_skew: u64,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let mut manager = Self::new(endpoint, refresh_skew);
        manager.state = Arc::new(RwLock::new(Some(TokenState {
            access_token,
            refresh_token,
            expires_at,
        })));
        manager
    }

    /// URL of the token endpoint, for diagnostics
    pub fn endpoint_url(&self) -> &str {
        self.endpoint.url()
    }

    fn is_usable(&self, token: &TokenState) -> bool {
        // A skew too large to add to the clock means no token is ever fresh enough
        Utc::now()
            .checked_add_signed(self.refresh_skew)
            .is_some_and(|deadline| deadline < token.expires_at)
    }

    /// Cached token if it is still valid past the skew window
    async fn cached_token(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .as_ref()
            .filter(|token| self.is_usable(token))
            .map(|token| token.access_token.clone())
    }

    /// Get a valid bearer token, acquiring or refreshing it if necessary.
    ///
    /// Concurrent callers that find the cache stale queue on the refresh lock;
    /// whoever gets it first does the network call and the rest reuse its result.
    pub async fn current_bearer(&self) -> Result<String, ApiError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        // Detached so a cancelled caller does not throw away a grant in progress
        let manager = self.clone();
        tokio::spawn(async move { manager.refresh_token().await })
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("token refresh task failed: {}", e)))?
    }

    /// Refresh the access token under the refresh lock
    async fn refresh_token(&self) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have finished a refresh while we waited
        if let Some(token) = self.cached_token().await {
            tracing::debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }

        let refresh_token = {
            let state = self.state.read().await;
            state.as_ref().and_then(|token| token.refresh_token.clone())
        };

        let token = match refresh_token {
            Some(refresh_token) => match self.endpoint.refresh(&refresh_token).await {
                Ok(token) => token,
                Err(ApiError::AuthError(e)) => {
                    tracing::warn!(
                        "Refresh token rejected ({}), falling back to password grant",
                        e
                    );
                    self.endpoint.password_grant().await?
                }
                Err(e) => return Err(e),
            },
            None => self.endpoint.password_grant().await?,
        };

        let access_token = token.access_token.clone();
        *self.state.write().await = Some(token);

        Ok(access_token)
    }

    /// Force the next `current_bearer` call to refresh.
    ///
    /// The refresh token is kept so the refresh can avoid a full grant.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        if let Some(token) = state.as_mut() {
            tracing::debug!("Invalidating cached access token");
            token.expires_at = DateTime::<Utc>::MIN_UTC;
        }
    }

    /// Invalidate only if `stale` is still the cached token.
    ///
    /// Returns whether the cache was cleared. A token that another caller has
    /// already replaced is left alone.
    pub async fn invalidate_token(&self, stale: &str) -> bool {
        let mut state = self.state.write().await;
        match state.as_mut() {
            Some(token) if token.access_token == stale => {
                tracing::debug!("Invalidating rejected access token");
                token.expires_at = DateTime::<Utc>::MIN_UTC;
                true
            }
            _ => false,
        }
    }
}
