//! Core TikTok API client functionality and token lifecycle management.

use crate::oauth::{OAuthManager, TikTokTokenResponse};
use crate::tiktok_api::types::ErrorResponse;
use eyre::Context;
use oauth2::TokenResponse;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::instrument;

/// Base URL of the TikTok open API.
pub const API_URL: &str = "https://open.tiktokapis.com/v2";

/// An OAuth token together with the point in time at which it should be refreshed.
///
/// The expiry is computed from the token's `expires_in` field minus the manager's
/// refresh margin, so a token is replaced slightly before the server would start
/// rejecting it.
#[derive(Debug, Clone)]
pub struct TimeBoundToken {
    /// The current OAuth2 token.
    token: TikTokTokenResponse,
    /// When the current access token expires (with the refresh margin applied).
    expires_at: SystemTime,
}

impl TimeBoundToken {
    /// Wraps a token that is already considered expired, forcing immediate refresh.
    ///
    /// Useful when loading tokens from storage where you want them validated before
    /// use.
    pub fn expired(token: TikTokTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Wraps a freshly issued token, computing its expiry from `expires_in` minus
    /// `margin`.
    pub fn new(token: TikTokTokenResponse, margin: Duration) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token, margin),
            token,
        }
    }

    /// The wrapped token, e.g. for persisting it.
    pub fn raw_token(&self) -> &TikTokTokenResponse {
        &self.token
    }

    /// Refreshes this token via the given manager, preserving the refresh token when
    /// the server omits it from the refreshed response.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                let old_token = std::mem::replace(&mut self.token, new_token);

                // If the new token doesn't have a refresh token, preserve the original one
                if self.token.refresh_token().is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    self.token
                        .set_refresh_token(old_token.refresh_token().cloned());
                }

                self.expires_at =
                    Self::calculate_token_expiry(&self.token, oauth_manager.refresh_margin());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// When a token should be considered expired based on its `expires_in` field.
    ///
    /// If no `expires_in` is provided, assumes TikTok's 24-hour access token lifetime.
    fn calculate_token_expiry(token: &TikTokTokenResponse, margin: Duration) -> SystemTime {
        let now = SystemTime::now();
        let lifetime = token
            .expires_in()
            .unwrap_or(Duration::from_secs(24 * 60 * 60));
        now + lifetime.saturating_sub(margin)
    }
}

/// Client for the TikTok open API.
///
/// All calls require a valid OAuth2 access token with the appropriate scopes. The
/// client refreshes expired access tokens before API calls using the stored refresh
/// token and the shared [`OAuthManager`]; clones share the token, so a refresh
/// performed through one clone is visible to all.
#[derive(Debug, Clone)]
pub struct TikTokClient {
    /// The current OAuth2 token, protected by a mutex for thread-safe refresh.
    token: Arc<Mutex<TimeBoundToken>>,
    /// OAuth manager for refreshing tokens (shared across clients).
    oauth_manager: Arc<OAuthManager>,
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// Base URL for API requests; [`API_URL`] outside of tests.
    api_base: String,
    /// Number of API requests issued through this client (and its clones).
    api_calls: Arc<AtomicU64>,
}

impl TikTokClient {
    /// Creates a new TikTok API client from a token, OAuth manager, and HTTP client.
    pub fn new(
        token: TimeBoundToken,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            oauth_manager,
            client,
            api_base: API_URL.to_string(),
            api_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Overrides the API base URL.
    ///
    /// Primarily for tests that point the client at a local mock server.
    pub fn set_api_base(&mut self, base: impl Into<String>) {
        self.api_base = base.into();
    }

    /// Returns a clone of the underlying OAuth2 token, e.g. for persistence.
    ///
    /// The token is behind a mutex, so this method is async.
    pub async fn token(&self) -> TikTokTokenResponse {
        self.token.lock().await.token.clone()
    }

    /// Number of API requests issued through this client since creation or the last
    /// [`Self::api_reset`].
    pub fn api_call_count(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Resets the API request counter to zero.
    pub fn api_reset(&self) {
        self.api_calls.store(0, Ordering::Relaxed);
    }

    /// Validates the token by making a minimal call to the user-info endpoint.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token is valid and can be used for API calls
    /// * `Ok(false)` - The probe call failed; the token is likely invalid or lacks scopes
    #[instrument(skip(self), ret)]
    pub async fn validate_token(&self) -> eyre::Result<bool> {
        match self.get_user_info("open_id").await {
            Ok(_) => {
                tracing::debug!("TikTok API token validation successful");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("TikTok API token validation failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Absolute URL for an API path like `user/info/`.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    ///
    /// Called before each API request; checks whether the token expires within the
    /// refresh margin and refreshes it if so.
    #[instrument(skip(self))]
    pub(crate) async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;
        let now = SystemTime::now();

        if now >= token.expires_at {
            tracing::debug!("access token expired, attempting refresh");

            if token.refresh(&self.oauth_manager).await? {
                tracing::debug!("access token successfully refreshed");
            } else {
                tracing::error!("access token refresh failed, client is unusable");
                return Err(eyre::eyre!("Unable to refresh expired access token"));
            }
        }

        Ok(token.token.access_token().secret().to_string())
    }

    /// Makes an authenticated HTTP request to the TikTok API with common error
    /// handling.
    ///
    /// Consolidates the shared logic across all API requests:
    /// - Token freshness validation and refresh
    /// - Authorization header setup
    /// - Query parameters and optional JSON body
    /// - Status code validation, substituting the provider's error description for
    ///   the generic status line when the error body carries one
    ///
    /// # Returns
    ///
    /// The raw [`reqwest::Response`] for method-specific JSON parsing.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<reqwest::Response> {
        let access_token = self.fresh_access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Authorization", format!("Bearer {}", access_token));

        if let Some(params) = query_params {
            request = request.query(params);
        }

        if let Some(body) = json_body {
            request = request
                .header("Content-Type", "application/json")
                .json(body);
        }

        self.api_calls.fetch_add(1, Ordering::Relaxed);
        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to TikTok API: {}", method, url))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let description = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .map(|e| e.data.description)
                .filter(|d| !d.is_empty());
            return Err(match description {
                Some(description) => {
                    eyre::eyre!("TikTok API {} request failed: {}", method, description)
                }
                None => eyre::eyre!(
                    "TikTok API {} request failed with status {}: {}",
                    method,
                    status_code,
                    body
                ),
            });
        }

        Ok(response)
    }
}
