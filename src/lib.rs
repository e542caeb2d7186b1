//! Client for TikTok's open API v2: OAuth 2.0 with a desktop PKCE variant, user
//! profile retrieval, and date-bounded video listing.
//!
//! See [`oauth`] for the authorization flows and [`tiktok_api`] for the API client.

use eyre::Context;
use std::sync::Arc;

pub mod oauth;
pub mod tiktok_api;

pub use oauth::{OAuthConfig, OAuthManager, TikTokTokenResponse};
pub use tiktok_api::{ListVideosRequest, TikTokClient, TimeBoundToken, UserInfo, Video};

/// Complete client setup for both library consumers and the CLI.
///
/// Handles token acquisition, refresh, and validation against a caller-persisted
/// token: `stored_token` is the JSON the caller saved from a previous run (empty
/// string if there is none). Returns the ready-to-use client together with the
/// token to persist for the next run.
///
/// A stored token is proactively refreshed so it starts with maximum lifetime; if
/// the refresh grant is rejected, the user is sent back through the interactive
/// desktop flow.
pub async fn setup_client(
    config: OAuthConfig,
    stored_token: &str,
    scope: &str,
) -> eyre::Result<(TikTokClient, TikTokTokenResponse)> {
    let oauth = Arc::new(OAuthManager::new(config)?);

    let token = if stored_token.trim().is_empty() {
        // No stored token: the user has to go through the browser flow.
        let token = oauth
            .authenticate(scope)
            .await
            .context("authorize user to TikTok")?;
        TimeBoundToken::new(token, oauth.refresh_margin())
    } else {
        let token: TikTokTokenResponse =
            serde_json::from_str(stored_token).context("parse stored TikTok token")?;

        // Always refresh stored tokens proactively for maximum lifetime.
        tracing::info!("proactively refreshing stored token");
        let mut token = TimeBoundToken::expired(token);

        if token.refresh(&oauth).await.context("refresh token")? {
            tracing::debug!("successfully refreshed stored token");
            token
        } else {
            // Refresh grant rejected: fall back to full re-authentication.
            tracing::warn!("token refresh failed, getting new token via full OAuth");
            let token = oauth
                .authenticate(scope)
                .await
                .context("authorize user to TikTok")?;
            TimeBoundToken::new(token, oauth.refresh_margin())
        }
    };

    let client = TikTokClient::new(token, oauth, reqwest::Client::new());
    let refreshed = client.token().await;

    Ok((client, refreshed))
}
