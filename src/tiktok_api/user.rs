//! TikTok user-info API types and functionality.

use crate::tiktok_api::client::TikTokClient;
use crate::tiktok_api::types::ResponseError;
use eyre::Context;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A TikTok user profile.
///
/// Which fields are populated depends on the `fields` selection passed to
/// [`TikTokClient::get_user_info`]; unselected fields take their default values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    /// The user's id within the scope of the requesting application.
    pub open_id: String,
    /// The user's id across all applications of the same developer.
    pub union_id: String,
    pub avatar_url: String,
    pub avatar_url_100: String,
    pub avatar_large_url: String,
    pub display_name: String,
    pub bio_description: String,
    /// Deep link into the TikTok app for this user's profile.
    pub profile_deep_link: String,
    pub is_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub likes_count: i64,
}

/// Response envelope for the `user/info/` API call.
#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoResponse {
    #[serde(default)]
    pub(crate) data: UserInfoData,
    #[serde(default)]
    pub(crate) error: ResponseError,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserInfoData {
    #[serde(default)]
    pub(crate) user: UserInfo,
}

impl TikTokClient {
    /// Fetches the authenticated user's profile.
    ///
    /// `fields` is the comma-separated list of [`UserInfo`] fields the server should
    /// return, e.g. `"open_id,display_name,follower_count"`.
    ///
    /// # Required Scopes
    ///
    /// * `user.info.basic` (additional fields need `user.info.profile` / `user.info.stats`)
    #[instrument(skip(self))]
    pub async fn get_user_info(&self, fields: &str) -> eyre::Result<UserInfo> {
        let url = self.url("user/info/");

        let response = self
            .make_authenticated_request(Method::GET, &url, Some(&[("fields", fields)]), None::<&()>)
            .await?;

        let envelope: UserInfoResponse = response
            .json()
            .await
            .context("parse TikTok user info response as JSON")?;

        if !envelope.error.is_ok() {
            return Err(eyre::eyre!(
                "TikTok user info request failed: {} ({})",
                envelope.error.message,
                envelope.error.code
            ));
        }

        tracing::debug!(open_id = envelope.data.user.open_id, "fetched user info");

        Ok(envelope.data.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unselected_fields_fall_back_to_defaults() {
        let envelope: UserInfoResponse = serde_json::from_str(
            r#"{
                "data": {"user": {"open_id": "abc123", "display_name": "someone"}},
                "error": {"code": "ok", "message": "", "log_id": "202301"}
            }"#,
        )
        .unwrap();

        assert!(envelope.error.is_ok());
        assert_eq!(envelope.data.user.open_id, "abc123");
        assert_eq!(envelope.data.user.display_name, "someone");
        assert_eq!(envelope.data.user.follower_count, 0);
        assert!(!envelope.data.user.is_verified);
    }
}
