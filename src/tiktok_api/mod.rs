//! TikTok open API v2 client library.
//!
//! This module provides a client for the parts of TikTok's open API that deal with
//! the authenticated user's own content: profile retrieval (`user/info/`) and video
//! listing (`video/list/`).
//!
//! All endpoints share the same request shape: a `fields` query parameter selecting
//! which model fields the server should return, a bearer access token, and a
//! `{data: {...}, error: {code, message, log_id}}` response envelope. The listing
//! endpoint additionally paginates through an opaque millisecond-timestamp cursor,
//! which [`TikTokClient::list_videos`] walks for you with optional date bounds.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiktok_display_api::oauth::{OAuthConfig, OAuthManager};
//! use tiktok_display_api::tiktok_api::{ListVideosRequest, TikTokClient, TimeBoundToken};
//!
//! # async fn example() -> eyre::Result<()> {
//! let oauth = Arc::new(OAuthManager::new(OAuthConfig {
//!     client_key: "my-client-key".into(),
//!     client_secret: "my-client-secret".into(),
//!     ..Default::default()
//! })?);
//!
//! // Desktop flow: browser + loopback redirect + PKCE.
//! let token = oauth.authenticate("user.info.basic,video.list").await?;
//!
//! let client = TikTokClient::new(
//!     TimeBoundToken::new(token, oauth.refresh_margin()),
//!     Arc::clone(&oauth),
//!     reqwest::Client::new(),
//! );
//!
//! let me = client.get_user_info("open_id,display_name").await?;
//! println!("authorized as {}", me.display_name);
//!
//! let videos = client
//!     .list_videos(&ListVideosRequest {
//!         fields: "id,create_time,title,view_count".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{} videos", videos.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod types;
pub mod user;
pub mod videos;

// Re-export main types for convenience
pub use client::{TikTokClient, TimeBoundToken};
pub use types::{ErrorData, ErrorResponse, ResponseError};
pub use user::UserInfo;
pub use videos::{ListVideosRequest, Video};
