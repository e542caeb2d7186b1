//! TikTok video listing: types and the cursor-paginated, date-bounded walk.

use crate::tiktok_api::client::TikTokClient;
use crate::tiktok_api::types::ResponseError;
use eyre::Context;
use jiff::Timestamp;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::ops::AsyncFnMut;
use tracing::instrument;

/// Page size requested from the listing endpoint (the maximum it allows).
const MAX_COUNT: i32 = 20;

/// A video owned by the authenticated user.
///
/// Which fields are populated depends on the `fields` selection passed to
/// [`TikTokClient::list_videos`]; unselected fields take their default values.
/// Immutable once received from the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Video {
    pub id: String,
    /// When the video was posted, in unix seconds.
    pub create_time: i64,
    pub cover_image_url: String,
    pub share_url: String,
    pub video_description: String,
    /// Length of the video in seconds.
    pub duration: i32,
    pub height: i32,
    pub width: i32,
    pub title: String,
    pub embed_html: String,
    pub embed_link: String,
    pub like_count: i32,
    pub comment_count: i32,
    pub share_count: i32,
    pub view_count: i32,
}

/// Response envelope for the `video/list/` API call.
#[derive(Debug, Deserialize)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub(crate) data: VideoListData,
    #[serde(default)]
    pub(crate) error: ResponseError,
}

/// One page of listing results.
///
/// `cursor` points at the page that follows this one and is only meaningful while
/// `has_more` is set.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VideoListData {
    #[serde(default)]
    pub(crate) videos: Vec<Video>,
    #[serde(default)]
    pub(crate) has_more: bool,
    pub(crate) cursor: Option<i64>,
}

/// Parameters for [`TikTokClient::list_videos`].
///
/// `fields` selects which [`Video`] fields the server returns. `from` and `to` bound
/// the creation time of the returned videos: `to` seeds the pagination cursor (the
/// server lists newest-first, so it acts as an upper bound), while `from` cuts the
/// walk short once an older video is seen.
#[derive(Debug, Clone, Default)]
pub struct ListVideosRequest {
    pub fields: String,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl TikTokClient {
    /// Lists the authenticated user's videos, newest first.
    ///
    /// Walks the paginated `video/list/` endpoint and collects every video whose
    /// creation time falls within the request's bounds. The server returns videos in
    /// descending creation-time order, so the first video older than `from` ends the
    /// walk: it and everything after it are discarded, everything accumulated before
    /// it is the result, and no further page is requested.
    ///
    /// With neither bound set this fetches the entire history. An empty result is a
    /// valid success.
    ///
    /// # Errors
    ///
    /// Besides transport and API failures, fails if the server indicates more pages
    /// without returning a continuation cursor.
    ///
    /// # Required Scopes
    ///
    /// * `video.list`
    #[instrument(skip(self))]
    pub async fn list_videos(&self, request: &ListVideosRequest) -> eyre::Result<Vec<Video>> {
        collect_videos(request.from, request.to, async |cursor| {
            self.list_videos_page(&request.fields, cursor).await
        })
        .await
    }

    /// Fetches a single page from the `video/list/` endpoint.
    async fn list_videos_page(
        &self,
        fields: &str,
        cursor: Option<i64>,
    ) -> eyre::Result<VideoListData> {
        #[derive(Debug, Serialize)]
        struct ListRequestBody {
            cursor: Option<i64>,
            max_count: i32,
        }

        let url = self.url("video/list/");
        let body = ListRequestBody {
            cursor,
            max_count: MAX_COUNT,
        };

        let response = self
            .make_authenticated_request(
                Method::POST,
                &url,
                Some(&[("fields", fields)]),
                Some(&body),
            )
            .await?;

        let envelope: VideoListResponse = response
            .json()
            .await
            .context("parse TikTok video list response as JSON")?;

        if !envelope.error.is_ok() {
            return Err(eyre::eyre!(
                "TikTok video list request failed: {} ({})",
                envelope.error.message,
                envelope.error.code
            ));
        }

        tracing::debug!(
            returned_items = envelope.data.videos.len(),
            has_more = envelope.data.has_more,
            "fetched video page"
        );

        Ok(envelope.data)
    }
}

/// Drives the cursor loop over `fetch_page`, applying the date bounds.
///
/// `to` (when set) becomes the initial cursor, as milliseconds since the epoch.
/// `from` is compared in whole seconds against each video's `create_time`; the first
/// strictly-older video terminates the walk with the results accumulated so far.
///
/// Generic over the page fetcher so the loop can be exercised without HTTP.
async fn collect_videos<F>(
    from: Option<Timestamp>,
    to: Option<Timestamp>,
    mut fetch_page: F,
) -> eyre::Result<Vec<Video>>
where
    F: AsyncFnMut(Option<i64>) -> eyre::Result<VideoListData>,
{
    let mut videos = Vec::new();
    let mut cursor = to.map(|to| to.as_millisecond());

    loop {
        let page = fetch_page(cursor).await?;

        if page.videos.is_empty() {
            break;
        }

        for video in page.videos {
            if let Some(from) = from {
                // newest-first ordering: one video past the bound ends the whole walk
                if from.as_second() > video.create_time {
                    return Ok(videos);
                }
            }

            videos.push(video);
        }

        if !page.has_more {
            break;
        }
        let Some(next) = page.cursor else {
            eyre::bail!("server indicated more pages but did not return a cursor");
        };
        cursor = Some(next);
    }

    Ok(videos)
}
