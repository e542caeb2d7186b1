//! HTTP-level tests for the TikTok API client against a mock server.

use jiff::Timestamp;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tiktok_display_api::oauth::{OAuthConfig, OAuthManager, TikTokTokenResponse};
use tiktok_display_api::tiktok_api::{ListVideosRequest, TikTokClient, TimeBoundToken};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A client holding a long-lived token, pointed at `api_base` instead of TikTok.
fn test_client(api_base: String) -> TikTokClient {
    let oauth = Arc::new(
        OAuthManager::new(OAuthConfig {
            client_key: "test-key".into(),
            client_secret: "test-secret".into(),
            ..Default::default()
        })
        .unwrap(),
    );

    let token: TikTokTokenResponse = serde_json::from_value(json!({
        "access_token": "test-access-token",
        "token_type": "bearer",
        "expires_in": 86400,
        "refresh_token": "test-refresh-token",
        "open_id": "test-open-id"
    }))
    .unwrap();

    let mut client = TikTokClient::new(
        TimeBoundToken::new(token, Duration::from_secs(300)),
        oauth,
        reqwest::Client::new(),
    );
    client.set_api_base(api_base);
    client
}

#[tokio::test]
async fn user_info_sends_bearer_token_and_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/info/"))
        .and(query_param("fields", "open_id,display_name,follower_count"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {
                "open_id": "user-1",
                "display_name": "Someone",
                "follower_count": 42
            }},
            "error": {"code": "ok", "message": "", "log_id": "20230101"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let user = client
        .get_user_info("open_id,display_name,follower_count")
        .await
        .unwrap();

    assert_eq!(user.open_id, "user-1");
    assert_eq!(user.display_name, "Someone");
    assert_eq!(user.follower_count, 42);
}

#[tokio::test]
async fn provider_description_replaces_the_status_line() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/info/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "data": {
                "captcha": "",
                "desc_url": "",
                "description": "Access token is invalid or expired.",
                "error_code": 2190008
            },
            "message": "error"
        })))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let err = client.get_user_info("open_id").await.unwrap_err();

    assert!(
        err.to_string()
            .contains("Access token is invalid or expired."),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn request_level_error_envelope_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {},
            "error": {
                "code": "scope_not_authorized",
                "message": "The user did not authorize the scope required.",
                "log_id": "20230101"
            }
        })))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let err = client
        .list_videos(&ListVideosRequest {
            fields: "id".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("did not authorize"));
}

#[tokio::test]
async fn video_list_from_bound_never_requests_a_second_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .and(query_param("fields", "id,create_time"))
        .and(body_json(json!({"cursor": null, "max_count": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "videos": [
                    {"id": "v500", "create_time": 500},
                    {"id": "v480", "create_time": 480},
                    {"id": "v460", "create_time": 460}
                ],
                "has_more": true,
                "cursor": 459_000
            },
            "error": {"code": "ok", "message": "", "log_id": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let videos = client
        .list_videos(&ListVideosRequest {
            fields: "id,create_time".into(),
            from: Some(Timestamp::from_second(470).unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<_> = videos.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["v500", "v480"]);
    assert_eq!(client.api_call_count(), 1);
}

#[tokio::test]
async fn video_list_follows_the_cursor_chain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .and(body_json(json!({"cursor": null, "max_count": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "videos": [
                    {"id": "v500", "create_time": 500},
                    {"id": "v480", "create_time": 480}
                ],
                "has_more": true,
                "cursor": 460_000
            },
            "error": {"code": "ok", "message": "", "log_id": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .and(body_json(json!({"cursor": 460_000, "max_count": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "videos": [{"id": "v450", "create_time": 450}],
                "has_more": false,
                "cursor": null
            },
            "error": {"code": "ok", "message": "", "log_id": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let videos = client
        .list_videos(&ListVideosRequest {
            fields: "id".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<_> = videos.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["v500", "v480", "v450"]);
    assert_eq!(client.api_call_count(), 2);
}

#[tokio::test]
async fn more_pages_without_cursor_is_a_consistency_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "videos": [{"id": "v500", "create_time": 500}],
                "has_more": true,
                "cursor": null
            },
            "error": {"code": "ok", "message": "", "log_id": ""}
        })))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let err = client
        .list_videos(&ListVideosRequest {
            fields: "id".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cursor"), "unexpected error: {err}");
}

#[tokio::test]
async fn empty_first_page_yields_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/video/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"videos": [], "has_more": false, "cursor": null},
            "error": {"code": "ok", "message": "", "log_id": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let videos = client
        .list_videos(&ListVideosRequest {
            fields: "id".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(videos.is_empty());
}
