use eyre::Context;
use jiff::{Timestamp, ToSpan};
use std::io::IsTerminal;
use tiktok_display_api::{ListVideosRequest, OAuthConfig, setup_client};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const TOKEN_FILE: &str = "token.json";
const SCOPE: &str = "user.info.basic,user.info.profile,user.info.stats,video.list";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let config = OAuthConfig {
        client_key: std::env::var("TIKTOK_CLIENT_KEY").context("read TIKTOK_CLIENT_KEY")?,
        client_secret: std::env::var("TIKTOK_CLIENT_SECRET")
            .context("read TIKTOK_CLIENT_SECRET")?,
        ..Default::default()
    };

    let mut stored = String::new();
    if tokio::fs::try_exists(TOKEN_FILE).await.unwrap_or(false) {
        stored = tokio::fs::read_to_string(TOKEN_FILE)
            .await
            .context("read stored token")?;
    }

    let (client, refreshed_token) = setup_client(config, &stored, SCOPE).await?;

    let me = client
        .get_user_info("open_id,display_name,follower_count,likes_count,is_verified")
        .await
        .context("fetch user info")?;
    eprintln!("==> {} ({})", me.display_name, me.open_id);
    eprintln!("    followers: {}", me.follower_count);
    eprintln!("    likes    : {}", me.likes_count);

    // Videos posted in the last 30 days, newest first.
    let from = Timestamp::now()
        .checked_sub(720.hours())
        .context("compute listing window")?;
    let videos = client
        .list_videos(&ListVideosRequest {
            fields: "id,create_time,title,duration,view_count,like_count".into(),
            from: Some(from),
            ..Default::default()
        })
        .await
        .context("list videos")?;

    eprintln!("==> {} videos since {from}", videos.len());
    for video in &videos {
        let posted = Timestamp::from_second(video.create_time).context("video timestamp")?;
        eprintln!(
            "{posted}  {} ({}s, {} views, {} likes) {}",
            video.id, video.duration, video.view_count, video.like_count, video.title
        );
    }
    tracing::debug!(api_calls = client.api_call_count(), "done");

    // Save the refreshed token for the next run.
    let json = serde_json::to_string(&refreshed_token).context("serialize token")?;
    tokio::fs::write(TOKEN_FILE, &json)
        .await
        .context("save refreshed token")?;

    Ok(())
}
