use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Largest file that is taller than it is wide.
fn best_portrait_file(video: &PexelsVideo) -> Option<&VideoFile> {
    video
        .video_files
        .iter()
        .filter(|file| matches!((file.width, file.height), (Some(w), Some(h)) if h > w))
        .max_by_key(|file| {
            u64::from(file.width.unwrap_or(0)) * u64::from(file.height.unwrap_or(0))
        })
}

fn portrait_links(resp: &SearchResponse, max_clips: usize) -> Vec<String> {
    resp.videos
        .iter()
        .filter_map(best_portrait_file)
        .map(|file| file.link.clone())
        .take(max_clips)
        .collect()
}

/// Stock footage lookup: up to `max_clips` portrait clip URLs for `topic`.
pub async fn pexels_find_portrait_clips(
    client: &Client,
    cfg: &Config,
    topic: &str,
    max_clips: usize,
) -> Result<Vec<String>> {
    let per_page = (max_clips.max(1) * 2).min(80).to_string();
    let resp = client
        .get("https://api.pexels.com/videos/search")
        .header("Authorization", &cfg.pexels_key)
        .query(&[
            ("query", topic),
            ("orientation", "portrait"),
            ("per_page", per_page.as_str()),
        ])
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("Pexels request failed")?;

    let status = resp.status();
    if !status.is_success() {
        logw(format!("Pexels HTTP {}", status.as_u16()));
        anyhow::bail!("Failed to fetch Pexels videos (HTTP {})", status.as_u16());
    }

    let parsed: SearchResponse = resp.json().await.context("Pexels response parse failed")?;
    let links = portrait_links(&parsed, max_clips);
    logi(format!(
        "Pexels: {} result(s), {} portrait clip(s) for \"{}\"",
        parsed.videos.len(),
        links.len(),
        topic
    ));
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "videos": [
            {"video_files": [
                {"link": "https://v/1-land.mp4", "width": 1920, "height": 1080},
                {"link": "https://v/1-small.mp4", "width": 540, "height": 960},
                {"link": "https://v/1-big.mp4", "width": 1080, "height": 1920}
            ]},
            {"video_files": [
                {"link": "https://v/2-land.mp4", "width": 1280, "height": 720},
                {"link": "https://v/2-hls.m3u8", "width": null, "height": null}
            ]},
            {"video_files": [
                {"link": "https://v/3.mp4", "width": 720, "height": 1280}
            ]}
        ]
    }"#;

    #[test]
    fn picks_largest_portrait_file_per_video() {
        let resp: SearchResponse = serde_json::from_str(BODY).unwrap();
        assert_eq!(
            portrait_links(&resp, 5),
            vec!["https://v/1-big.mp4", "https://v/3.mp4"]
        );
    }

    #[test]
    fn respects_max_clips() {
        let resp: SearchResponse = serde_json::from_str(BODY).unwrap();
        assert_eq!(portrait_links(&resp, 1), vec!["https://v/1-big.mp4"]);
    }

    #[test]
    fn empty_search_has_no_links() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(portrait_links(&resp, 3).is_empty());
    }
}
