use crate::api::{elevenlabs, openai, pexels};
use crate::compose::{Composer, RenderJob};
use crate::config::Config;
use crate::progress::ProgressSink;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MAX_CLIPS: usize = 3;
const MAX_SLUG_CHARS: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelRequest {
    pub topic: String,
    pub style: String,
    pub duration_secs: f64,
}

/// Lowercase ASCII slug for output file names.
pub fn slugify(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
        if out.len() >= MAX_SLUG_CHARS {
            break;
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() { "reel".to_string() } else { out }
}

fn output_path(out_dir: &Path, topic: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    out_dir.join(format!("{}_{}.mp4", slugify(topic), stamp))
}

/// Logs progress at whole-percent steps until the sink closes.
pub fn spawn_progress_logger(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<crate::RenderProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_pct = -1i64;
        while let Some(progress) = rx.recv().await {
            let pct = (progress.fraction * 100.0).floor() as i64;
            if pct != last_pct && (pct % 10 == 0 || pct == 99) {
                logi(format!("Render progress: {}%", pct));
                last_pct = pct;
            }
        }
    })
}

/// Topic → script → stock clips → narration → rendered reel on disk.
pub async fn generate_reel(
    cfg: &Config,
    request: &ReelRequest,
    out_dir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    cfg.require_generation_keys()?;
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    logi(format!(
        "Generating {}s {} reel about \"{}\"",
        request.duration_secs, request.style, request.topic
    ));

    logi("Generating script with AI...");
    let script = openai::openai_write_script(
        &client,
        cfg,
        &request.topic,
        &request.style,
        request.duration_secs,
    )
    .await?;
    logok(format!("Script:\n{}", script));

    logi("Fetching stock footage from Pexels...");
    let clip_urls =
        pexels::pexels_find_portrait_clips(&client, cfg, &request.topic, MAX_CLIPS).await?;
    if clip_urls.is_empty() {
        anyhow::bail!("No portrait stock footage found for \"{}\"", request.topic);
    }
    logok(format!("Using {} clip(s)", clip_urls.len()));

    let narration = if cfg.elevenlabs_key.is_empty() {
        logw("No ElevenLabs key configured, skipping narration");
        None
    } else {
        logi("Generating voiceover audio...");
        match elevenlabs::elevenlabs_tts_to_mp3(&client, cfg, &script).await {
            Ok(Some(bytes)) => {
                let mut file = tempfile::Builder::new()
                    .prefix("narration-")
                    .suffix(".mp3")
                    .tempfile()
                    .context("Failed to create narration temp file")?;
                std::io::Write::write_all(&mut file, &bytes)
                    .context("Failed to write narration")?;
                logok(format!("Narration ready ({} bytes)", bytes.len()));
                Some(file)
            }
            Ok(None) => None,
            Err(err) => {
                logw(format!("Audio generation failed: {:#}", err));
                None
            }
        }
    };

    let job = RenderJob {
        clip_urls,
        audio_location: narration
            .as_ref()
            .map(|file| file.path().display().to_string()),
        script,
        target_duration_secs: request.duration_secs,
    };

    let composer = Composer::from_settings(cfg.render.clone())?;
    let (sink, rx) = ProgressSink::channel(cancel.clone());
    let logger = spawn_progress_logger(rx);
    let result = composer.render(&job, &sink, cancel).await;
    drop(sink);
    let _ = logger.await;
    let artifact = result?;

    let out = output_path(out_dir, &request.topic);
    artifact.write_to(&out).await?;
    logok(format!("Wrote output: {} ({} bytes)", out.display(), artifact.len()));
    Ok(out)
}
