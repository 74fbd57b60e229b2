use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use reqwest::Client;

/// Synthesizes `text` as MP3.
///
/// `Ok(None)` means the service answered but produced no audio; the reel is
/// then rendered without narration.
pub async fn elevenlabs_tts_to_mp3(
    client: &Client,
    cfg: &Config,
    text: &str,
) -> Result<Option<Vec<u8>>> {
    let url = format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
        cfg.eleven_voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": cfg.eleven_model_id,
        "voice_settings": {
            "stability": 0.5,
            "similarity_boost": 0.75,
        },
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", &cfg.elevenlabs_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("ElevenLabs request failed")?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let detail = resp.text().await.unwrap_or_default();
        logw(format!(
            "ElevenLabs TTS failed HTTP {} {}",
            status,
            detail.chars().take(300).collect::<String>()
        ));
        return Ok(None);
    }

    let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
    if bytes.is_empty() {
        logw("ElevenLabs returned an empty audio body");
        return Ok(None);
    }

    Ok(Some(bytes.to_vec()))
}
