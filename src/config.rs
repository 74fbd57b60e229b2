use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_FONT_URL: &str =
    "https://raw.githubusercontent.com/ffmpegwasm/testdata/master/arial.ttf";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "open_api_key")]
    #[serde(default)]
    pub openai_key: String,
    #[serde(rename = "elevenlabs_api_key")]
    #[serde(default)]
    pub elevenlabs_key: String,
    #[serde(rename = "pexels_api_key")]
    #[serde(default)]
    pub pexels_key: String,
    #[serde(rename = "eleven_voice_id")]
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(rename = "eleven_model_id")]
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default)]
    pub render: RenderSettings,
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            elevenlabs_key: String::new(),
            pexels_key: String::new(),
            eleven_voice_id: default_voice_id(),
            eleven_model_id: default_model_id(),
            openai_model: default_openai_model(),
            render: RenderSettings::default(),
        }
    }
}

/// Engine-side knobs: output geometry, encoder settings, tool paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    pub font_url: Option<String>,
    pub font_size: u32,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Parent directory for per-render staging; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "veryfast".to_string(),
            crf: 22,
            audio_bitrate: "192k".to_string(),
            font_url: Some(DEFAULT_FONT_URL.to_string()),
            font_size: 48,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            staging_root: None,
            fetch_timeout_secs: 300,
            connect_timeout_secs: 30,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_err() {
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// The end-to-end generator needs a script writer and a clip supplier.
    /// Narration stays optional.
    pub fn require_generation_keys(&self) -> Result<()> {
        if self.openai_key.is_empty() {
            anyhow::bail!("config.json: open_api_key missing");
        }
        if self.pexels_key.is_empty() {
            anyhow::bail!("config.json: pexels_api_key missing");
        }
        Ok(())
    }
}
