//! Fetches clips, narration audio and the overlay font into a per-render
//! staging directory.

use crate::config::RenderSettings;
use crate::error::{ComposeError, ComposeResult};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts",
    "C:\\Windows\\Fonts",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSource {
    pub id: String,
    pub url: String,
}

impl ClipSource {
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Vec<Self> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| Self {
                id: format!("clip-{i}"),
                url: url.as_ref().to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaRole {
    Video(usize),
    Audio,
    Font,
}

impl MediaRole {
    fn file_name(&self, ext: &str) -> String {
        match self {
            MediaRole::Video(i) => format!("video_{i}.{ext}"),
            MediaRole::Audio => format!("audio.{ext}"),
            MediaRole::Font => format!("font.{ext}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedMedia {
    pub role: MediaRole,
    /// Name relative to the staging directory; this is what the render plan
    /// refers to.
    pub file_name: String,
    pub path: PathBuf,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct StagedInputs {
    pub videos: Vec<StagedMedia>,
    pub audio: Option<StagedMedia>,
    pub font: Option<StagedMedia>,
}

impl StagedInputs {
    pub fn total_bytes(&self) -> u64 {
        self.videos
            .iter()
            .chain(self.audio.iter())
            .chain(self.font.iter())
            .map(|m| m.len)
            .sum()
    }
}

/// Attempt-scoped staging directory. Dropping it removes everything staged.
#[derive(Debug)]
pub struct Staging {
    id: Uuid,
    dir: TempDir,
}

impl Staging {
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let prefix = format!("reel-{id}-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir()?,
        };
        debug!(attempt = %id, dir = %dir.path().display(), "staging created");
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Removes the directory now and reports failures instead of swallowing
    /// them like `Drop` does.
    pub fn close(self) -> std::io::Result<()> {
        debug!(attempt = %self.id, "staging released");
        self.dir.close()
    }
}

/// Source of raw bytes for a location (URL, data URI or path).
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Writes the resource to `dest` and returns the number of bytes written.
    async fn fetch_to(&self, location: &str, dest: &Path) -> anyhow::Result<u64>;
}

pub struct HttpFetcher {
    pub client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &RenderSettings) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {}", status.as_u16());
        }

        let mut out = fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch_to(&self, location: &str, dest: &Path) -> anyhow::Result<u64> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return self.download(location, dest).await;
        }
        if let Some(payload) = location.strip_prefix("data:") {
            let bytes = decode_data_uri(payload)?;
            fs::write(dest, &bytes).await?;
            return Ok(bytes.len() as u64);
        }
        let src = location.strip_prefix("file://").unwrap_or(location);
        Ok(fs::copy(src, dest).await?)
    }
}

/// Decodes the part of a `data:` URI after the scheme.
pub fn decode_data_uri(payload: &str) -> anyhow::Result<Vec<u8>> {
    let Some((meta, data)) = payload.split_once(',') else {
        anyhow::bail!("data URI has no ',' separator");
    };
    if meta.ends_with(";base64") {
        let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        return Ok(BASE64.decode(compact)?);
    }
    Ok(data.as_bytes().to_vec())
}

/// Best-effort file extension for a location; `fallback` when none is obvious.
pub fn extension_hint(location: &str, fallback: &str) -> String {
    if let Some(payload) = location.strip_prefix("data:") {
        let mime = payload.split([';', ',']).next().unwrap_or_default();
        let ext = match mime {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/mp4" | "audio/aac" => "m4a",
            "audio/ogg" => "ogg",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "font/ttf" => "ttf",
            "font/otf" => "otf",
            _ => fallback,
        };
        return ext.to_string();
    }

    let path = location.split(['?', '#']).next().unwrap_or(location);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback.to_string(),
    }
}

async fn stage_one<F: MediaFetcher + ?Sized>(
    fetcher: &F,
    staging: &Staging,
    role: MediaRole,
    location: &str,
    fallback_ext: &str,
) -> anyhow::Result<StagedMedia> {
    let file_name = role.file_name(&extension_hint(location, fallback_ext));
    let path = staging.join(&file_name);
    let len = fetcher.fetch_to(location, &path).await?;
    if len == 0 {
        anyhow::bail!("empty payload");
    }
    debug!(?role, %file_name, len, "staged");
    Ok(StagedMedia {
        role,
        file_name,
        path,
        len,
    })
}

/// Stages every clip, the optional audio and the font concurrently.
///
/// Any clip failure fails the attempt. Audio and font failures degrade the
/// render instead: no audio track, or the engine's default font.
pub async fn stage_inputs<F: MediaFetcher + ?Sized>(
    fetcher: &F,
    staging: &Staging,
    clips: &[ClipSource],
    audio: Option<&str>,
    font_url: Option<&str>,
) -> ComposeResult<StagedInputs> {
    if clips.is_empty() {
        return Err(ComposeError::InvalidPlan("no video clips supplied".into()));
    }

    let video_jobs = clips.iter().enumerate().map(|(i, clip)| async move {
        stage_one(fetcher, staging, MediaRole::Video(i), &clip.url, "mp4")
            .await
            .map_err(|err| ComposeError::fetch(&clip.url, format!("{err:#}")))
    });
    let audio_job = async {
        let location = audio?;
        match stage_one(fetcher, staging, MediaRole::Audio, location, "mp3").await {
            Ok(staged) => Some(staged),
            Err(err) => {
                warn!("audio fetch failed ({err:#}); rendering video-only");
                None
            }
        }
    };
    let font_job = stage_font(fetcher, staging, font_url);

    let (videos, audio, font) = tokio::join!(
        futures::future::try_join_all(video_jobs),
        audio_job,
        font_job
    );
    let staged = StagedInputs {
        videos: videos?,
        audio,
        font,
    };

    info!(
        attempt = %staging.id(),
        videos = staged.videos.len(),
        audio = staged.audio.is_some(),
        font = staged.font.is_some(),
        bytes = staged.total_bytes(),
        "inputs staged"
    );
    Ok(staged)
}

async fn stage_font<F: MediaFetcher + ?Sized>(
    fetcher: &F,
    staging: &Staging,
    font_url: Option<&str>,
) -> Option<StagedMedia> {
    if let Some(url) = font_url {
        match stage_one(fetcher, staging, MediaRole::Font, url, "ttf").await {
            Ok(staged) => return Some(staged),
            Err(err) => warn!("font fetch failed ({err:#}); trying system fonts"),
        }
    }

    let search = tokio::task::spawn_blocking(|| find_system_font(FONT_DIRS)).await;
    let Some(system) = search.ok().flatten() else {
        warn!("no font available; overlays use the engine default font");
        return None;
    };
    let location = system.display().to_string();
    match stage_one(fetcher, staging, MediaRole::Font, &location, "ttf").await {
        Ok(staged) => Some(staged),
        Err(err) => {
            warn!("system font {location} unusable ({err:#})");
            None
        }
    }
}

/// Sans faces tried before anything else, lowercase file names.
const PREFERRED_FONTS: &[&str] = &[
    "dejavusans.ttf",
    "liberationsans-regular.ttf",
    "notosans-regular.ttf",
    "arial.ttf",
    "freesans.ttf",
    "segoeui.ttf",
];

fn font_rank(path: &Path) -> usize {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if let Some(i) = PREFERRED_FONTS.iter().position(|preferred| *preferred == name) {
        return i;
    }
    if name.contains("regular") {
        PREFERRED_FONTS.len()
    } else {
        PREFERRED_FONTS.len() + 1
    }
}

/// Best `.ttf`/`.otf` below `dirs`: a known sans face, then any Regular
/// face, then the first font in sorted walk order. Blocking.
pub fn find_system_font<P: AsRef<Path>>(dirs: &[P]) -> Option<PathBuf> {
    dirs.iter()
        .filter(|dir| dir.as_ref().is_dir())
        .flat_map(|dir| {
            WalkDir::new(dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"))
                .unwrap_or(false)
        })
        .enumerate()
        .min_by_key(|(order, path)| (font_rank(path), *order))
        .map(|(_, path)| path)
}
