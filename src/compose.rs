use crate::config::RenderSettings;
use crate::error::{ComposeError, ComposeResult};
use crate::ffmpeg::{self, FfmpegEngine, MediaEngine};
use crate::graph;
use crate::loader::{self, ClipSource, HttpFetcher, MediaFetcher, Staging};
use crate::output::{self, RenderedArtifact};
use crate::progress::ProgressSink;
use crate::timing;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    #[serde(rename = "clipURLs", alias = "clipUrls")]
    pub clip_urls: Vec<String>,
    #[serde(default)]
    pub audio_location: Option<String>,
    pub script: String,
    #[serde(rename = "targetDurationSeconds")]
    pub target_duration_secs: f64,
}

impl RenderJob {
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read job: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse job: {}", path.as_ref().display()))
    }
}

/// Runs render attempts: stage → plan → execute → package.
///
/// Attempts share nothing but the fetcher, engine and settings, so one
/// composer can serve concurrent jobs.
pub struct Composer<F, E> {
    fetcher: F,
    engine: E,
    settings: RenderSettings,
}

impl Composer<HttpFetcher, FfmpegEngine> {
    pub fn from_settings(settings: RenderSettings) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(&settings)?;
        let engine = FfmpegEngine::new(&settings);
        Ok(Self::new(fetcher, engine, settings))
    }
}

impl<F: MediaFetcher, E: MediaEngine> Composer<F, E> {
    pub fn new(fetcher: F, engine: E, settings: RenderSettings) -> Self {
        Self {
            fetcher,
            engine,
            settings,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Renders `job`. Returns [`ComposeError::Cancelled`] once `cancel`
    /// fires; the staging directory is gone and `progress` is closed by then.
    pub async fn render(
        &self,
        job: &RenderJob,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> ComposeResult<RenderedArtifact> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ComposeError::Cancelled),
            result = self.attempt(job, progress) => result,
        };
        progress.close();

        match &result {
            Ok(artifact) => info!(bytes = artifact.len(), "render finished"),
            Err(ComposeError::Cancelled) => warn!("render cancelled"),
            Err(err) => warn!("render failed: {err}"),
        }
        result
    }

    async fn attempt(
        &self,
        job: &RenderJob,
        progress: &ProgressSink,
    ) -> ComposeResult<RenderedArtifact> {
        let cues = timing::plan_cues(&job.script, job.target_duration_secs)?;
        graph::validate_inputs(job.clip_urls.len(), &cues)?;
        graph::validate_frame(graph::FrameSize::from_settings(&self.settings), self.settings.fps)?;
        info!(
            clips = job.clip_urls.len(),
            cues = cues.len(),
            audio = job.audio_location.is_some(),
            "render requested"
        );

        let staging = Staging::create(self.settings.staging_root.as_deref())?;
        let clips = ClipSource::from_urls(&job.clip_urls);
        let staged = loader::stage_inputs(
            &self.fetcher,
            &staging,
            &clips,
            job.audio_location.as_deref(),
            self.settings.font_url.as_deref(),
        )
        .await?;

        let plan = graph::build_plan(&staged, &cues, &self.settings)?;
        let output = ffmpeg::execute(&self.engine, &plan, staging.path(), progress).await?;
        output::package(staging, &output).await
    }
}
