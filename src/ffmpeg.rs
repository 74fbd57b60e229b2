//! Render execution against ffmpeg.

use crate::config::RenderSettings;
use crate::error::{ComposeError, ComposeResult};
use crate::graph::{DurationPolicy, RenderPlan};
use crate::loader::MediaRole;
use crate::progress::ProgressSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The media engine a render plan runs on.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Runs the engine with `args` inside `workdir`. `on_time` receives the
    /// amount of output encoded so far, in seconds.
    async fn run(
        &self,
        args: &[String],
        workdir: &Path,
        on_time: &(dyn Fn(f64) + Send + Sync),
    ) -> ComposeResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegEngine {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            ffprobe_path: settings.ffprobe_path.clone(),
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .context("ffprobe duration failed")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("ffprobe failed"));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let duration = text.parse::<f64>().unwrap_or(-1.0);
        if duration <= 0.0 || !duration.is_finite() {
            return Err(anyhow::anyhow!("Invalid duration: {text}"));
        }
        Ok(duration)
    }

    async fn run(
        &self,
        args: &[String],
        workdir: &Path,
        on_time: &(dyn Fn(f64) + Send + Sync),
    ) -> ComposeResult<()> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    ComposeError::render(format!(
                        "ffmpeg not found at {}",
                        self.ffmpeg_path.display()
                    ))
                } else {
                    ComposeError::render(format!("failed to start ffmpeg: {err}"))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ComposeError::render("ffmpeg stdout unavailable"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ComposeError::render("ffmpeg stderr unavailable"))?;

        // stderr is drained concurrently so a chatty ffmpeg never blocks on it
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        if let Err(err) = pump_progress(BufReader::new(stdout), on_time).await {
            let _ = child.kill().await;
            let diagnostic = stderr_task.await.unwrap_or_default();
            return Err(ComposeError::render(format!(
                "reading ffmpeg progress failed: {err}; {}",
                diagnostic.trim()
            )));
        }

        let status = child
            .wait()
            .await
            .map_err(|err| ComposeError::render(format!("ffmpeg wait failed: {err}")))?;
        let diagnostic = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let diagnostic = diagnostic.trim();
            return Err(ComposeError::render(if diagnostic.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                diagnostic.to_string()
            }));
        }
        if !diagnostic.trim().is_empty() {
            debug!("ffmpeg stderr: {}", diagnostic.trim());
        }
        Ok(())
    }
}

/// Feeds every `-progress` sample from `reader` to `on_time` until EOF.
/// Lines that are not valid UTF-8 are decoded lossily rather than ending the
/// read, so ffmpeg never stalls on a full stdout pipe.
async fn pump_progress<R: AsyncBufRead + Unpin>(
    mut reader: R,
    on_time: &(dyn Fn(f64) + Send + Sync),
) -> std::io::Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        if let Some(seconds) = parse_progress_time(&String::from_utf8_lossy(&line)) {
            on_time(seconds);
        }
    }
}

/// Extracts encoded seconds from one `-progress` line.
///
/// `out_time_ms` is in microseconds despite its name, same as `out_time_us`.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            let micros = value.trim().parse::<i64>().ok()?;
            (micros >= 0).then(|| micros as f64 / 1_000_000.0)
        }
        "out_time" => parse_time_str(value.trim()),
        _ => None,
    }
}

/// Parses `HH:MM:SS.micro` into seconds.
fn parse_time_str(s: &str) -> Option<f64> {
    let mut parts = s.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let mins: f64 = parts.next()?.parse().ok()?;
    let secs: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + mins * 60.0 + secs)
}

/// Expected output length: summed clip durations, clamped by the audio when
/// the plan keeps the shorter stream. `None` if anything fails to probe.
pub async fn expected_duration<E: MediaEngine + ?Sized>(
    engine: &E,
    plan: &RenderPlan,
    workdir: &Path,
) -> Option<f64> {
    let mut video = 0.0;
    let mut audio = None;
    for input in &plan.inputs {
        let path = workdir.join(&input.file_name);
        let duration = match engine.probe_duration(&path).await {
            Ok(duration) => duration,
            Err(err) => {
                warn!("probe failed for {} ({err:#}); progress disabled", input.file_name);
                return None;
            }
        };
        match input.role {
            MediaRole::Video(_) => video += duration,
            MediaRole::Audio => audio = Some(duration),
            MediaRole::Font => {}
        }
    }

    let total = match (plan.duration_policy, audio) {
        (DurationPolicy::Shortest, Some(audio)) => video.min(audio),
        _ => video,
    };
    (total > 0.0).then_some(total)
}

/// Runs `plan` in `workdir` and returns the path of the produced file.
///
/// Does not retry; a failed render is reported once with the engine's own
/// diagnostic.
pub async fn execute<E: MediaEngine + ?Sized>(
    engine: &E,
    plan: &RenderPlan,
    workdir: &Path,
    progress: &ProgressSink,
) -> ComposeResult<PathBuf> {
    let total = expected_duration(engine, plan, workdir).await;
    if let Some(total) = total {
        info!("expected output duration {total:.2}s");
    }

    let args = plan.ffmpeg_args();
    debug!(?args, "starting render");

    let report = |seconds: f64| {
        if let Some(total) = total {
            progress.report(seconds / total);
        }
    };
    engine.run(&args, workdir, &report).await?;

    Ok(workdir.join(&plan.output_file))
}
