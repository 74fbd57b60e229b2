use ai_reel_shorts::compose::{Composer, RenderJob};
use ai_reel_shorts::config::Config;
use ai_reel_shorts::generator::{self, ReelRequest};
use ai_reel_shorts::init;
use ai_reel_shorts::progress::ProgressSink;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ai-reel-shorts", version, about = "Compose vertical reels from clips, narration and a script")]
struct Cli {
    /// JSON config with API keys and render settings.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a reel from explicit clips, audio and script.
    Render(RenderArgs),
    /// Write a script, find clips and narration for a topic, then render.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Job file with clipURLs, audioLocation, script and targetDurationSeconds.
    #[arg(long, conflicts_with_all = ["clips", "audio", "script", "script_file", "duration"])]
    job: Option<PathBuf>,

    /// Clip location (URL, data URI or path), in playback order.
    #[arg(long = "clip", value_name = "LOCATION")]
    clips: Vec<String>,

    /// Narration audio location.
    #[arg(long)]
    audio: Option<String>,

    #[arg(long, conflicts_with = "script_file")]
    script: Option<String>,

    #[arg(long)]
    script_file: Option<PathBuf>,

    /// Target duration in seconds used for cue timing.
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long, default_value = "output/reel.mp4")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    topic: String,

    #[arg(long, default_value = "engaging")]
    style: String,

    #[arg(long, default_value_t = 30.0)]
    duration: f64,

    #[arg(long, default_value = "output")]
    out_dir: PathBuf,
}

async fn build_job(args: &RenderArgs) -> Result<RenderJob> {
    if let Some(path) = &args.job {
        return RenderJob::load(path).await;
    }

    let script = match (&args.script, &args.script_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script: {}", path.display()))?,
        (None, None) => anyhow::bail!("one of --script or --script-file is required"),
    };
    let duration = args
        .duration
        .context("--duration is required without --job")?;

    Ok(RenderJob {
        clip_urls: args.clips.clone(),
        audio_location: args.audio.clone(),
        script,
        target_duration_secs: duration,
    })
}

async fn run_render(cfg: Config, args: RenderArgs, cancel: CancellationToken) -> Result<()> {
    let job = build_job(&args).await?;
    let composer = Composer::from_settings(cfg.render)?;

    let (sink, rx) = ProgressSink::channel(cancel.clone());
    let logger = generator::spawn_progress_logger(rx);
    let result = composer.render(&job, &sink, &cancel).await;
    drop(sink);
    let _ = logger.await;

    let artifact = result?;
    artifact.write_to(&args.out).await?;
    tracing::info!(
        "Wrote {} ({} bytes, {})",
        args.out.display(),
        artifact.len(),
        artifact.mime
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config).await?;

    if !init::check_ffmpeg(&cfg.render.ffmpeg_path).await {
        tracing::warn!("FFmpeg not found at {}. Please install FFmpeg.", cfg.render.ffmpeg_path.display());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling render");
            on_ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Render(args) => run_render(cfg, args, cancel).await,
        Command::Generate(args) => {
            init::ensure_directories(&[&args.out_dir]).await?;
            let request = ReelRequest {
                topic: args.topic,
                style: args.style,
                duration_secs: args.duration,
            };
            let out = generator::generate_reel(&cfg, &request, &args.out_dir, &cancel).await?;
            println!("{}", out.display());
            Ok(())
        }
    }
}
