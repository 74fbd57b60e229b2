use ai_reel_shorts::config::RenderSettings;
use ai_reel_shorts::ffmpeg::MediaEngine;
use ai_reel_shorts::loader::MediaFetcher;
use ai_reel_shorts::{ComposeError, ComposeResult, Composer, ProgressSink, RenderJob};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FONT: &str = "mem://font.ttf";

#[derive(Clone, Default)]
struct FakeFetcher {
    files: Arc<HashMap<String, Vec<u8>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    fn with(files: &[(&str, &str)]) -> Self {
        let mut map: HashMap<String, Vec<u8>> = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        map.insert(FONT.to_string(), b"ttf".to_vec());
        Self {
            files: Arc::new(map),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch_to(&self, location: &str, dest: &Path) -> anyhow::Result<u64> {
        self.calls.lock().unwrap().push(location.to_string());
        let Some(bytes) = self.files.get(location) else {
            anyhow::bail!("HTTP 404 for {location}");
        };
        tokio::fs::write(dest, bytes).await?;
        Ok(bytes.len() as u64)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Succeed,
    Fail,
    NoOutput,
    Hang,
}

#[derive(Clone)]
struct FakeEngine {
    behavior: Behavior,
    runs: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
}

impl FakeEngine {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            runs: Arc::default(),
        }
    }

    fn runs(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe_duration(&self, path: &Path) -> anyhow::Result<f64> {
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(if name.starts_with("audio") { 8.0 } else { 5.0 })
    }

    async fn run(
        &self,
        args: &[String],
        workdir: &Path,
        on_time: &(dyn Fn(f64) + Send + Sync),
    ) -> ComposeResult<()> {
        self.runs
            .lock()
            .unwrap()
            .push((workdir.to_path_buf(), args.to_vec()));
        for input in args.windows(2).filter(|w| w[0] == "-i") {
            assert!(workdir.join(&input[1]).is_file(), "missing input {}", input[1]);
        }

        on_time(2.5);
        match self.behavior {
            Behavior::Succeed => {
                on_time(5.0);
                let output = args.last().unwrap();
                tokio::fs::write(workdir.join(output), b"fake-mp4").await?;
                Ok(())
            }
            Behavior::Fail => Err(ComposeError::Render {
                diagnostic: "Invalid data found when processing input".into(),
            }),
            Behavior::NoOutput => Ok(()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

fn settings(root: &TempDir) -> RenderSettings {
    RenderSettings {
        font_url: Some(FONT.to_string()),
        staging_root: Some(root.path().to_path_buf()),
        ..RenderSettings::default()
    }
}

fn job(clips: &[&str], audio: Option<&str>) -> RenderJob {
    RenderJob {
        clip_urls: clips.iter().map(|c| c.to_string()).collect(),
        audio_location: audio.map(str::to_string),
        script: "Hello world\nThis is a test line".to_string(),
        target_duration_secs: 30.0,
    }
}

fn staging_is_empty(root: &TempDir) -> bool {
    std::fs::read_dir(root.path()).unwrap().next().is_none()
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ai_reel_shorts::RenderProgress>) -> Vec<f64> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p.fraction);
    }
    out
}

#[tokio::test]
async fn renders_clips_with_audio() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a"), ("mem://b.mp4", "b"), ("mem://n.mp3", "n")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher.clone(), engine.clone(), settings(&root));

    let cancel = CancellationToken::new();
    let (sink, mut rx) = ProgressSink::channel(cancel.clone());
    let artifact = composer
        .render(&job(&["mem://a.mp4", "mem://b.mp4"], Some("mem://n.mp3")), &sink, &cancel)
        .await
        .unwrap();

    assert_eq!(artifact.bytes, b"fake-mp4");
    assert_eq!(artifact.mime, "video/mp4");
    assert_eq!(artifact.container, "mp4");

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    let args = &runs[0].1;
    assert!(args.iter().any(|a| a == "-shortest"));
    assert!(args.iter().any(|a| a == "2:a:0"));
    let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
    assert!(graph.contains("concat=n=2:v=1:a=0"));
    assert!(graph.contains("enable='gte(t,0.000)*lt(t,10.000)'"));
    assert!(graph.contains("enable='gte(t,10.000)*lt(t,30.000)'"));

    // clips sum to 10s, audio is 8s, so the shorter stream sets the total
    assert_eq!(drain(&mut rx), vec![2.5 / 8.0, 0.625]);
    assert!(rx.recv().await.is_none());
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn renders_video_only_without_audio() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher, engine.clone(), settings(&root));

    let artifact = composer
        .render(&job(&["mem://a.mp4"], None), &ProgressSink::silent(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!artifact.is_empty());

    let args = &engine.runs()[0].1;
    assert!(args.iter().any(|a| a == "-an"));
    assert!(!args.iter().any(|a| a == "-shortest"));
}

#[tokio::test]
async fn failed_audio_fetch_degrades_to_video_only() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher.clone(), engine.clone(), settings(&root));

    composer
        .render(
            &job(&["mem://a.mp4"], Some("mem://gone.mp3")),
            &ProgressSink::silent(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(fetcher.calls().contains(&"mem://gone.mp3".to_string()));
    let args = &engine.runs()[0].1;
    assert!(args.iter().any(|a| a == "-an"));
}

#[tokio::test]
async fn failed_clip_fetch_names_the_location() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher, engine.clone(), settings(&root));

    let err = composer
        .render(
            &job(&["mem://a.mp4", "mem://missing.mp4"], None),
            &ProgressSink::silent(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ComposeError::Fetch { location, reason } => {
            assert_eq!(location, "mem://missing.mp4");
            assert!(reason.contains("404"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.runs().is_empty());
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn blank_script_fails_before_any_fetch() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let composer = Composer::new(fetcher.clone(), FakeEngine::new(Behavior::Succeed), settings(&root));

    let mut blank = job(&["mem://a.mp4"], None);
    blank.script = "  \n\t\n".to_string();
    let err = composer
        .render(&blank, &ProgressSink::silent(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ComposeError::EmptyScript));
    assert!(fetcher.calls().is_empty());
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn no_clips_is_an_invalid_plan() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[]);
    let composer = Composer::new(fetcher.clone(), FakeEngine::new(Behavior::Succeed), settings(&root));

    let err = composer
        .render(&job(&[], None), &ProgressSink::silent(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::InvalidPlan(_)));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn odd_frame_size_fails_before_any_fetch() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a"), ("mem://n.mp3", "n")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let odd = RenderSettings {
        width: 1081,
        ..settings(&root)
    };
    let composer = Composer::new(fetcher.clone(), engine.clone(), odd);

    let err = composer
        .render(
            &job(&["mem://a.mp4"], Some("mem://n.mp3")),
            &ProgressSink::silent(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::InvalidPlan(_)));
    assert!(fetcher.calls().is_empty());
    assert!(engine.runs().is_empty());
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn engine_diagnostic_is_passed_through() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let composer = Composer::new(fetcher, FakeEngine::new(Behavior::Fail), settings(&root));

    let err = composer
        .render(&job(&["mem://a.mp4"], None), &ProgressSink::silent(), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ComposeError::Render { diagnostic } => assert!(diagnostic.contains("Invalid data")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn success_without_output_file_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let composer = Composer::new(fetcher, FakeEngine::new(Behavior::NoOutput), settings(&root));

    let err = composer
        .render(&job(&["mem://a.mp4"], None), &ProgressSink::silent(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::OutputMissing(_)));
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn cancellation_stops_render_and_releases_staging() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let composer = Arc::new(Composer::new(fetcher, FakeEngine::new(Behavior::Hang), settings(&root)));

    let cancel = CancellationToken::new();
    let (sink, mut rx) = ProgressSink::channel(cancel.clone());
    let task = {
        let composer = composer.clone();
        let cancel = cancel.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            composer
                .render(&job(&["mem://a.mp4"], None), &sink, &cancel)
                .await
        })
    };

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.fraction, 0.5);
    assert!(!staging_is_empty(&root));

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ComposeError::Cancelled)));

    sink.report(0.9);
    drop(sink);
    assert!(rx.recv().await.is_none());
    assert!(staging_is_empty(&root));
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher.clone(), engine.clone(), settings(&root));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = composer
        .render(&job(&["mem://a.mp4"], None), &ProgressSink::silent(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::Cancelled));
    assert!(fetcher.calls().is_empty());
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn concurrent_renders_use_separate_staging() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with(&[("mem://a.mp4", "a"), ("mem://b.mp4", "b")]);
    let engine = FakeEngine::new(Behavior::Succeed);
    let composer = Composer::new(fetcher, engine.clone(), settings(&root));

    let cancel = CancellationToken::new();
    let first_job = job(&["mem://a.mp4"], None);
    let second_job = job(&["mem://b.mp4", "mem://a.mp4"], None);
    let silent = ProgressSink::silent();
    let (first, second) = tokio::join!(
        composer.render(&first_job, &silent, &cancel),
        composer.render(&second_job, &silent, &cancel),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());

    let runs = engine.runs();
    assert_eq!(runs.len(), 2);
    assert_ne!(runs[0].0, runs[1].0);
    for (workdir, _) in &runs {
        assert!(workdir.starts_with(root.path()));
        assert!(!workdir.exists());
    }
}
