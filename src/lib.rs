pub mod api;
pub mod compose;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod generator;
pub mod graph;
pub mod init;
pub mod loader;
pub mod output;
pub mod progress;
pub mod timing;

pub use compose::{Composer, RenderJob};
pub use error::{ComposeError, ComposeResult};
pub use output::RenderedArtifact;
pub use progress::{ProgressSink, RenderProgress};
pub use timing::ScriptCue;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
