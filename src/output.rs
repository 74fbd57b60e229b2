use crate::error::{ComposeError, ComposeResult};
use crate::graph::{OUTPUT_CONTAINER, OUTPUT_MIME};
use crate::loader::Staging;
use anyhow::Context;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// Final encoded video handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub container: &'static str,
}

impl RenderedArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(path, &self.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Reads the engine output back and releases the attempt's staging.
///
/// Staging is released whether or not the output exists.
pub async fn package(staging: Staging, output: &Path) -> ComposeResult<RenderedArtifact> {
    let read = fs::read(output).await;
    let attempt = staging.id();
    match tokio::task::spawn_blocking(move || staging.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%attempt, "failed to release staging: {err}"),
        Err(err) => warn!(%attempt, "staging release task failed: {err}"),
    }

    let bytes = match read {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return Err(ComposeError::OutputMissing(output.to_path_buf())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ComposeError::OutputMissing(output.to_path_buf()));
        }
        Err(err) => return Err(ComposeError::Staging(err)),
    };

    info!(%attempt, bytes = bytes.len(), "render packaged");
    Ok(RenderedArtifact {
        bytes,
        mime: OUTPUT_MIME,
        container: OUTPUT_CONTAINER,
    })
}
