use std::path::PathBuf;
use thiserror::Error;

pub type ComposeResult<T> = std::result::Result<T, ComposeError>;

/// Everything that can end a render attempt.
///
/// Validation errors (`EmptyScript`, `InvalidPlan`) are raised before any
/// fetch or engine work starts.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("script has no non-blank lines")]
    EmptyScript,

    #[error("invalid render plan: {0}")]
    InvalidPlan(String),

    #[error("render failed: {diagnostic}")]
    Render { diagnostic: String },

    #[error("engine reported success but no output exists at {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("render cancelled")]
    Cancelled,

    #[error("staging I/O failed: {0}")]
    Staging(#[from] std::io::Error),
}

impl ComposeError {
    pub(crate) fn fetch(location: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn render(diagnostic: impl Into<String>) -> Self {
        Self::Render {
            diagnostic: diagnostic.into(),
        }
    }
}
