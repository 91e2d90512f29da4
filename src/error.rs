use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    ProcessExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read { path: path.into(), source }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write { path: path.into(), source }
    }

    /// Subprocess failures are per-item recoverable inside batch loops.
    pub fn is_subprocess(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::ProcessExit { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
