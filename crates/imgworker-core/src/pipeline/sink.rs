//! Result materialization: inline bytes or a file under the output directory.

use std::path::{Path, PathBuf};

use crate::config::{Config, SinkMode};
use crate::error::JobError;
use crate::types::Payload;

use super::decode::FormatTag;

/// Turns encoded bytes into the payload a reply carries.
#[derive(Debug, Clone)]
pub enum ResultSink {
    /// Hand the bytes back as-is
    Inline,
    /// Write `<base_dir>/<id>.<ext>` and hand back the path
    Filesystem { base_dir: PathBuf },
}

impl ResultSink {
    /// Build the sink configured in `config`.
    pub fn from_config(config: &Config) -> Self {
        match config.sink.mode {
            SinkMode::Bytes => Self::Inline,
            SinkMode::Path => Self::Filesystem {
                base_dir: config.sink_dir(),
            },
        }
    }

    pub fn mode(&self) -> SinkMode {
        match self {
            Self::Inline => SinkMode::Bytes,
            Self::Filesystem { .. } => SinkMode::Path,
        }
    }

    /// Output location for a job. `None` in inline mode.
    pub fn output_path(&self, output_id: &str, format: &FormatTag) -> Option<PathBuf> {
        match self {
            Self::Inline => None,
            Self::Filesystem { base_dir } => {
                let ext = format.extension()?;
                Some(base_dir.join(format!("{}.{}", output_id, ext)))
            }
        }
    }

    /// Materialize `bytes`. Filesystem writes create or truncate the target,
    /// so re-running a job overwrites its previous output.
    pub async fn store(
        &self,
        output_id: &str,
        format: &FormatTag,
        bytes: Vec<u8>,
    ) -> Result<Payload, JobError> {
        let Some(path) = self.output_path(output_id, format) else {
            return match self {
                Self::Inline => Ok(Payload::Bytes(bytes)),
                Self::Filesystem { .. } => Err(JobError::UnsupportedFormat(format.to_string())),
            };
        };

        write_file(&path, &bytes).await?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(Payload::Path(path))
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), JobError> {
    let storage_err = |source| JobError::StorageWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(storage_err)
}
