//! Report artifacts
//!
//! One Markdown file per run under the reports directory, named after the
//! run id. Artifacts are write-once.

use crate::error::{ConsultantError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(run_id: &str) -> String {
        format!("{}.md", run_id)
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(Self::file_name(run_id))
    }

    pub fn exists(&self, run_id: &str) -> bool {
        self.path_for(run_id).exists()
    }

    /// Create the artifact for `run_id`. An existing file is a conflict.
    pub fn write(&self, run_id: &str, content: &str) -> Result<PathBuf> {
        let path = self.path_for(run_id);
        let write_err = |source: std::io::Error| ConsultantError::ReportWrite {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ConsultantError::ReportConflict {
                    run_id: run_id.to_string(),
                    path: path.clone(),
                });
            }
            Err(e) => return Err(write_err(e)),
        };

        if let Err(e) = file.write_all(content.as_bytes()).and_then(|_| file.sync_all()) {
            // Don't leave a truncated artifact behind
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(write_err(e));
        }

        tracing::info!(path = %path.display(), "Report saved");
        Ok(path)
    }

    /// Remove an artifact written earlier in the same run, used when the
    /// run cannot be recorded in history.
    pub(crate) fn discard(&self, run_id: &str) -> Result<()> {
        let path = self.path_for(run_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::warn!(path = %path.display(), "Report discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
