//! File-backed report store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::evaluation::BenchmarkReport;

/// Storage for finished benchmark reports, keyed by report id.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persists a report, replacing any previous report with the same id.
    async fn save(&self, report: &BenchmarkReport) -> Result<(), StorageError>;

    /// Loads a report by id.
    async fn get(&self, id: &str) -> Result<BenchmarkReport, StorageError>;

    /// Lists all stored reports, oldest first.
    async fn list(&self) -> Result<Vec<BenchmarkReport>, StorageError>;

    /// Removes a report by id.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Stores each report as `<id>.json` under a base directory.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    base_path: PathBuf,
}

impl FileReportStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the file a report id maps to.
    ///
    /// Ids end up in file names, so anything that could escape the base
    /// directory is rejected.
    pub fn report_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.base_path.join(format!("{}.json", id)))
    }

    async fn ensure_directory(&self) -> Result<(), StorageError> {
        if !fs::try_exists(&self.base_path).await? {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, report: &BenchmarkReport) -> Result<(), StorageError> {
        let path = self.report_path(&report.id)?;
        self.ensure_directory().await?;

        let json = serde_json::to_string_pretty(report)?;
        let mut file = fs::File::create(&path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        tracing::debug!(report = %report.id, path = %path.display(), "Saved report");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<BenchmarkReport, StorageError> {
        let path = self.report_path(id)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    async fn list(&self) -> Result<Vec<BenchmarkReport>, StorageError> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = fs::read_to_string(&path).await?;
            match serde_json::from_str::<BenchmarkReport>(&contents) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable report");
                }
            }
        }

        reports.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(reports)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.report_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
