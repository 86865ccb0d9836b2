use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_std::channel::Sender;
use core_types::cancel::CancellationToken;
use core_types::events::ToolEvent;
use tool_runner::ops::{DefaultToolRunnerOps, ToolRunnerOps};
use utils::path_util;

use crate::error::ExtractError;
use crate::{decompress_container, extract_archive};

/// Trait for container extraction, mockable for pipeline tests.
#[async_trait::async_trait]
pub trait ExtractOps: Send + Sync {
    async fn decompress(
        &self,
        container: &Path,
        dest_dir: &Path,
        decompressor: Option<&Path>,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError>;

    async fn extract_archive(
        &self,
        archive: &Path,
        dest_dir: &Path,
        seven_zip: Option<&Path>,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError>;
}

/// Default implementation backed by the real tool runner.
pub struct DefaultExtractOps {
    runner: Arc<dyn ToolRunnerOps>,
}

impl DefaultExtractOps {
    pub fn new() -> Self {
        Self {
            runner: Arc::new(DefaultToolRunnerOps),
        }
    }

    pub fn with_runner(runner: Arc<dyn ToolRunnerOps>) -> Self {
        Self { runner }
    }
}

impl Default for DefaultExtractOps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExtractOps for DefaultExtractOps {
    async fn decompress(
        &self,
        container: &Path,
        dest_dir: &Path,
        decompressor: Option<&Path>,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError> {
        decompress_container(
            container,
            dest_dir,
            decompressor,
            self.runner.as_ref(),
            events,
            token,
        )
        .await
    }

    async fn extract_archive(
        &self,
        archive: &Path,
        dest_dir: &Path,
        seven_zip: Option<&Path>,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError> {
        extract_archive(
            archive,
            dest_dir,
            seven_zip,
            self.runner.as_ref(),
            events,
            token,
        )
        .await
    }
}

/// A recorded extraction call.
#[derive(Debug, Clone)]
pub struct ExtractCall {
    pub operation: &'static str,
    pub source: PathBuf,
    pub dest_dir: PathBuf,
}

/// Mock extractor for pipeline tests. Successful calls materialize a small
/// image file inside the destination directory, the way the real extractor
/// would.
#[derive(Clone, Default)]
pub struct MockExtractOps {
    error: Option<ExtractError>,
    calls: Arc<Mutex<Vec<ExtractCall>>>,
}

impl MockExtractOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(error: ExtractError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ExtractCall> {
        self.calls.lock().unwrap().clone()
    }

    fn materialize(&self, dest_dir: &Path) -> Result<PathBuf, ExtractError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let output = path_util::unique_temp_path(dest_dir, "iso");
        std::fs::write(&output, b"image")
            .map_err(|e| ExtractError::IoError(format!("Mock extraction failed: {}", e)))?;
        Ok(output)
    }
}

#[async_trait::async_trait]
impl ExtractOps for MockExtractOps {
    async fn decompress(
        &self,
        container: &Path,
        dest_dir: &Path,
        _decompressor: Option<&Path>,
        _events: Option<Sender<ToolEvent>>,
        _token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError> {
        self.calls.lock().unwrap().push(ExtractCall {
            operation: "decompress",
            source: container.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
        });
        self.materialize(dest_dir)
    }

    async fn extract_archive(
        &self,
        archive: &Path,
        dest_dir: &Path,
        _seven_zip: Option<&Path>,
        _events: Option<Sender<ToolEvent>>,
        _token: &CancellationToken,
    ) -> Result<PathBuf, ExtractError> {
        self.calls.lock().unwrap().push(ExtractCall {
            operation: "extract_archive",
            source: archive.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
        });
        self.materialize(dest_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[async_std::test]
    async fn test_mock_materializes_an_image() {
        let temp_dir = tempdir().unwrap();
        let mock = MockExtractOps::new();
        let token = CancellationToken::new();

        let staged = mock
            .decompress(
                Path::new("/src/game.cso"),
                temp_dir.path(),
                None,
                None,
                &token,
            )
            .await
            .unwrap();
        assert!(staged.exists());
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.calls()[0].operation, "decompress");
    }

    #[async_std::test]
    async fn test_mock_with_error() {
        let temp_dir = tempdir().unwrap();
        let mock = MockExtractOps::with_error(ExtractError::NoTargetFound);
        let token = CancellationToken::new();

        let result = mock
            .extract_archive(
                Path::new("/src/game.zip"),
                temp_dir.path(),
                None,
                None,
                &token,
            )
            .await;
        assert_eq!(result, Err(ExtractError::NoTargetFound));
    }
}
