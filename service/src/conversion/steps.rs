use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use core_types::{ConvertMode, SourceKind, lowercase_extension};
use tool_runner::ToolInvocation;
use utils::path_util;

use crate::conversion::context::ConversionContext;
use crate::error::Error;
use crate::pipeline::pipeline_step::{PipelineStep, StepAction};
use crate::settings::core_count_hint;

const THROUGHPUT_POLL: Duration = Duration::from_secs(1);

/// Step 1: Materialize a converter-ready input inside a fresh staging
/// directory, depending on the source kind.
pub struct StageInputStep;

#[async_trait::async_trait]
impl PipelineStep<ConversionContext> for StageInputStep {
    fn name(&self) -> &'static str {
        "stage_input"
    }

    async fn execute(&self, context: &mut ConversionContext) -> StepAction {
        if context.token.is_cancelled() {
            return StepAction::Abort(Error::OperationCancelled);
        }

        let staging_dir = match create_staging_dir(context) {
            Ok(dir) => dir,
            Err(e) => {
                return StepAction::Abort(Error::StagingFailed(format!(
                    "Failed creating staging directory: {}",
                    e
                )));
            }
        };

        let staged = match context.item.kind {
            SourceKind::CompressedContainer => stage_container(context, &staging_dir).await,
            SourceKind::Archive => stage_archive(context, &staging_dir).await,
            SourceKind::PlainImage => stage_plain_image(context, &staging_dir),
        };

        match staged {
            Ok(path) => {
                tracing::info!(
                    source = %context.item.source.display(),
                    staged = %path.display(),
                    "Staged input"
                );
                context.staged_input = Some(path);
                StepAction::Continue
            }
            Err(e) => StepAction::Abort(e),
        }
    }
}

fn create_staging_dir(context: &mut ConversionContext) -> io::Result<PathBuf> {
    let dir = context
        .settings
        .staging_root
        .join(format!("staging-{}", path_util::unique_temp_name("")));
    context.ops.fs_ops.create_dir_all(&dir)?;
    context.staging_dir = Some(dir.clone());
    Ok(dir)
}

async fn stage_container(
    context: &ConversionContext,
    staging_dir: &Path,
) -> Result<PathBuf, Error> {
    if context.settings.tools.decompressor.is_none() {
        return Err(Error::DependencyMissing("decompressor".to_string()));
    }
    context
        .ops
        .extract_ops
        .decompress(
            &context.item.source,
            staging_dir,
            context.settings.tools.decompressor.as_deref(),
            context.tool_tx.clone(),
            &context.token,
        )
        .await
        .map_err(Error::from)
}

async fn stage_archive(context: &ConversionContext, staging_dir: &Path) -> Result<PathBuf, Error> {
    let needs_seven_zip = matches!(
        lowercase_extension(&context.item.source).as_deref(),
        Some("7z") | Some("rar")
    );
    if needs_seven_zip && context.settings.tools.seven_zip.is_none() {
        return Err(Error::DependencyMissing("7z".to_string()));
    }

    let found = context
        .ops
        .extract_ops
        .extract_archive(
            &context.item.source,
            staging_dir,
            context.settings.tools.seven_zip.as_deref(),
            context.tool_tx.clone(),
            &context.token,
        )
        .await?;

    // Second safe temp name, in case unusual characters survived extraction.
    let ext = lowercase_extension(&found).unwrap_or_default();
    let staged = path_util::unique_temp_path(staging_dir, &ext);
    context.ops.fs_ops.copy_file(&found, &staged).map_err(|e| {
        Error::StagingFailed(format!(
            "Failed copying extracted file {}: {}",
            found.display(),
            e
        ))
    })?;
    Ok(staged)
}

fn stage_plain_image(context: &ConversionContext, staging_dir: &Path) -> Result<PathBuf, Error> {
    let source = &context.item.source;
    let ext = lowercase_extension(source).unwrap_or_default();
    let staged = path_util::unique_temp_path(staging_dir, &ext);
    context.ops.fs_ops.copy_file(source, &staged).map_err(|e| {
        Error::StagingFailed(format!("Failed copying {}: {}", source.display(), e))
    })?;

    if core_types::is_descriptor(source) {
        // The referenced data files must sit next to the staged descriptor
        // under the exact names the descriptor uses.
        let referenced = context
            .ops
            .descriptor_ops
            .referenced_files(source)
            .map_err(|e| {
                Error::StagingFailed(format!(
                    "Failed resolving data files of {}: {}",
                    source.display(),
                    e
                ))
            })?;
        for data_file in referenced {
            let Some(name) = data_file.file_name() else {
                continue;
            };
            let dest = staging_dir.join(name);
            context.ops.fs_ops.copy_file(&data_file, &dest).map_err(|e| {
                Error::StagingFailed(format!(
                    "Failed copying data file {}: {}",
                    data_file.display(),
                    e
                ))
            })?;
        }
    }
    Ok(staged)
}

/// Step 2: Run the converter against the staged input, sampling output
/// growth for throughput telemetry.
pub struct ConvertStep;

#[async_trait::async_trait]
impl PipelineStep<ConversionContext> for ConvertStep {
    fn name(&self) -> &'static str {
        "convert"
    }

    async fn execute(&self, context: &mut ConversionContext) -> StepAction {
        if context.token.is_cancelled() {
            return StepAction::Abort(Error::OperationCancelled);
        }
        let Some(staged) = context.staged_input.clone() else {
            return StepAction::Abort(Error::InvalidInput(
                "No staged input to convert".to_string(),
            ));
        };

        let ext = lowercase_extension(&staged).unwrap_or_default();
        let mode = ConvertMode::for_extension(&ext);
        let cores = core_count_hint(context.settings.parallel, context.settings.worker_count);

        if let Some(parent) = context.item.target.parent() {
            if let Err(e) = context.ops.fs_ops.create_dir_all(parent) {
                return StepAction::Abort(Error::IoError(format!(
                    "Failed creating output directory: {}",
                    e
                )));
            }
        }

        tracing::info!(
            mode = %mode,
            input = %staged.display(),
            target = %context.item.target.display(),
            cores,
            "Converting"
        );
        context.target_started = true;

        let invocation = ToolInvocation::new(&context.settings.tools.converter)
            .arg(mode.as_arg())
            .arg("-i")
            .arg(staged.as_os_str())
            .arg("-o")
            .arg(context.item.target.as_os_str())
            .arg("-f")
            .arg("-np")
            .arg(cores.to_string());

        let run = context
            .ops
            .tool_runner_ops
            .run_with_throughput(
                &invocation,
                &context.item.target,
                THROUGHPUT_POLL,
                context.tool_tx.clone(),
                &context.token,
            )
            .await;

        match run {
            Ok(exit) if exit.success() => {
                if !context.ops.fs_ops.exists(&context.item.target) {
                    return StepAction::Abort(Error::OutputMissing(format!(
                        "Converter produced no output for {}",
                        context.item.file_name()
                    )));
                }
                StepAction::Continue
            }
            Ok(exit) => StepAction::Abort(Error::ToolExecutionFailed(format!(
                "Converter exited with status {:?} for {}",
                exit.code,
                context.item.file_name()
            ))),
            Err(e) => StepAction::Abort(Error::from(e)),
        }
    }
}

/// Step 3: Optionally delete the converted source, including the data files
/// referenced by a multi-file descriptor. Removal is best-effort since the
/// conversion itself already succeeded.
pub struct CommitStep;

#[async_trait::async_trait]
impl PipelineStep<ConversionContext> for CommitStep {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn should_execute(&self, context: &ConversionContext) -> bool {
        context.settings.delete_source
    }

    async fn execute(&self, context: &mut ConversionContext) -> StepAction {
        let source = context.item.source.clone();

        if core_types::is_descriptor(&source) {
            match context.ops.descriptor_ops.referenced_files(&source) {
                Ok(data_files) => {
                    for data_file in data_files {
                        if let Err(e) = context.ops.fs_ops.remove_file(&data_file) {
                            tracing::warn!(
                                "Failed to delete data file {}: {}",
                                data_file.display(),
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not resolve data files of {}: {}",
                        source.display(),
                        e
                    );
                }
            }
        }

        if let Err(e) = context.ops.fs_ops.remove_file(&source) {
            tracing::warn!("Failed to delete source {}: {}", source.display(), e);
            context
                .log(format!("Could not delete {}: {}", source.display(), e))
                .await;
        }
        StepAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tool_runner::ops::MockToolRunnerOps;

    use core_types::WorkItem;
    use core_types::cancel::CancellationToken;

    use crate::conversion::context::{ConversionContext, ConversionOps};
    use crate::settings::{ConversionSettings, ToolPaths};

    fn context_for(source: PathBuf, kind: SourceKind, staging_root: PathBuf) -> ConversionContext {
        let mut settings =
            ConversionSettings::new(ToolPaths::new("/opt/tools/chdman"), staging_root.join("out"));
        settings.staging_root = staging_root;
        let mut ops = ConversionOps::production();
        ops.tool_runner_ops = Arc::new(MockToolRunnerOps::new());
        let item = WorkItem {
            target: settings.output_dir.join("out.chd"),
            source,
            kind,
            size_bytes: 0,
        };
        ConversionContext::new(
            item,
            Arc::new(settings),
            ops,
            CancellationToken::new(),
            None,
            None,
        )
    }

    #[async_std::test]
    async fn test_stage_plain_image_uses_fresh_temp_name() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("Game\u{2026} (USA).iso");
        std::fs::write(&source, b"image").unwrap();

        let mut context = context_for(source, SourceKind::PlainImage, temp_dir.path().join("st"));
        std::fs::create_dir_all(&context.settings.staging_root).unwrap();
        let action = StageInputStep.execute(&mut context).await;
        assert_eq!(action, StepAction::Continue);

        let staged = context.staged_input.as_ref().unwrap();
        assert!(staged.exists());
        assert_eq!(staged.extension().unwrap(), "iso");
        assert!(!staged.to_string_lossy().contains('\u{2026}'));
        assert!(staged.starts_with(context.staging_dir.as_ref().unwrap()));
    }

    #[async_std::test]
    async fn test_stage_descriptor_brings_data_files_along() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("disc.cue");
        std::fs::write(&source, "FILE \"Track 01.bin\" BINARY\n").unwrap();
        std::fs::write(temp_dir.path().join("Track 01.bin"), b"track").unwrap();

        let mut context = context_for(source, SourceKind::PlainImage, temp_dir.path().join("st"));
        std::fs::create_dir_all(&context.settings.staging_root).unwrap();
        let action = StageInputStep.execute(&mut context).await;
        assert_eq!(action, StepAction::Continue);

        let staging_dir = context.staging_dir.clone().unwrap();
        assert!(staging_dir.join("Track 01.bin").exists());
        let staged = context.staged_input.as_ref().unwrap();
        assert_eq!(staged.extension().unwrap(), "cue");
        assert_ne!(staged.file_name().unwrap(), "disc.cue");
    }

    #[async_std::test]
    async fn test_stage_descriptor_with_missing_data_file_fails() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("disc.cue");
        std::fs::write(&source, "FILE \"missing.bin\" BINARY\n").unwrap();

        let mut context = context_for(source, SourceKind::PlainImage, temp_dir.path().join("st"));
        std::fs::create_dir_all(&context.settings.staging_root).unwrap();
        let action = StageInputStep.execute(&mut context).await;
        assert!(matches!(
            action,
            StepAction::Abort(Error::StagingFailed(_))
        ));
        // The staging directory is still recorded so the service can clean it.
        assert!(context.staging_dir.is_some());
    }
}
