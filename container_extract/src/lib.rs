use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_std::channel::Sender;
use zip::ZipArchive;

use core_types::cancel::CancellationToken;
use core_types::events::ToolEvent;
use core_types::{lowercase_extension, IMAGE_EXTENSIONS};
use tool_runner::ops::ToolRunnerOps;
use tool_runner::ToolInvocation;
use utils::{file_util, path_util};

use error::ExtractError;

pub mod error;
pub mod ops;

const THROUGHPUT_POLL: Duration = Duration::from_secs(1);

/// Decompress a single-image container (CSO-style) into `dest_dir` using the
/// external decompressor, and return the path of the produced image.
///
/// The destination file's size is polled once per second while the process
/// runs, feeding the throughput telemetry. The tool's exit code is the sole
/// success signal; exit 0 with no output file is still a failure.
pub async fn decompress_container(
    container: &Path,
    dest_dir: &Path,
    decompressor: Option<&Path>,
    runner: &dyn ToolRunnerOps,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<PathBuf, ExtractError> {
    let tool =
        decompressor.ok_or_else(|| ExtractError::ToolUnavailable("decompressor".to_string()))?;
    let output = path_util::unique_temp_path(dest_dir, "iso");

    let invocation = ToolInvocation::new(tool)
        .arg("--decompress")
        .arg(container.as_os_str())
        .arg("-o")
        .arg(output.as_os_str());

    let exit = runner
        .run_with_throughput(&invocation, &output, THROUGHPUT_POLL, events, token)
        .await?;
    if !exit.success() {
        return Err(ExtractError::ToolExecutionFailed(exit.code));
    }
    if !output.exists() {
        return Err(ExtractError::OutputMissing);
    }
    Ok(output)
}

/// Extract an archive into `dest_dir` and return the first supported image
/// file found inside it.
///
/// Deflate archives are handled by the built-in zip extractor; 7z and RAR
/// archives go through the external `7z` binary. The scan of the extracted
/// tree is recursive and returns the first eligible file.
pub async fn extract_archive(
    archive: &Path,
    dest_dir: &Path,
    seven_zip: Option<&Path>,
    runner: &dyn ToolRunnerOps,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<PathBuf, ExtractError> {
    let ext = lowercase_extension(archive)
        .ok_or_else(|| ExtractError::UnsupportedContainer("<no extension>".to_string()))?;

    match ext.as_str() {
        "zip" => extract_zip(archive, dest_dir)?,
        "7z" | "rar" => {
            extract_with_seven_zip(archive, &ext, dest_dir, seven_zip, runner, events, token)
                .await?
        }
        other => return Err(ExtractError::UnsupportedContainer(other.to_string())),
    }

    file_util::find_first_by_extension(dest_dir, IMAGE_EXTENSIONS)
        .ok_or(ExtractError::NoTargetFound)
}

fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive)
        .map_err(|e| ExtractError::IoError(format!("Failed opening archive: {}", e)))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| ExtractError::ArchiveError(format!("Failed reading zip archive: {}", e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| ExtractError::ArchiveError(format!("Failed reading zip entry: {}", e)))?;
        let Some(rel_path) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest_dir.join(rel_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| ExtractError::IoError(format!("Failed creating directory: {}", e)))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ExtractError::IoError(format!("Failed creating directory: {}", e))
                })?;
            }
            let mut out_file = File::create(&out_path)
                .map_err(|e| ExtractError::IoError(format!("Failed creating file: {}", e)))?;
            std::io::copy(&mut entry, &mut out_file)
                .map_err(|e| ExtractError::IoError(format!("Failed writing entry: {}", e)))?;
        }
    }
    Ok(())
}

/// The general extractor is intolerant of unusual path characters, so the
/// archive is always handed over as a copy under a sanitized temp name. The
/// copy is removed whether or not extraction succeeds.
async fn extract_with_seven_zip(
    archive: &Path,
    extension: &str,
    dest_dir: &Path,
    seven_zip: Option<&Path>,
    runner: &dyn ToolRunnerOps,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<(), ExtractError> {
    let tool = seven_zip.ok_or_else(|| ExtractError::ToolUnavailable("7z".to_string()))?;

    let safe_copy = path_util::unique_temp_path(dest_dir, extension);
    std::fs::copy(archive, &safe_copy).map_err(|e| {
        ExtractError::IoError(format!("Failed copying archive for extraction: {}", e))
    })?;

    let mut output_flag = OsString::from("-o");
    output_flag.push(dest_dir.as_os_str());
    let invocation = ToolInvocation::new(tool)
        .arg("x")
        .arg(safe_copy.as_os_str())
        .arg(output_flag)
        .arg("-y");

    let result = runner.run(&invocation, events, token).await;

    if let Err(e) = std::fs::remove_file(&safe_copy) {
        tracing::warn!(
            "Failed to remove archive copy {}: {}",
            safe_copy.display(),
            e
        );
    }

    let exit = result?;
    if !exit.success() {
        return Err(ExtractError::ToolExecutionFailed(exit.code));
    }
    Ok(())
}
