use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default width of the parallel worker pool.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Locations of the external tools the pipelines drive. Only the converter
/// is mandatory; the optional tools are required per item kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    pub converter: PathBuf,
    pub decompressor: Option<PathBuf>,
    pub seven_zip: Option<PathBuf>,
}

impl ToolPaths {
    pub fn new(converter: impl Into<PathBuf>) -> Self {
        Self {
            converter: converter.into(),
            decompressor: None,
            seven_zip: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub tools: ToolPaths,
    pub output_dir: PathBuf,
    /// Root under which each item gets its own staging directory.
    pub staging_root: PathBuf,
    pub parallel: bool,
    pub worker_count: usize,
    pub smallest_first: bool,
    pub delete_source: bool,
}

impl ConversionSettings {
    pub fn new(tools: ToolPaths, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            output_dir: output_dir.into(),
            staging_root: std::env::temp_dir(),
            parallel: false,
            worker_count: DEFAULT_WORKER_COUNT,
            smallest_first: false,
            delete_source: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    pub tools: ToolPaths,
    pub recursive: bool,
    /// Where verified-good files are moved, mirroring the scan root's
    /// subfolder structure. `None` leaves files in place.
    pub success_root: Option<PathBuf>,
    /// Same for files that fail verification.
    pub failed_root: Option<PathBuf>,
    pub parallel: bool,
    pub worker_count: usize,
}

impl VerificationSettings {
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            recursive: false,
            success_root: None,
            failed_root: None,
            parallel: false,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Core-count hint handed to the converter. Under parallel dispatch each
/// worker gets an equal share of the machine; a lone conversion gets all
/// cores.
pub fn core_count_hint(parallel: bool, worker_count: usize) -> usize {
    let cores = num_cpus::get();
    if parallel {
        (cores / worker_count.max(1)).max(1)
    } else {
        cores.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_count_hint_serial_uses_all_cores() {
        assert_eq!(core_count_hint(false, DEFAULT_WORKER_COUNT), num_cpus::get());
    }

    #[test]
    fn test_core_count_hint_parallel_divides_by_worker_count() {
        let expected = (num_cpus::get() / DEFAULT_WORKER_COUNT).max(1);
        assert_eq!(core_count_hint(true, DEFAULT_WORKER_COUNT), expected);
    }

    #[test]
    fn test_core_count_hint_never_zero() {
        assert!(core_count_hint(true, 10_000) >= 1);
        assert!(core_count_hint(true, 0) >= 1);
    }
}
