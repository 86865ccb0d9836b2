use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

pub mod cancel;
pub mod events;

pub type FileSize = u64;

/// Extensions the converter accepts directly as input images.
pub const IMAGE_EXTENSIONS: &[&str] = &["cue", "gdi", "toc", "nrg", "iso", "img", "raw", "hdd"];

/// Compressed single-image containers that must be decompressed before conversion.
pub const CONTAINER_EXTENSIONS: &[&str] = &["cso", "zso"];

/// Multi-entry archives that may hold an image file.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar"];

/// Extension of the converter's output format.
pub const OUTPUT_EXTENSION: &str = "chd";

/// Multi-file descriptor formats whose referenced data files travel with them.
pub const DESCRIPTOR_EXTENSIONS: &[&str] = &["cue", "gdi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display, Serialize, Deserialize)]
pub enum SourceKind {
    #[strum(serialize = "plain image")]
    PlainImage,
    #[strum(serialize = "compressed container")]
    CompressedContainer,
    #[strum(serialize = "archive")]
    Archive,
}

impl SourceKind {
    /// Classify a source file by extension. Returns `None` for files the
    /// conversion batch does not pick up at all.
    pub fn classify(path: &Path) -> Option<SourceKind> {
        let ext = lowercase_extension(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::PlainImage)
        } else if CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::CompressedContainer)
        } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::Archive)
        } else {
            None
        }
    }
}

/// Operating modes of the external converter tool. The serialized form is
/// the literal mode token passed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display, Serialize, Deserialize)]
pub enum ConvertMode {
    #[strum(serialize = "createhd")]
    CreateHd,
    #[strum(serialize = "createraw")]
    CreateRaw,
    #[strum(serialize = "createcd")]
    CreateCd,
    #[strum(serialize = "verify")]
    Verify,
}

impl ConvertMode {
    /// Extension-driven mode selection. Hard-disk images get `createhd`,
    /// raw sector dumps get `createraw`, every other supported image
    /// extension defaults to `createcd`.
    pub fn for_extension(extension: &str) -> ConvertMode {
        match extension.to_ascii_lowercase().as_str() {
            "hdd" => ConvertMode::CreateHd,
            "img" | "raw" => ConvertMode::CreateRaw,
            _ => ConvertMode::CreateCd,
        }
    }

    pub fn as_arg(&self) -> String {
        self.to_string()
    }
}

/// One unit of batch work, immutable once discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub source: PathBuf,
    pub kind: SourceKind,
    pub target: PathBuf,
    pub size_bytes: FileSize,
}

impl WorkItem {
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Returns true when the file is a multi-file image descriptor whose
/// referenced data files belong to the same logical image.
pub fn is_descriptor(path: &Path) -> bool {
    lowercase_extension(path)
        .map(|ext| DESCRIPTOR_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_supported_kinds() {
        assert_eq!(
            SourceKind::classify(Path::new("/data/Game (USA).cue")),
            Some(SourceKind::PlainImage)
        );
        assert_eq!(
            SourceKind::classify(Path::new("/data/game.CSO")),
            Some(SourceKind::CompressedContainer)
        );
        assert_eq!(
            SourceKind::classify(Path::new("/data/game.7z")),
            Some(SourceKind::Archive)
        );
        assert_eq!(SourceKind::classify(Path::new("/data/readme.txt")), None);
        assert_eq!(SourceKind::classify(Path::new("/data/noextension")), None);
    }

    #[test]
    fn test_mode_selection_is_extension_driven() {
        assert_eq!(ConvertMode::for_extension("hdd"), ConvertMode::CreateHd);
        assert_eq!(ConvertMode::for_extension("img"), ConvertMode::CreateRaw);
        assert_eq!(ConvertMode::for_extension("raw"), ConvertMode::CreateRaw);
        for ext in ["cue", "gdi", "toc", "nrg", "iso"] {
            assert_eq!(ConvertMode::for_extension(ext), ConvertMode::CreateCd);
        }
        // case-insensitive
        assert_eq!(ConvertMode::for_extension("HDD"), ConvertMode::CreateHd);
        assert_eq!(ConvertMode::for_extension("IMG"), ConvertMode::CreateRaw);
    }

    #[test]
    fn test_mode_arg_token() {
        assert_eq!(ConvertMode::CreateCd.as_arg(), "createcd");
        assert_eq!(ConvertMode::Verify.as_arg(), "verify");
    }

    #[test]
    fn test_is_descriptor() {
        assert!(is_descriptor(Path::new("disc.cue")));
        assert!(is_descriptor(Path::new("disc.GDI")));
        assert!(!is_descriptor(Path::new("disc.iso")));
    }
}
