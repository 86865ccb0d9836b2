//! Parses multi-file image descriptors (cue sheets and GD-ROM `.gdi`
//! descriptors) and resolves the data files they reference against the
//! descriptor's own directory.

use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorError {
    IoError(String),
    ParseError(String),
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorError::IoError(message) => write!(f, "IO error: {}", message),
            DescriptorError::ParseError(message) => write!(f, "Parse error: {}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    CueSheet,
    GdRom,
}

impl DescriptorKind {
    pub fn of(path: &Path) -> Option<DescriptorKind> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "cue" => Some(DescriptorKind::CueSheet),
            "gdi" => Some(DescriptorKind::GdRom),
            _ => None,
        }
    }
}

/// Trait for descriptor resolution, mockable for pipeline tests.
pub trait DescriptorOps: Send + Sync {
    fn referenced_files(&self, descriptor: &Path) -> Result<Vec<PathBuf>, DescriptorError>;
}

pub struct DefaultDescriptorResolver;

impl DescriptorOps for DefaultDescriptorResolver {
    fn referenced_files(&self, descriptor: &Path) -> Result<Vec<PathBuf>, DescriptorError> {
        referenced_files(descriptor)
    }
}

pub struct MockDescriptorResolver {
    result: Result<Vec<PathBuf>, DescriptorError>,
}

impl MockDescriptorResolver {
    pub fn new(result: Result<Vec<PathBuf>, DescriptorError>) -> Self {
        Self { result }
    }
}

impl DescriptorOps for MockDescriptorResolver {
    fn referenced_files(&self, _descriptor: &Path) -> Result<Vec<PathBuf>, DescriptorError> {
        self.result.clone()
    }
}

/// Return the data files referenced by the descriptor, resolved relative to
/// the descriptor's directory. Lines that do not yield a file name are
/// skipped; an unreadable descriptor is an error, an empty list is not.
pub fn referenced_files(descriptor: &Path) -> Result<Vec<PathBuf>, DescriptorError> {
    let kind = DescriptorKind::of(descriptor).ok_or_else(|| {
        DescriptorError::ParseError(format!(
            "Not a recognized descriptor: {}",
            descriptor.display()
        ))
    })?;
    let content = std::fs::read_to_string(descriptor).map_err(|e| {
        DescriptorError::IoError(format!(
            "Failed reading descriptor {}: {}",
            descriptor.display(),
            e
        ))
    })?;
    let dir = descriptor.parent().unwrap_or_else(|| Path::new(""));
    let names = match kind {
        DescriptorKind::CueSheet => parse_cue(&content),
        DescriptorKind::GdRom => parse_gdi(&content),
    };
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// Cue sheets: every `FILE "name" TYPE` directive names one data file.
/// Falls back to the second whitespace-delimited token when the name is
/// not quoted.
fn parse_cue(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        let mut tokens = trimmed.split_whitespace();
        let Some(first) = tokens.next() else { continue };
        if !first.eq_ignore_ascii_case("FILE") {
            continue;
        }
        if let Some(name) = quoted_token(trimmed) {
            names.push(name);
        } else if let Some(second) = tokens.next() {
            names.push(second.to_string());
        }
    }
    names
}

/// GD-ROM descriptors: the first line is the track count header; each
/// following non-blank line describes one track. Falls back to the fifth
/// whitespace-delimited field when the name is not quoted.
fn parse_gdi(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in content.lines().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = quoted_token(trimmed) {
            names.push(name);
        } else if let Some(fifth) = trimmed.split_whitespace().nth(4) {
            names.push(fifth.to_string());
        }
    }
    names
}

fn quoted_token(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cue_file_directive_with_quotes() {
        let temp_dir = tempdir().unwrap();
        let cue_path = temp_dir.path().join("disc.cue");
        std::fs::write(
            &cue_path,
            "FILE \"Track 01.bin\" BINARY\n  TRACK 01 MODE1/2352\n    INDEX 01 00:00:00\n",
        )
        .unwrap();

        let files = referenced_files(&cue_path).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("Track 01.bin")]);
    }

    #[test]
    fn test_cue_unquoted_fallback() {
        let temp_dir = tempdir().unwrap();
        let cue_path = temp_dir.path().join("disc.cue");
        std::fs::write(&cue_path, "FILE track01.bin BINARY\n").unwrap();

        let files = referenced_files(&cue_path).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("track01.bin")]);
    }

    #[test]
    fn test_cue_multiple_file_directives() {
        let temp_dir = tempdir().unwrap();
        let cue_path = temp_dir.path().join("disc.cue");
        std::fs::write(
            &cue_path,
            "FILE \"Track 01.bin\" BINARY\nTRACK 01 AUDIO\nFILE \"Track 02.bin\" BINARY\n",
        )
        .unwrap();

        let files = referenced_files(&cue_path).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1], temp_dir.path().join("Track 02.bin"));
    }

    #[test]
    fn test_gdi_skips_header_and_reads_quoted_names() {
        let temp_dir = tempdir().unwrap();
        let gdi_path = temp_dir.path().join("disc.gdi");
        std::fs::write(
            &gdi_path,
            "3\n1 0 4 2352 \"track01.bin\" 0\n2 600 0 2352 \"track02.raw\" 0\n\n",
        )
        .unwrap();

        let files = referenced_files(&gdi_path).unwrap();
        assert_eq!(
            files,
            vec![
                temp_dir.path().join("track01.bin"),
                temp_dir.path().join("track02.raw"),
            ]
        );
    }

    #[test]
    fn test_gdi_unquoted_fifth_field_fallback() {
        let temp_dir = tempdir().unwrap();
        let gdi_path = temp_dir.path().join("disc.gdi");
        std::fs::write(&gdi_path, "1\n1 0 4 2352 track01.bin 0\n").unwrap();

        let files = referenced_files(&gdi_path).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("track01.bin")]);
    }

    #[test]
    fn test_lines_without_names_are_skipped() {
        let temp_dir = tempdir().unwrap();
        let cue_path = temp_dir.path().join("disc.cue");
        std::fs::write(&cue_path, "REM COMMENT\nTRACK 01 AUDIO\nFILE\n").unwrap();

        let files = referenced_files(&cue_path).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_unreadable_descriptor_is_io_error() {
        let result = referenced_files(Path::new("/nonexistent/disc.cue"));
        assert!(matches!(result, Err(DescriptorError::IoError(_))));
    }

    #[test]
    fn test_unrecognized_extension_is_parse_error() {
        let result = referenced_files(Path::new("/tmp/disc.iso"));
        assert!(matches!(result, Err(DescriptorError::ParseError(_))));
    }

    #[test]
    fn test_mock_resolver_returns_configured_result() {
        let mock = MockDescriptorResolver::new(Ok(vec![PathBuf::from("/a/track01.bin")]));
        let files = mock.referenced_files(Path::new("/a/disc.cue")).unwrap();
        assert_eq!(files, vec![PathBuf::from("/a/track01.bin")]);
    }
}
