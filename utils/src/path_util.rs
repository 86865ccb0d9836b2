use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Characters Windows refuses in file names; also unsafe as bare
/// command-line tokens.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Unicode punctuation known to break external extractors.
const PROBLEM_CHARS: &[char] = &['\u{2026}', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

const PLACEHOLDER: char = '_';

/// Produce a file name that is safe for the filesystem and as a bare
/// command-line token. Invalid and problematic characters are replaced with
/// an ASCII placeholder; trailing dots and spaces are dropped.
///
/// Idempotent: sanitizing an already sanitized name is a no-op.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) || PROBLEM_CHARS.contains(&c) {
                PLACEHOLDER
            } else {
                c
            }
        })
        .collect();
    replaced.trim_end_matches(['.', ' ']).to_string()
}

/// A fresh collision-free base name with the given extension, decoupled from
/// whatever the original file was called. Pass an empty extension for a bare
/// name. Never touches the filesystem.
pub fn unique_temp_name(extension: &str) -> String {
    let base = Uuid::new_v4().to_string();
    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension.trim_start_matches('.'))
    }
}

/// A fresh temp file path inside `dir`; see [`unique_temp_name`].
pub fn unique_temp_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(unique_temp_name(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_invalid_and_unicode_chars() {
        let sanitized = sanitize_file_name("Game\u{2026}: The \"Sequel\"?");
        assert!(!sanitized.contains('\u{2026}'));
        assert!(!sanitized.contains(':'));
        assert!(!sanitized.contains('"'));
        assert!(!sanitized.contains('?'));
        assert_eq!(sanitized, "Game__ The _Sequel__");
    }

    #[test]
    fn test_sanitize_exact_replacement() {
        assert_eq!(sanitize_file_name("a<b>c"), "a_b_c");
        assert_eq!(sanitize_file_name("name."), "name");
        assert_eq!(sanitize_file_name("name. . "), "name");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_file_name("Track\u{2026} 01?.bin ");
        let twice = sanitize_file_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitize_keeps_valid_input_non_empty() {
        assert!(!sanitize_file_name("a???").is_empty());
        assert_eq!(sanitize_file_name("plain name.iso"), "plain name.iso");
    }

    #[test]
    fn test_unique_temp_name_has_extension_and_is_fresh() {
        let first = unique_temp_name("iso");
        let second = unique_temp_name("iso");
        assert!(first.ends_with(".iso"));
        assert_ne!(first, second);
        assert!(!unique_temp_name("").contains('.'));
    }

    #[test]
    fn test_unique_temp_path_joins_dir() {
        let path = unique_temp_path(Path::new("/tmp/work"), ".cue");
        assert!(path.starts_with("/tmp/work"));
        assert_eq!(path.extension().unwrap(), "cue");
    }
}
