/// Extract a progress percentage from a tool output line.
///
/// Recognized forms are the converter's own progress tokens, e.g.
/// `Compressing hunk 123/456 (27%)` and `Compressing, 45.6% complete`.
/// Returns `None` for anything that does not carry a plausible percentage.
pub fn parse_progress_percent(line: &str) -> Option<f32> {
    let percent_pos = line.find('%')?;
    let head = &line[..percent_pos];
    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let token = &head[start..];
    if token.is_empty() {
        return None;
    }
    let percent: f32 = token.parse().ok()?;
    if !(0.0..=100.0).contains(&percent) {
        return None;
    }
    Some(percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fraction_form() {
        assert_eq!(
            parse_progress_percent("Compressing hunk 123/456 (27%)"),
            Some(27.0)
        );
    }

    #[test]
    fn test_parses_complete_form() {
        assert_eq!(
            parse_progress_percent("Compressing, 45.6% complete"),
            Some(45.6)
        );
        assert_eq!(
            parse_progress_percent("Extracting, 0.0% complete"),
            Some(0.0)
        );
    }

    #[test]
    fn test_first_percent_token_wins() {
        assert_eq!(
            parse_progress_percent("Compressing, 45.6% complete... (ratio=40.5%)"),
            Some(45.6)
        );
    }

    #[test]
    fn test_rejects_lines_without_percentage() {
        assert_eq!(parse_progress_percent("wrote 1234 bytes"), None);
        assert_eq!(parse_progress_percent("%"), None);
        assert_eq!(parse_progress_percent("loading..."), None);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert_eq!(parse_progress_percent("ratio grew by 250%"), None);
    }
}
