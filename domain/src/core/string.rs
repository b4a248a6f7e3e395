//! String utilities for the domain layer.

/// Truncate a string to a maximum byte length with ellipsis (UTF-8 safe).
///
/// Truncation always lands on a character boundary.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let target = max_len.saturating_sub(3);
        let mut end = target.min(s.len());
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// Used when quoting passage text in citations so excerpts stay on one line.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One-line excerpt of passage text for citation display.
pub fn excerpt(text: &str, max_len: usize) -> String {
    truncate(&normalize_whitespace(text), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("incident", 10), "incident");
        assert_eq!(truncate("login incident report", 8), "login...");
    }

    #[test]
    fn test_truncate_multibyte() {
        // "é" is two bytes; the cut must not split it
        assert_eq!(truncate("résumé résumé", 5), "r...");
        assert_eq!(truncate("résumé résumé", 6), "ré...");
        assert_eq!(truncate("日本語", 30), "日本語");
    }

    #[test]
    fn test_excerpt_flattens_lines() {
        let text = "Login failures\n\n  spiked at   09:00\tUTC";
        assert_eq!(excerpt(text, 100), "Login failures spiked at 09:00 UTC");
        assert_eq!(excerpt(text, 17), "Login failures...");
    }
}
