//! Text normalization for name candidates

/// Keep ASCII letters, whitespace, `.`, `'` and `-`; collapse whitespace;
/// trim; strip leading and trailing `.` / `-`.
pub fn clean_special_characters(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace() || matches!(c, '.' | '\'' | '-'))
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c| c == '.' || c == '-')
        .trim()
        .to_string()
}
