//! Label and tag normalization.

/// Normalize a label or tag value: lowercase, spaces to underscores, and a
/// single trailing plural `s` removed.
///
/// Tokens ending in `ss` keep their ending ("glass", "grass"), so applying
/// this twice gives the same result as applying it once.
pub fn normalize_label(raw: &str) -> String {
    let mut label = raw.trim().to_lowercase().replace(' ', "_");
    if label.ends_with('s') && !label.ends_with("ss") {
        label.pop();
    }
    label
}

/// Whether a normalized tag string carries several classifications
pub fn is_multi_tag(tag: &str) -> bool {
    tag.contains(';')
}
