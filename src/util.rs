//! Shared helpers for naming runs and branches.

/// Lowercase ASCII slug of `text`, limited to `max_len` characters.
///
/// Non-alphanumeric runs collapse to a single `-`; the result never starts
/// or ends with one.
pub fn slugify(text: &str, max_len: usize) -> String {
    let slug = text
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        // ASCII only, so any byte index is a char boundary.
        slug[..max_len].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// First seven characters of a commit id.
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
