/// Canonical slug for a display name.
///
/// Lowercases ASCII alphanumerics and collapses every run of anything else into a
/// single `-`, with no leading or trailing hyphen. Non-ASCII characters count as
/// separators. Empty input yields an empty slug; callers must not persist entities
/// with an empty name.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Source slugs use `_` where stored slugs use `-`.
pub fn from_source_slug(source: &str, title: &str) -> String {
    let replaced = source.trim().replace('_', "-");
    if replaced.is_empty() {
        normalize(title)
    } else {
        replaced
    }
}

/// Detail pages are addressed by the lowercase slug with `-` swapped for `_`.
pub fn to_detail_path(slug: &str) -> String {
    slug.trim().to_ascii_lowercase().replace('-', "_")
}
