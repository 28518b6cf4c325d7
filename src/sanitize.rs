//! Label slugs, relative-path sanitization, and the extension allow-list.
//!
//! Every client-supplied path passes through [`sanitize_rel_path`] before
//! it is joined to a session's remote directory, so traversal segments can
//! never escape it.

/// Derive a URL-safe slug from a human label.
///
/// Runs of non-alphanumeric characters collapse to a single `-`, the
/// result is lowercased and capped at 64 characters. Returns an empty
/// string for labels with no usable characters.
#[must_use]
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_dash = false;
    for ch in label.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(64);
    slug
}

/// Sanitize a client-supplied relative path.
///
/// Backslashes become slashes, repeated slashes collapse, and segments
/// equal to ``, `.` or `..` are dropped outright, which defeats
/// traversal. Within each remaining segment any character outside
/// `[A-Za-z0-9._-]` is replaced with `_`.
#[must_use]
pub fn sanitize_rel_path(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let segments: Vec<String> = normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(sanitize_segment)
        .collect();
    segments.join("/")
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Check a file name against the configured extension allow-list.
///
/// A missing extension is always allowed; otherwise the lowercased
/// extension must appear in `allowed`. Dotfiles count their suffix as
/// the extension, so `.phtml` is checked like `x.phtml`.
#[must_use]
pub fn extension_allowed(name: &str, allowed: &[String]) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
        }
        _ => true,
    }
}
