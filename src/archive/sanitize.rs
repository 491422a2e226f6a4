//! Filesystem-safe names.

/// Characters no store or filesystem is guaranteed to accept in a name.
const FORBIDDEN: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Longest sanitized name before the ellipsis is added.
pub const MAX_NAME_CHARS: usize = 120;

/// Returned when nothing printable is left.
const EMPTY_NAME: &str = "untitled";

/// Make `text` safe to use as (part of) a filename.
///
/// Forbidden characters and control characters become spaces, whitespace runs
/// collapse to one space, and the result is trimmed. Names longer than
/// [`MAX_NAME_CHARS`] characters are cut and end in `…`.
pub fn sanitize(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return EMPTY_NAME.to_string();
    }

    if collapsed.chars().count() <= MAX_NAME_CHARS {
        return collapsed;
    }

    let cut: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    format!("{}…", cut.trim_end())
}
