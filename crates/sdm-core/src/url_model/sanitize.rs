//! Filename sanitization for Linux filesystems.

/// Linux NAME_MAX, in bytes.
const NAME_MAX: usize = 255;

/// Makes a server- or URL-supplied name safe to create in the destination directory.
///
/// Separators, NUL, whitespace and control characters become `_` (runs
/// collapsed); leading and trailing dots, spaces and underscores are trimmed,
/// so the result can never be `..` or escape the directory. Truncated to
/// NAME_MAX on a char boundary.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let unsafe_char = matches!(c, '/' | '\\' | ' ' | '\t') || c.is_control();
        if !unsafe_char {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches(|c| matches!(c, ' ' | '\t' | '.' | '_'));
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
