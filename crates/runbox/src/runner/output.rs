//! Output sanitization
//!
//! Program output is untrusted bytes. It is decoded leniently and capped
//! before it reaches a caller or the execution log.

/// Appended when output had to be cut
pub const TRUNCATION_MARKER: &str = "\n\n[output truncated]";

/// Decode `raw` as UTF-8 and cap it at `cap` bytes
///
/// Invalid sequences become U+FFFD. Text longer than `cap` is cut at the
/// nearest character boundary at or below `cap` and marked with
/// [`TRUNCATION_MARKER`].
pub fn sanitize(raw: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= cap {
        return text.into_owned();
    }

    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = String::with_capacity(end + TRUNCATION_MARKER.len());
    out.push_str(&text[..end]);
    out.push_str(TRUNCATION_MARKER);
    out
}
