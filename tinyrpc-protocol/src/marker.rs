//! Protocol-marker convention for plain-text payloads.
//!
//! A payload such as `"#hello there"` starts with a marker character that
//! selects the handler; the body is whatever follows the last occurrence of
//! the marker. The convention lives above framing and is optional.

/// Marker used when none is configured.
pub const DEFAULT_MARKER: char = '#';

/// A plain-text payload carrying a leading marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedText<'a> {
    pub marker: char,
    pub body: &'a str,
}

impl<'a> MarkedText<'a> {
    /// Parses `text` if it starts with `marker`.
    ///
    /// Returns `None` for unmarked text.
    pub fn parse(text: &'a str, marker: char) -> Option<Self> {
        if !text.starts_with(marker) {
            return None;
        }
        let body_start = text.rfind(marker)? + marker.len_utf8();
        Some(Self {
            marker,
            body: &text[body_start..],
        })
    }
}

/// Prefixes `body` with `marker`.
pub fn mark(marker: char, body: &str) -> String {
    let mut text = String::with_capacity(body.len() + marker.len_utf8());
    text.push(marker);
    text.push_str(body);
    text
}

/// Returns the body of `text` with any leading `marker` section removed.
pub fn strip(text: &str, marker: char) -> &str {
    match MarkedText::parse(text, marker) {
        Some(marked) => marked.body,
        None => text,
    }
}
