//! Mention and slash-command trigger detection.
//!
//! The popup layer asks for the text just before the caret and uses
//! [`detect_trigger`] to decide whether to show itself. Accepting a
//! suggestion is an ordinary text splice; see `EditorSession::accept_suggestion`.

use serde::Serialize;
use smol_str::SmolStr;

/// Default trigger characters: `@` for mentions, `/` for slash commands.
pub const DEFAULT_TRIGGERS: &[char] = &['@', '/'];

/// Longest query the popup will track before giving up.
pub const MAX_QUERY_CHARS: usize = 32;

/// An active trigger just before the caret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub trigger: char,
    /// Text typed after the trigger character.
    pub query: SmolStr,
    /// Chars from the trigger character to the caret, trigger included.
    pub span_len: usize,
}

/// Find a trigger whose query runs up to the end of `preceding`.
///
/// The trigger must open the text or follow whitespace, and the query must
/// not contain whitespace or exceed [`MAX_QUERY_CHARS`].
pub fn detect_trigger(preceding: &str, triggers: &[char]) -> Option<Trigger> {
    let mut query_len = 0;
    let mut query_bytes = 0;
    let mut chars = preceding.chars().rev().peekable();
    while let Some(c) = chars.next() {
        if triggers.contains(&c) {
            let opens_word = chars.peek().is_none_or(|prev| prev.is_whitespace());
            if !opens_word {
                return None;
            }
            return Some(Trigger {
                trigger: c,
                query: SmolStr::new(&preceding[preceding.len() - query_bytes..]),
                span_len: query_len + 1,
            });
        }
        if c.is_whitespace() || query_len >= MAX_QUERY_CHARS {
            return None;
        }
        query_len += 1;
        query_bytes += c.len_utf8();
    }
    None
}
