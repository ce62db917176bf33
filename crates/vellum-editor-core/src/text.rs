//! Content storage abstraction and text-level diffing.
//!
//! The `ContentStore` trait is the reconciler's view of the canonical
//! document: anything that can hand back a serialized snapshot and accept a
//! replacement. The collaborative Loro store implements it in
//! `vellum-editor-crdt`.

use std::ops::Range;

use smol_str::{SmolStr, ToSmolStr};

/// Canonical document content, as seen by the reconciler.
///
/// All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
pub trait ContentStore {
    /// Current serialized content.
    fn content(&self) -> String;

    /// Replace the logical content. Returns false when nothing changed.
    fn set_content(&mut self, content: &str) -> bool;

    /// Total length in chars.
    fn len_chars(&self) -> usize {
        self.content().chars().count()
    }

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }
}

/// The single contiguous change that turns one string into another.
///
/// Found by trimming the common prefix and common suffix; whatever remains in
/// the middle is one delete followed by one insert at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Char offset where old and new first differ.
    pub start: usize,
    /// Chars removed from the old text at `start`.
    pub deleted: usize,
    /// Text inserted at `start`.
    pub inserted: SmolStr,
}

impl TextEdit {
    /// Diff `old` against `new`. `None` when they are equal.
    pub fn between(old: &str, new: &str) -> Option<Self> {
        if old == new {
            return None;
        }

        let prefix_bytes: usize = old
            .chars()
            .zip(new.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        let old_tail = &old[prefix_bytes..];
        let new_tail = &new[prefix_bytes..];

        // Bounded by the tails so prefix and suffix never overlap.
        let suffix_bytes: usize = old_tail
            .chars()
            .rev()
            .zip(new_tail.chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();

        let removed = &old_tail[..old_tail.len() - suffix_bytes];
        let inserted = &new_tail[..new_tail.len() - suffix_bytes];

        Some(Self {
            start: old[..prefix_bytes].chars().count(),
            deleted: removed.chars().count(),
            inserted: inserted.to_smolstr(),
        })
    }

    pub fn inserted_len(&self) -> usize {
        self.inserted.chars().count()
    }

    /// Char range in the old text that this edit removes.
    pub fn deleted_range(&self) -> Range<usize> {
        self.start..self.start + self.deleted
    }

    /// Map an offset in the old text to the matching offset in the new text.
    ///
    /// Edits at or after the offset leave it alone. Edits wholly before it
    /// shift it by the net length change. A deletion that spans it collapses
    /// it to the deletion start.
    pub fn transform_offset(&self, offset: usize) -> usize {
        if offset <= self.start {
            offset
        } else if offset >= self.start + self.deleted {
            offset - self.deleted + self.inserted_len()
        } else {
            self.start
        }
    }

    /// Apply this edit to `text`. Offsets past the end are clamped.
    pub fn apply(&self, text: &str) -> String {
        let len = text.chars().count();
        let start = self.start.min(len);
        let end = start.saturating_add(self.deleted).min(len);
        let mut out = String::with_capacity(text.len() + self.inserted.len());
        out.extend(text.chars().take(start));
        out.push_str(&self.inserted);
        out.extend(text.chars().skip(end));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_equal_is_none() {
        assert_eq!(TextEdit::between("abc", "abc"), None);
        assert_eq!(TextEdit::between("", ""), None);
    }

    #[test]
    fn test_diff_middle_replacement() {
        let edit = TextEdit::between("<p>hello world</p>", "<p>hello rust</p>").unwrap();
        assert_eq!(edit.start, 9);
        assert_eq!(edit.deleted, 5);
        assert_eq!(edit.inserted, "rust");
    }

    #[test]
    fn test_diff_repeated_chars_do_not_overlap() {
        // "aaa" -> "aa": prefix would eat two chars, suffix must not re-use them.
        let edit = TextEdit::between("aaa", "aa").unwrap();
        assert_eq!(edit.start, 2);
        assert_eq!(edit.deleted, 1);
        assert_eq!(edit.inserted, "");
    }

    #[test]
    fn test_diff_counts_chars_not_bytes() {
        let edit = TextEdit::between("héllo 🌍!", "héllo 🌍 there!").unwrap();
        assert_eq!(edit.start, 7);
        assert_eq!(edit.deleted, 0);
        assert_eq!(edit.inserted, " there");
    }

    #[test]
    fn test_transform_offset() {
        // Insert at the caret keeps it.
        let at = TextEdit::between("abcdef", "abcXdef").unwrap();
        assert_eq!(at.transform_offset(3), 3);
        // Insert before the caret shifts it.
        let before = TextEdit::between("abcdef", "XXabcdef").unwrap();
        assert_eq!(before.transform_offset(3), 5);
        // Deletion spanning the caret collapses to its start.
        let spanning = TextEdit::between("abcdef", "af").unwrap();
        assert_eq!(spanning.transform_offset(3), 1);
        // Deletion before the caret pulls it back.
        assert_eq!(spanning.transform_offset(6), 2);
    }

    #[test]
    fn test_apply_replays_diff() {
        let edit = TextEdit::between("<p>hello world</p>", "<p>hello rust</p>").unwrap();
        assert_eq!(edit.apply("<p>hello world</p>"), "<p>hello rust</p>");
        // Out of range offsets clamp to the end.
        let tail = TextEdit {
            start: 40,
            deleted: usize::MAX,
            inserted: "!".into(),
        };
        assert_eq!(tail.apply("héllo"), "héllo!");
    }
}
