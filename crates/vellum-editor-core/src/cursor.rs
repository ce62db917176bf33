//! Caret offsets over an arena tree.
//!
//! A caret offset is a char count from the start of the editable region to
//! the caret, measured over text nodes in document order. Markup contributes
//! nothing to the count.

use crate::html::{HtmlTree, NodeId};

/// A caret position inside the tree: a node plus a char offset within it.
///
/// For text nodes `offset` counts chars into the text. For any other node it
/// is a child index, as with a DOM range boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretPosition {
    pub node: NodeId,
    pub offset: usize,
}

impl CaretPosition {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }

    /// The start of the region.
    pub fn region_start(tree: &HtmlTree) -> Self {
        Self::new(tree.root(), 0)
    }
}

/// Total caret-addressable length of the region.
pub fn text_len(tree: &HtmlTree) -> usize {
    tree.text_nodes(tree.root())
        .map(|(_, text)| text.chars().count())
        .sum()
}

/// Flatten a caret position into a region offset.
///
/// Returns `None` if the position's node is not a text node in the tree
/// and is not a boundary of the root.
pub fn offset_of(tree: &HtmlTree, caret: CaretPosition) -> Option<usize> {
    if caret.node == tree.root() {
        // Child-index boundary on the root: count text in preceding children.
        let preceding = tree.children(tree.root()).get(..caret.offset)?;
        let before = preceding
            .iter()
            .flat_map(|&child| tree.text_nodes(child))
            .map(|(_, text)| text.chars().count())
            .sum();
        return Some(before);
    }

    let mut walked = 0;
    for (id, text) in tree.text_nodes(tree.root()) {
        let len = text.chars().count();
        if id == caret.node {
            return Some(walked + caret.offset.min(len));
        }
        walked += len;
    }
    None
}

/// Resolve a region offset to a caret position, walking text nodes in order.
///
/// An offset on the boundary between two text nodes lands at the end of the
/// earlier one. Offsets past the end clamp to the end of the last text node.
/// A region with no text places the caret at the region start.
pub fn locate(tree: &HtmlTree, offset: usize) -> CaretPosition {
    let mut walked = 0;
    let mut last = None;
    for (id, text) in tree.text_nodes(tree.root()) {
        let len = text.chars().count();
        if offset <= walked + len {
            return CaretPosition::new(id, offset - walked);
        }
        walked += len;
        last = Some(CaretPosition::new(id, len));
    }

    if let Some(end) = last {
        tracing::trace!(
            target: "vellum::cursor",
            offset,
            text_len = walked,
            "caret offset past end of region, clamping"
        );
        return end;
    }
    CaretPosition::region_start(tree)
}

/// Convert a char offset within a string to a byte index.
pub(crate) fn char_to_byte(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}
