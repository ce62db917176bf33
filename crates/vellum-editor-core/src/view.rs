//! The editable view abstraction.
//!
//! `EditableView` is the interface between the reconciler and whatever
//! actually displays the document (a browser content-editable region, a
//! native text widget). `ViewTree` is the in-memory implementation used by
//! non-browser hosts and tests: it keeps the rendered markup as an arena tree
//! and records every mutation so the host can feed it back to the reconciler,
//! echoes included, the way a mutation observer would.

use smol_str::SmolStr;

use crate::actions::EditorCommand;
use crate::cursor::{self, CaretPosition};
use crate::html::{Element, HtmlTree, NodeData, NodeId, ParseFault};

/// Error type for view operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("the view has no caret")]
    NoCaret,

    #[error("caret offset {offset} is past the end of the region ({len} chars)")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("no block element at the caret")]
    NoBlockAtCaret,

    #[error("command {0} is not supported by this view")]
    UnsupportedCommand(EditorCommand),

    #[error("command {0} requires a value")]
    MissingValue(EditorCommand),

    #[error("view content could not be parsed: {0}")]
    Parse(#[from] ParseFault),
}

/// A mutable, caret-bearing rendering of the document.
pub trait EditableView {
    /// Serialized markup of the whole region.
    fn content(&self) -> String;

    /// Replace the region's markup wholesale. The caret is lost.
    fn replace_content(&mut self, html: &str) -> Result<(), ViewError>;

    /// Caret offset in chars from the region start, if the view has a caret.
    fn caret_offset(&self) -> Option<usize>;

    /// Place the caret at a char offset from the region start.
    fn place_caret(&mut self, offset: usize) -> Result<(), ViewError>;

    /// Visible text of the region, markup stripped.
    fn text_content(&self) -> String;

    /// Apply a toolbar command at the caret.
    fn exec_command(
        &mut self,
        command: EditorCommand,
        value: Option<&str>,
    ) -> Result<(), ViewError>;
}

/// Who caused a view mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationSource {
    /// `replace_content`, i.e. the reconciler writing store content.
    Programmatic,
    /// Typing, splicing, toolbar commands.
    User,
}

/// A recorded view mutation, carrying the content after it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub source: MutationSource,
    pub content: String,
}

/// In-memory editable view backed by an arena tree.
#[derive(Debug, Clone)]
pub struct ViewTree {
    tree: HtmlTree,
    caret: Option<CaretPosition>,
    mutations: Vec<MutationRecord>,
}

impl Default for ViewTree {
    fn default() -> Self {
        Self {
            tree: HtmlTree::new(),
            caret: None,
            mutations: Vec::new(),
        }
    }
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view showing `html`, with no recorded mutations.
    pub fn with_content(html: &str) -> Result<Self, ViewError> {
        Ok(Self {
            tree: HtmlTree::parse(html)?,
            ..Self::default()
        })
    }

    pub fn tree(&self) -> &HtmlTree {
        &self.tree
    }

    pub fn caret(&self) -> Option<CaretPosition> {
        self.caret
    }

    /// Drop the caret, as when the region loses focus.
    pub fn blur(&mut self) {
        self.caret = None;
    }

    /// Take every mutation recorded since the last call, oldest first.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Type text at the caret, moving the caret past it.
    pub fn type_text(&mut self, text: &str) -> Result<(), ViewError> {
        let at = self.caret_offset().ok_or(ViewError::NoCaret)?;
        self.splice_text(at, 0, text)
    }

    /// Delete up to `count` chars before the caret.
    pub fn delete_backward(&mut self, count: usize) -> Result<(), ViewError> {
        let at = self.caret_offset().ok_or(ViewError::NoCaret)?;
        let count = count.min(at);
        self.splice_text(at - count, count, "")
    }

    /// Replace `delete` chars at text offset `start` with `insert`.
    ///
    /// Offsets are region text offsets, the same coordinates as the caret.
    /// The deleted span may cross text nodes; the inserted text lands in the
    /// node that holds `start`. The caret ends up after the inserted text.
    pub fn splice_text(
        &mut self,
        start: usize,
        delete: usize,
        insert: &str,
    ) -> Result<(), ViewError> {
        let len = cursor::text_len(&self.tree);
        if start > len {
            return Err(ViewError::OffsetOutOfRange { offset: start, len });
        }
        let end = start.saturating_add(delete).min(len);

        // Prefer the node the caret is actually in when it sits at `start`;
        // offsets on node boundaries are otherwise ambiguous.
        let anchor = self
            .caret
            .filter(|&caret| {
                caret.node != self.tree.root()
                    && cursor::offset_of(&self.tree, caret) == Some(start)
            })
            .unwrap_or_else(|| cursor::locate(&self.tree, start));
        let mut walked = 0;
        let edits: Vec<(NodeId, String)> = self
            .tree
            .text_nodes(self.tree.root())
            .filter_map(|(id, text)| {
                let node_len = text.chars().count();
                let node_start = walked;
                walked += node_len;

                let cut_from = start.max(node_start) - node_start;
                let cut_to = end.min(node_start + node_len).saturating_sub(node_start);
                let touched = cut_from < cut_to || id == anchor.node;
                if !touched {
                    return None;
                }

                let mut updated = String::with_capacity(text.len() + insert.len());
                let from = cursor::char_to_byte(text, cut_from.min(node_len));
                let to = cursor::char_to_byte(text, cut_to.max(cut_from).min(node_len));
                updated.push_str(&text[..from]);
                if id == anchor.node {
                    updated.push_str(insert);
                }
                updated.push_str(&text[to..]);
                Some((id, updated))
            })
            .collect();

        let landed_in_text = edits.iter().any(|(id, _)| *id == anchor.node);
        for (id, text) in edits {
            self.tree.set_text(id, text);
        }
        if !landed_in_text && !insert.is_empty() {
            // No text node to hold the insert (empty region): start one.
            let root = self.tree.root();
            self.tree.append(root, NodeData::Text(insert.to_string()));
        }

        let inserted = insert.chars().count();
        self.caret = Some(if landed_in_text {
            CaretPosition::new(anchor.node, anchor.offset + inserted)
        } else {
            cursor::locate(&self.tree, start + inserted)
        });
        self.record(MutationSource::User);
        Ok(())
    }

    fn record(&mut self, source: MutationSource) {
        self.mutations.push(MutationRecord {
            source,
            content: self.tree.to_html(),
        });
    }

    /// The top-level element holding the caret.
    fn block_at_caret(&self) -> Result<NodeId, ViewError> {
        let caret = self.caret.ok_or(ViewError::NoCaret)?;
        let block = if caret.node == self.tree.root() {
            self.tree
                .children(caret.node)
                .get(caret.offset)
                .or_else(|| self.tree.children(caret.node).last())
                .copied()
        } else {
            self.tree.top_level_ancestor(caret.node)
        };
        block
            .filter(|&id| self.tree.element(id).is_some())
            .ok_or(ViewError::NoBlockAtCaret)
    }

    fn set_block_tag(&mut self, tag: &str) -> Result<(), ViewError> {
        let block = self.block_at_caret()?;
        self.tree.rename(block, tag);
        Ok(())
    }

    fn insert_rule(&mut self) -> Result<(), ViewError> {
        let rule = NodeData::Element(Element::new("hr"));
        match self.block_at_caret() {
            Ok(block) => {
                self.tree.insert_after(block, rule);
            }
            Err(ViewError::NoCaret) | Err(ViewError::NoBlockAtCaret) => {
                let root = self.tree.root();
                self.tree.append(root, rule);
            }
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn insert_hard_break(&mut self) -> Result<(), ViewError> {
        let caret = self.caret.ok_or(ViewError::NoCaret)?;
        let text = match self.tree.data(caret.node) {
            NodeData::Text(text) => text.clone(),
            _ => return Err(ViewError::NoBlockAtCaret),
        };
        let split = cursor::char_to_byte(&text, caret.offset);
        let (before, after) = text.split_at(split);

        let br = self
            .tree
            .insert_after(caret.node, NodeData::Element(Element::new("br")))
            .ok_or(ViewError::NoBlockAtCaret)?;
        let tail = self
            .tree
            .insert_after(br, NodeData::Text(after.to_string()))
            .ok_or(ViewError::NoBlockAtCaret)?;
        self.tree.set_text(caret.node, before.to_string());
        self.caret = Some(CaretPosition::new(tail, 0));
        Ok(())
    }
}

impl EditableView for ViewTree {
    fn content(&self) -> String {
        self.tree.to_html()
    }

    fn replace_content(&mut self, html: &str) -> Result<(), ViewError> {
        self.tree = HtmlTree::parse(html)?;
        self.caret = None;
        self.record(MutationSource::Programmatic);
        Ok(())
    }

    fn caret_offset(&self) -> Option<usize> {
        self.caret
            .and_then(|caret| cursor::offset_of(&self.tree, caret))
    }

    fn place_caret(&mut self, offset: usize) -> Result<(), ViewError> {
        let len = cursor::text_len(&self.tree);
        if offset > len {
            return Err(ViewError::OffsetOutOfRange { offset, len });
        }
        self.caret = Some(cursor::locate(&self.tree, offset));
        Ok(())
    }

    fn text_content(&self) -> String {
        self.tree.text_content(self.tree.root())
    }

    fn exec_command(
        &mut self,
        command: EditorCommand,
        value: Option<&str>,
    ) -> Result<(), ViewError> {
        if command.requires_value() && value.is_none() {
            return Err(ViewError::MissingValue(command));
        }

        let heading: Option<SmolStr> = command
            .heading_level()
            .map(|level| smol_str::format_smolstr!("h{}", level));

        match command {
            EditorCommand::HorizontalRule => self.insert_rule()?,
            EditorCommand::HardBreak => self.insert_hard_break()?,
            EditorCommand::Paragraph | EditorCommand::ClearBlockType => {
                self.set_block_tag("p")?
            }
            EditorCommand::Blockquote => self.set_block_tag("blockquote")?,
            EditorCommand::CodeBlock => self.set_block_tag("pre")?,
            _ => match heading {
                Some(tag) => self.set_block_tag(&tag)?,
                None => return Err(ViewError::UnsupportedCommand(command)),
            },
        }

        tracing::trace!(target: "vellum::view", %command, "applied command");
        self.record(MutationSource::User);
        Ok(())
    }
}
