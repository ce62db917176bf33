//! Block segmentation for virtualized rendering.
//!
//! A content snapshot is split into an ordered list of [`Block`]s, each of
//! which can be rendered, measured and recycled on its own. Block identity is
//! positional (`b-{index}`) and only meaningful within one segmentation pass.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

use crate::html::{HtmlTree, NodeData, NodeId};

/// Coarse kind of a rendered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Heading(u8),
    List { ordered: bool },
    Code,
    Quote,
    Text,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Heading(level) => write!(f, "heading-{level}"),
            BlockKind::List { ordered: true } => f.write_str("numbered-list"),
            BlockKind::List { ordered: false } => f.write_str("bullet-list"),
            BlockKind::Code => f.write_str("code"),
            BlockKind::Quote => f.write_str("quote"),
            BlockKind::Text => f.write_str("text"),
        }
    }
}

/// How the segmenter treats an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Emitted as one block carrying its whole subtree.
    Block(BlockKind),
    /// Structural wrapper; flattened into its children.
    Container,
    /// Phrasing content; grouped with neighbouring text into a text block.
    Inline,
}

/// Classify an element by its (lowercased) tag name.
///
/// Arms are ordered by precedence: heading, list, code, quote, then the
/// structural and inline sets. Everything else is paragraph-like.
pub fn classify(tag: &str) -> NodeClass {
    match tag {
        "h1" => NodeClass::Block(BlockKind::Heading(1)),
        "h2" => NodeClass::Block(BlockKind::Heading(2)),
        "h3" => NodeClass::Block(BlockKind::Heading(3)),
        "h4" => NodeClass::Block(BlockKind::Heading(4)),
        "h5" => NodeClass::Block(BlockKind::Heading(5)),
        "h6" => NodeClass::Block(BlockKind::Heading(6)),
        "ul" | "menu" | "dl" => NodeClass::Block(BlockKind::List { ordered: false }),
        "ol" => NodeClass::Block(BlockKind::List { ordered: true }),
        "pre" => NodeClass::Block(BlockKind::Code),
        "blockquote" => NodeClass::Block(BlockKind::Quote),
        "div" | "section" | "article" | "main" | "header" | "footer" | "aside" | "nav"
        | "body" | "html" | "template" | "hgroup" | "search" | "center" => NodeClass::Container,
        "a" | "abbr" | "b" | "bdi" | "bdo" | "br" | "cite" | "code" | "data" | "del" | "dfn"
        | "em" | "font" | "i" | "img" | "ins" | "kbd" | "label" | "mark" | "q" | "s" | "samp"
        | "small" | "span" | "strike" | "strong" | "sub" | "sup" | "time" | "u" | "var"
        | "wbr" => NodeClass::Inline,
        _ => NodeClass::Block(BlockKind::Text),
    }
}

/// One independently renderable slice of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Positional id (`b-{index}`), stable only within one segmentation pass.
    pub id: SmolStr,
    pub index: usize,
    pub kind: BlockKind,
    /// Serialized markup for this block.
    pub html: String,
    /// Hash of `html` for cheap change detection.
    pub source_hash: u64,
    /// True when the segmenter wrapped loose inline content itself.
    pub synthesized: bool,
}

impl Block {
    fn new(index: usize, kind: BlockKind, html: String, synthesized: bool) -> Self {
        Self {
            id: make_block_id(index),
            index,
            kind,
            source_hash: hash_source(&html),
            html,
            synthesized,
        }
    }

    /// The placeholder rendered when a document has no content at all.
    pub fn placeholder() -> Self {
        Self::new(0, BlockKind::Text, String::new(), true)
    }

    pub fn is_placeholder(&self) -> bool {
        self.synthesized && self.html.is_empty()
    }
}

/// Simple hash function for source text comparison.
pub fn hash_source(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Generate a block ID from its position.
pub fn make_block_id(index: usize) -> SmolStr {
    format_smolstr!("b-{}", index)
}

/// Split a snapshot into blocks.
///
/// Never fails: unparseable input degrades to one opaque text block, and an
/// empty document yields a single placeholder.
pub fn segment(snapshot: &str) -> Vec<Block> {
    let tree = match HtmlTree::parse(snapshot) {
        Ok(tree) => tree,
        Err(fault) => {
            tracing::warn!(
                target: "vellum::segment",
                error = %fault,
                len = snapshot.len(),
                "segmentation recovery: treating snapshot as one opaque block"
            );
            return vec![Block::new(0, BlockKind::Text, snapshot.to_string(), true)];
        }
    };
    segment_tree(&tree)
}

/// Split an already parsed tree into blocks.
pub fn segment_tree(tree: &HtmlTree) -> Vec<Block> {
    let mut segmenter = Segmenter {
        tree,
        blocks: Vec::new(),
        run: String::new(),
        run_visible: false,
    };
    segmenter.visit_children(tree.root());
    segmenter.flush_run();

    if segmenter.blocks.is_empty() {
        segmenter.blocks.push(Block::placeholder());
    }

    tracing::trace!(
        target: "vellum::segment",
        blocks = segmenter.blocks.len(),
        nodes = tree.len(),
        "segmented snapshot"
    );
    segmenter.blocks
}

/// Concatenate block fragments back into one document.
pub fn join_blocks(blocks: &[Block]) -> String {
    blocks.iter().map(|b| b.html.as_str()).collect()
}

struct Segmenter<'a> {
    tree: &'a HtmlTree,
    blocks: Vec<Block>,
    /// Pending loose inline markup awaiting a synthesized text block.
    run: String,
    run_visible: bool,
}

impl Segmenter<'_> {
    fn visit_children(&mut self, parent: NodeId) {
        for &child in self.tree.children(parent) {
            match self.tree.data(child) {
                NodeData::Text(text) => {
                    if text.chars().any(|c| !c.is_whitespace()) {
                        self.run_visible = true;
                    }
                    self.run.push_str(&self.tree.outer_html(child));
                }
                NodeData::Comment(_) => self.run.push_str(&self.tree.outer_html(child)),
                NodeData::Element(el) => match classify(&el.name) {
                    NodeClass::Inline => {
                        if el.name == "img" || self.tree.has_visible_text(child) {
                            self.run_visible = true;
                        }
                        self.run.push_str(&self.tree.outer_html(child));
                    }
                    NodeClass::Container if self.has_block_children(child) => {
                        self.flush_run();
                        self.visit_children(child);
                        self.flush_run();
                    }
                    // A wrapper around phrasing content only is a paragraph.
                    NodeClass::Container => self.emit(BlockKind::Text, child),
                    NodeClass::Block(kind) => self.emit(kind, child),
                },
                NodeData::Document => self.visit_children(child),
            }
        }
    }

    fn has_block_children(&self, id: NodeId) -> bool {
        self.tree.children(id).iter().any(|&c| {
            self.tree
                .element(c)
                .is_some_and(|el| !matches!(classify(&el.name), NodeClass::Inline))
        })
    }

    fn emit(&mut self, kind: BlockKind, node: NodeId) {
        self.flush_run();
        let index = self.blocks.len();
        self.blocks
            .push(Block::new(index, kind, self.tree.outer_html(node), false));
    }

    fn flush_run(&mut self) {
        let run = std::mem::take(&mut self.run);
        if std::mem::take(&mut self.run_visible) {
            let index = self.blocks.len();
            self.blocks.push(Block::new(index, BlockKind::Text, run, true));
        }
    }
}

/// Caches the last segmentation so unchanged snapshots are not re-split.
#[derive(Debug, Clone, Default)]
pub struct BlockCache {
    source_hash: Option<u64>,
    blocks: Vec<Block>,
    passes: usize,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks for `snapshot`, re-segmenting only when it changed.
    pub fn blocks_for(&mut self, snapshot: &str) -> &[Block] {
        let hash = hash_source(snapshot);
        if self.source_hash != Some(hash) {
            self.blocks = segment(snapshot);
            self.source_hash = Some(hash);
            self.passes += 1;
        }
        &self.blocks
    }

    /// Blocks from the most recent pass (empty before the first one).
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// How many times segmentation actually ran.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn invalidate(&mut self) {
        self.source_hash = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(blocks: &[Block]) -> String {
        blocks
            .iter()
            .map(|b| format!("{} {} {}", b.id, b.kind, b.html))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_mixed_document() {
        let html = concat!(
            "<h1>Title</h1>",
            "<p>Intro <b>bold</b></p>",
            "<ul><li>one</li><li>two</li></ul>",
            "<ol><li>first</li></ol>",
            "<pre><code>fn main() {}</code></pre>",
            "<blockquote><p>quoted</p></blockquote>",
            "<h3>Sub</h3>",
        );
        let blocks = segment(html);
        insta::assert_snapshot!(describe(&blocks), @r"
        b-0 heading-1 <h1>Title</h1>
        b-1 text <p>Intro <b>bold</b></p>
        b-2 bullet-list <ul><li>one</li><li>two</li></ul>
        b-3 numbered-list <ol><li>first</li></ol>
        b-4 code <pre><code>fn main() {}</code></pre>
        b-5 quote <blockquote><p>quoted</p></blockquote>
        b-6 heading-3 <h3>Sub</h3>
        ");
        assert_eq!(join_blocks(&blocks), html);
    }

    #[test]
    fn test_nested_wrappers_flatten() {
        let html = "<div><section><div><h2>A</h2><p>b</p></div></section><p>c</p></div>";
        let blocks = segment(html);
        insta::assert_snapshot!(describe(&blocks), @r"
        b-0 heading-2 <h2>A</h2>
        b-1 text <p>b</p>
        b-2 text <p>c</p>
        ");
    }

    #[test]
    fn test_loose_text_is_wrapped() {
        let blocks = segment("hello <em>there</em><p>para</p>tail");
        insta::assert_snapshot!(describe(&blocks), @r"
        b-0 text hello <em>there</em>
        b-1 text <p>para</p>
        b-2 text tail
        ");
        assert!(blocks[0].synthesized);
        assert!(!blocks[1].synthesized);
    }

    #[test]
    fn test_whitespace_between_blocks_is_dropped() {
        let blocks = segment("<p>a</p>\n  \n<p>b</p>\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(join_blocks(&blocks), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_inline_only_container_is_one_block() {
        let blocks = segment("<div>line <b>one</b></div><div><br></div>");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Text);
        assert_eq!(blocks[0].html, "<div>line <b>one</b></div>");
        assert_eq!(blocks[1].html, "<div><br></div>");
    }

    #[test]
    fn test_empty_input_yields_placeholder() {
        for input in ["", "   \n", "<!-- only a comment -->"] {
            let blocks = segment(input);
            assert_eq!(blocks.len(), 1, "input {input:?}");
            assert!(blocks[0].is_placeholder());
            assert_eq!(blocks[0].id, "b-0");
        }
    }

    #[test]
    fn test_truncated_markup_does_not_fail() {
        let blocks = segment("<h2>Heading<p>body text<ul><li>item");
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(2),
                BlockKind::Text,
                BlockKind::List { ordered: false }
            ]
        );
    }

    #[test]
    fn test_nesting_fault_falls_back_to_opaque_block() {
        let deep = format!("{}x", "<div>".repeat(crate::html::MAX_DEPTH + 10));
        let blocks = segment(&deep);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].html, deep);
        assert_eq!(blocks[0].kind, BlockKind::Text);
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(classify("h4"), NodeClass::Block(BlockKind::Heading(4)));
        assert_eq!(classify("ol"), NodeClass::Block(BlockKind::List { ordered: true }));
        assert_eq!(classify("pre"), NodeClass::Block(BlockKind::Code));
        assert_eq!(classify("blockquote"), NodeClass::Block(BlockKind::Quote));
        assert_eq!(classify("table"), NodeClass::Block(BlockKind::Text));
        assert_eq!(classify("hr"), NodeClass::Block(BlockKind::Text));
        assert_eq!(classify("section"), NodeClass::Container);
        assert_eq!(classify("code"), NodeClass::Inline);
    }

    #[test]
    fn test_block_ids_follow_order() {
        let blocks = segment("<p>a</p><p>b</p><p>c</p>");
        let ids: Vec<_> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b-0", "b-1", "b-2"]);
        assert_ne!(blocks[0].source_hash, blocks[1].source_hash);
    }

    #[test]
    fn test_block_cache_skips_unchanged() {
        let mut cache = BlockCache::new();
        assert_eq!(cache.blocks_for("<p>a</p>").len(), 1);
        assert_eq!(cache.blocks_for("<p>a</p>").len(), 1);
        assert_eq!(cache.passes(), 1);

        assert_eq!(cache.blocks_for("<p>a</p><p>b</p>").len(), 2);
        assert_eq!(cache.passes(), 2);

        cache.invalidate();
        cache.blocks_for("<p>a</p><p>b</p>");
        assert_eq!(cache.passes(), 3);
    }
}
