//! Lenient HTML parsing into an index-addressed node arena.
//!
//! The tree is built once per snapshot and treated as immutable by readers:
//! nodes refer to each other through `NodeId` indices, never pointers, so a
//! walk over one snapshot cannot observe a half-applied mutation.
//!
//! Parsing follows the forgiving spirit of browser parsing without the full
//! HTML5 state machine: unclosed elements close at end of input, stray end
//! tags are dropped, `<p>` and `<li>` close implicitly, void elements never
//! take children and `script`/`style`/`textarea`/`title` hold raw text. The
//! only failure is nesting beyond [`MAX_DEPTH`], which the segmenter turns
//! into a single opaque block.

use smol_str::SmolStr;
use thiserror::Error;

/// Deepest element nesting the parser accepts.
pub const MAX_DEPTH: usize = 512;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Start tags that implicitly close an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "details",
    "div",
    "dl",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "ul",
];

/// Parser failure. Only pathological input produces one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFault {
    #[error("element nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },
}

/// Index of a node inside an [`HtmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: SmolStr,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: SmolStr,
    pub attrs: Vec<Attribute>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name.to_ascii_lowercase()),
            attrs: Vec::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn is_raw_text(&self) -> bool {
        RAW_TEXT_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(Element),
    /// Decoded text (character references already resolved).
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed HTML tree. Node 0 is always the document root.
#[derive(Debug, Clone)]
pub struct HtmlTree {
    nodes: Vec<Node>,
}

impl Default for HtmlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlTree {
    /// An empty document.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse markup leniently.
    pub fn parse(input: &str) -> Result<Self, ParseFault> {
        TreeBuilder::new(input).run()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id) {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Pre-order walk of `id` and everything beneath it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    /// Text nodes beneath `id` in document order.
    pub fn text_nodes(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &str)> + '_ {
        self.descendants(id).filter_map(|n| match self.data(n) {
            NodeData::Text(t) => Some((n, t.as_str())),
            _ => None,
        })
    }

    /// Concatenated text of every text node beneath `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.text_nodes(id).map(|(_, t)| t).collect()
    }

    /// Whether `id` has any non-whitespace text beneath it.
    pub fn has_visible_text(&self, id: NodeId) -> bool {
        self.text_nodes(id)
            .any(|(_, t)| t.chars().any(|c| !c.is_whitespace()))
    }

    /// Serialize `id` including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    // === Mutation, used on owned copies by the in-memory view ===

    /// Append a new node under `parent`, returning its id.
    pub fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Insert a new node as the sibling immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, data: NodeData) -> Option<NodeId> {
        let parent = self.parent(anchor)?;
        let pos = self.children(parent).iter().position(|&c| c == anchor)?;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.insert(pos + 1, id);
        Some(id)
    }

    /// Replace the text of a text node. No-op for other node kinds.
    pub fn set_text(&mut self, id: NodeId, text: String) {
        if let NodeData::Text(t) = &mut self.nodes[id.index()].data {
            *t = text;
        }
    }

    /// Change an element's tag name, keeping attributes and children.
    pub fn rename(&mut self, id: NodeId, name: &str) {
        if let NodeData::Element(el) = &mut self.nodes[id.index()].data {
            el.name = SmolStr::new(name.to_ascii_lowercase());
        }
    }

    /// Nearest ancestor-or-self of `id` that is a direct child of the root.
    pub fn top_level_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root() {
                return Some(current);
            }
            current = parent;
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            NodeData::Document => {
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
            }
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        out.push_str("=\"");
                        escape_into(value, out, true);
                        out.push('"');
                    }
                }
                out.push('>');
                if el.is_void() {
                    return;
                }
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
            NodeData::Text(text) => {
                let raw = self
                    .parent(id)
                    .and_then(|p| self.element(p))
                    .is_some_and(Element::is_raw_text);
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, out, false);
                }
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
    }
}

/// Pre-order iterator returned by [`HtmlTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a HtmlTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

fn escape_into(text: &str, out: &mut String, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

/// Resolve character references. Unknown or malformed references stay literal.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[1..].find(';').map(|i| i + 1).filter(|&i| i <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let name = &rest[1..semi];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct TreeBuilder<'a> {
    input: &'a str,
    pos: usize,
    tree: HtmlTree,
    open: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str) -> Self {
        let tree = HtmlTree::new();
        let root = tree.root();
        Self {
            input,
            pos: 0,
            tree,
            open: vec![root],
        }
    }

    fn run(mut self) -> Result<HtmlTree, ParseFault> {
        let input = self.input;
        while self.pos < input.len() {
            let rest = &input[self.pos..];
            if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                // Doctype and processing instructions carry no content.
                self.skip_past('>');
            } else if rest.starts_with("</") && starts_with_alpha(&rest[2..]) {
                self.end_tag();
            } else if rest.starts_with('<') && starts_with_alpha(&rest[1..]) {
                self.start_tag()?;
            } else {
                self.text();
            }
        }
        Ok(self.tree)
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.tree.root())
    }

    fn skip_past(&mut self, delim: char) {
        match self.input[self.pos..].find(delim) {
            Some(i) => self.pos += i + delim.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn comment(&mut self) {
        let input = self.input;
        let body_start = self.pos + 4;
        let (body, next) = match input[body_start..].find("-->") {
            Some(i) => (&input[body_start..body_start + i], body_start + i + 3),
            None => (&input[body_start..], input.len()),
        };
        let parent = self.current();
        self.tree
            .append(parent, NodeData::Comment(body.to_string()));
        self.pos = next;
    }

    fn text(&mut self) {
        // A '<' that did not open a construct is literal text.
        let start = self.pos;
        let skip = usize::from(self.input[start..].starts_with('<'));
        let end = self.input[start + skip..]
            .find('<')
            .map(|i| start + skip + i)
            .unwrap_or(self.input.len());
        let decoded = decode_entities(&self.input[start..end]);
        self.push_text(decoded);
        self.pos = end;
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(&last) = self.tree.children(parent).last() {
            if let NodeData::Text(existing) = &mut self.tree.nodes[last.index()].data {
                existing.push_str(&text);
                return;
            }
        }
        self.tree.append(parent, NodeData::Text(text));
    }

    fn read_name(&mut self) -> &'a str {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn end_tag(&mut self) {
        self.pos += 2;
        let name = self.read_name().to_ascii_lowercase();
        self.skip_past('>');
        if let Some(depth) = self
            .open
            .iter()
            .rposition(|&id| self.tree.element(id).is_some_and(|el| el.name == name))
        {
            self.open.truncate(depth);
        } else {
            tracing::trace!(target: "vellum::html", tag = %name, "dropping stray end tag");
        }
    }

    fn start_tag(&mut self) -> Result<(), ParseFault> {
        self.pos += 1;
        let mut element = Element::new(self.read_name());
        let mut self_closing = false;
        let mut terminated = false;

        let input = self.input;
        while self.pos < input.len() {
            self.skip_whitespace();
            let rest = &input[self.pos..];
            if rest.starts_with('>') {
                self.pos += 1;
                terminated = true;
                break;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                terminated = true;
                break;
            }
            if rest.starts_with(|c| matches!(c, '/' | '=' | '"' | '\'')) {
                self.pos += 1;
                continue;
            }
            if let Some(attr) = self.attribute() {
                if element.attr(&attr.name).is_none() {
                    element.attrs.push(attr);
                }
            }
        }

        if !terminated {
            // End of input inside a tag: the partial tag is discarded.
            return Ok(());
        }

        self.close_implied(&element.name);
        let parent = self.current();
        let is_void = element.is_void();
        let is_raw = element.is_raw_text();
        let name = element.name.clone();
        let id = self.tree.append(parent, NodeData::Element(element));

        if is_void || self_closing {
            return Ok(());
        }

        if self.open.len() > MAX_DEPTH {
            return Err(ParseFault::NestingTooDeep { max: MAX_DEPTH });
        }
        self.open.push(id);

        if is_raw {
            self.raw_text(id, &name);
        }
        Ok(())
    }

    fn attribute(&mut self) -> Option<Attribute> {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| c.is_ascii_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        let name = SmolStr::new(rest[..len].to_ascii_lowercase());
        self.pos += len;
        self.skip_whitespace();

        if !self.input[self.pos..].starts_with('=') {
            return Some(Attribute { name, value: None });
        }
        self.pos += 1;
        self.skip_whitespace();

        let rest = &input[self.pos..];
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                match body.find(quote) {
                    Some(end) => {
                        self.pos += end + 2;
                        &body[..end]
                    }
                    None => {
                        self.pos = input.len();
                        body
                    }
                }
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += end;
                &rest[..end]
            }
        };
        Some(Attribute {
            name,
            value: Some(decode_entities(value)),
        })
    }

    fn raw_text(&mut self, id: NodeId, name: &str) {
        let input = self.input;
        let rest = &input[self.pos..];
        let closing = format!("</{name}");
        let end = find_ascii_case_insensitive(rest, &closing).unwrap_or(rest.len());
        if end > 0 {
            self.tree
                .append(id, NodeData::Text(rest[..end].to_string()));
        }
        self.pos += end;
    }

    /// Apply the implicit end tags that a new start tag triggers.
    fn close_implied(&mut self, name: &str) {
        if CLOSES_PARAGRAPH.contains(&name) {
            self.close_nearest("p", &[]);
        }
        match name {
            "li" => self.close_nearest("li", &["ul", "ol"]),
            "dt" | "dd" => {
                self.close_nearest("dt", &["dl"]);
                self.close_nearest("dd", &["dl"]);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if let Some(top) = self.current_name() {
                    if is_heading(&top) {
                        self.open.pop();
                    }
                }
            }
            _ => {}
        }
    }

    /// Close the nearest open `target`, unless a `boundary` element is closer.
    fn close_nearest(&mut self, target: &str, boundary: &[&str]) {
        for depth in (1..self.open.len()).rev() {
            let Some(el) = self.tree.element(self.open[depth]) else {
                continue;
            };
            if el.name == target {
                self.open.truncate(depth);
                return;
            }
            if boundary.contains(&el.name.as_str()) {
                return;
            }
        }
    }

    fn current_name(&self) -> Option<SmolStr> {
        self.tree.element(self.current()).map(|el| el.name.clone())
    }
}

fn starts_with_alpha(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_alphabetic)
}

pub(crate) fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &str) -> String {
        HtmlTree::parse(input).unwrap().to_html()
    }

    #[test]
    fn test_well_formed_roundtrip() {
        let html = r#"<h1>Title</h1><p class="lead">Hello <b>world</b></p><ul><li>a</li><li>b</li></ul>"#;
        assert_eq!(roundtrip(html), html);
    }

    #[test]
    fn test_unclosed_tags_close_at_end() {
        assert_eq!(roundtrip("<p>open <em>still"), "<p>open <em>still</em></p>");
    }

    #[test]
    fn test_stray_end_tag_dropped() {
        assert_eq!(roundtrip("<p>a</span>b</p>"), "<p>ab</p>");
    }

    #[test]
    fn test_implicit_paragraph_close() {
        assert_eq!(roundtrip("<p>one<p>two"), "<p>one</p><p>two</p>");
        assert_eq!(roundtrip("<p>one<ul><li>x</ul>"), "<p>one</p><ul><li>x</li></ul>");
    }

    #[test]
    fn test_implicit_list_item_close() {
        assert_eq!(
            roundtrip("<ul><li>a<li>b<ul><li>c</ul></ul>"),
            "<ul><li>a</li><li>b<ul><li>c</li></ul></li></ul>"
        );
    }

    #[test]
    fn test_void_elements() {
        assert_eq!(roundtrip("<p>a<br>b<img src=x.png></p>"), r#"<p>a<br>b<img src="x.png"></p>"#);
        assert_eq!(roundtrip("<hr/>"), "<hr>");
    }

    #[test]
    fn test_truncated_tag_is_dropped() {
        assert_eq!(roundtrip("<p>text</p><di"), "<p>text</p>");
        assert_eq!(roundtrip("<p>text<a href=\"x"), "<p>text</p>");
    }

    #[test]
    fn test_literal_less_than() {
        assert_eq!(roundtrip("a < b"), "a &lt; b");
        assert_eq!(roundtrip("1 <2"), "1 &lt;2");
    }

    #[test]
    fn test_entities_decoded_in_text() {
        let tree = HtmlTree::parse("<p>fish &amp; chips&nbsp;&#x41;&#66;&bogus;</p>").unwrap();
        assert_eq!(tree.text_content(tree.root()), "fish & chips\u{a0}AB&bogus;");
        assert_eq!(tree.to_html(), "<p>fish &amp; chips&nbsp;AB&amp;bogus;</p>");
    }

    #[test]
    fn test_raw_text_elements() {
        let html = "<script>if (a < b) { x(); }</script><p>ok</p>";
        assert_eq!(roundtrip(html), html);
    }

    #[test]
    fn test_comments_and_doctype() {
        assert_eq!(roundtrip("<!DOCTYPE html><!-- note --><p>x</p>"), "<!-- note --><p>x</p>");
    }

    #[test]
    fn test_uppercase_tags_lowercased() {
        assert_eq!(roundtrip("<P>x</P>"), "<p>x</p>");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = "<div>".repeat(MAX_DEPTH + 2);
        assert_eq!(
            HtmlTree::parse(&deep).unwrap_err(),
            ParseFault::NestingTooDeep { max: MAX_DEPTH }
        );
    }

    #[test]
    fn test_descendants_preorder() {
        let tree = HtmlTree::parse("<p>a<b>b</b>c</p>").unwrap();
        let texts: Vec<_> = tree.text_nodes(tree.root()).map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_after_and_rename() {
        let mut tree = HtmlTree::parse("<p>a</p><p>b</p>").unwrap();
        let first = tree.children(tree.root())[0];
        tree.rename(first, "h2");
        tree.insert_after(first, NodeData::Element(Element::new("hr")));
        assert_eq!(tree.to_html(), "<h2>a</h2><hr><p>b</p>");
    }
}
