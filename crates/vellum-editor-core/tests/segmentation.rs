// Segmentation properties over realistic documents.

use vellum_editor_core::segment::join_blocks;
use vellum_editor_core::{BlockKind, DocumentStats, HtmlTree, segment};

fn normalize(html: &str) -> String {
    HtmlTree::parse(html)
        .map(|tree| tree.to_html())
        .unwrap_or_else(|_| html.to_string())
}

#[test]
fn well_formed_documents_are_lossless() {
    let documents = [
        "<h1>Title</h1><p>Body <a href=\"/x\">link</a></p>",
        "<ol><li>one</li><li>two <em>three</em></li></ol><hr><p>after</p>",
        "<pre><code>let x = 1 &lt; 2;</code></pre><blockquote><p>q</p><p>r</p></blockquote>",
        "<table><tr><td>cell</td></tr></table><figure><img src=\"a.png\"></figure>",
        "<p>caf\u{e9} &amp; cr\u{e8}me\u{a0}br\u{fb}l\u{e9}e</p><h6>tiny</h6>",
    ];
    for doc in documents {
        let blocks = segment(doc);
        assert_eq!(join_blocks(&blocks), normalize(doc), "document {doc:?}");
    }
}

#[test]
fn wrappers_are_transparent() {
    let flat = "<h2>A</h2><p>b</p><ul><li>c</li></ul>";
    let wrapped = format!("<main><article><section>{flat}</section></article></main>");
    let kinds = |html: &str| segment(html).into_iter().map(|b| b.kind).collect::<Vec<_>>();
    assert_eq!(kinds(flat), kinds(&wrapped));
    assert_eq!(join_blocks(&segment(&wrapped)), flat);
}

#[test]
fn segmentation_is_deterministic() {
    let doc = "<h3>x</h3>loose <b>text</b><p>y</p><div><p>z</p></div>";
    let first = segment(doc);
    let second = segment(doc);
    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(|b| b.kind).collect::<Vec<_>>(),
        vec![
            BlockKind::Heading(3),
            BlockKind::Text,
            BlockKind::Text,
            BlockKind::Text
        ]
    );
}

#[test]
fn stats_follow_blocks() {
    let doc = "<h1>One two</h1><p>three</p><ul><li>four five</li></ul>";
    let stats = DocumentStats::from_content(doc);
    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.words, 5);
}
