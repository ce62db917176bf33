//! Read-only document statistics for preview and status displays.

use serde::Serialize;

use crate::html::HtmlTree;
use crate::segment::{self, Block};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    /// Visible chars, markup excluded.
    pub chars: usize,
    pub words: usize,
    pub blocks: usize,
}

impl DocumentStats {
    /// Compute stats from a serialized snapshot.
    pub fn from_content(content: &str) -> Self {
        Self::from_blocks(&segment::segment(content))
    }

    /// Compute stats when the blocks are already at hand.
    ///
    /// Words are counted per block so adjacent blocks never run together.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        blocks
            .iter()
            .filter(|b| !b.is_placeholder())
            .fold(Self::default(), |mut acc, block| {
                let text = match HtmlTree::parse(&block.html) {
                    Ok(tree) => tree.text_content(tree.root()),
                    Err(_) => block.html.clone(),
                };
                acc.chars += text.chars().count();
                acc.words += text.split_whitespace().count();
                acc.blocks += 1;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let stats = DocumentStats::from_content("<h1>Big title</h1><p>one two <b>three</b></p>");
        assert_eq!(
            stats,
            DocumentStats {
                chars: 22,
                words: 5,
                blocks: 2
            }
        );
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(DocumentStats::from_content(""), DocumentStats::default());
    }

    #[test]
    fn test_entities_count_once() {
        let stats = DocumentStats::from_content("<p>a &amp; b</p>");
        assert_eq!(stats.chars, 5);
        assert_eq!(stats.words, 3);
    }
}
