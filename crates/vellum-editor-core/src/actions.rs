//! Toolbar commands.
//!
//! The command layer hands the core a discrete action plus an optional value
//! (a colour, an image URL). The core does not interpret formatting commands:
//! they are forwarded to the view as opaque mutations and the resulting
//! change flows back through the ordinary local-edit capture path. Only undo
//! and redo are handled by the store itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Every action the toolbar can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditorCommand {
    // === Inline formatting ===
    Bold,
    Italic,
    Underline,
    Strikethrough,
    InlineCode,
    TextColor,
    Highlight,
    ClearFormatting,

    // === Block type ===
    ClearBlockType,
    Paragraph,
    #[serde(rename = "heading-1")]
    Heading1,
    #[serde(rename = "heading-2")]
    Heading2,
    #[serde(rename = "heading-3")]
    Heading3,
    #[serde(rename = "heading-4")]
    Heading4,
    #[serde(rename = "heading-5")]
    Heading5,
    #[serde(rename = "heading-6")]
    Heading6,
    BulletList,
    NumberedList,
    CodeBlock,
    Blockquote,

    // === Insertion ===
    HorizontalRule,
    HardBreak,
    InsertImage,
    InsertTable,

    // === Alignment ===
    AlignLeft,
    AlignCenter,
    AlignRight,

    // === History ===
    Undo,
    Redo,
}

impl EditorCommand {
    pub const ALL: [EditorCommand; 29] = [
        Self::Bold,
        Self::Italic,
        Self::Underline,
        Self::Strikethrough,
        Self::InlineCode,
        Self::TextColor,
        Self::Highlight,
        Self::ClearFormatting,
        Self::ClearBlockType,
        Self::Paragraph,
        Self::Heading1,
        Self::Heading2,
        Self::Heading3,
        Self::Heading4,
        Self::Heading5,
        Self::Heading6,
        Self::BulletList,
        Self::NumberedList,
        Self::CodeBlock,
        Self::Blockquote,
        Self::HorizontalRule,
        Self::HardBreak,
        Self::InsertImage,
        Self::InsertTable,
        Self::AlignLeft,
        Self::AlignCenter,
        Self::AlignRight,
        Self::Undo,
        Self::Redo,
    ];

    /// Kebab-case action identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::Strikethrough => "strikethrough",
            Self::InlineCode => "inline-code",
            Self::TextColor => "text-color",
            Self::Highlight => "highlight",
            Self::ClearFormatting => "clear-formatting",
            Self::ClearBlockType => "clear-block-type",
            Self::Paragraph => "paragraph",
            Self::Heading1 => "heading-1",
            Self::Heading2 => "heading-2",
            Self::Heading3 => "heading-3",
            Self::Heading4 => "heading-4",
            Self::Heading5 => "heading-5",
            Self::Heading6 => "heading-6",
            Self::BulletList => "bullet-list",
            Self::NumberedList => "numbered-list",
            Self::CodeBlock => "code-block",
            Self::Blockquote => "blockquote",
            Self::HorizontalRule => "horizontal-rule",
            Self::HardBreak => "hard-break",
            Self::InsertImage => "insert-image",
            Self::InsertTable => "insert-table",
            Self::AlignLeft => "align-left",
            Self::AlignCenter => "align-center",
            Self::AlignRight => "align-right",
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    /// History commands are applied to the store, not the view.
    pub fn is_history(self) -> bool {
        matches!(self, Self::Undo | Self::Redo)
    }

    /// Whether the command is meaningless without a value.
    pub fn requires_value(self) -> bool {
        matches!(self, Self::TextColor | Self::Highlight | Self::InsertImage)
    }

    /// Heading level for the heading commands.
    pub fn heading_level(self) -> Option<u8> {
        match self {
            Self::Heading1 => Some(1),
            Self::Heading2 => Some(2),
            Self::Heading3 => Some(3),
            Self::Heading4 => Some(4),
            Self::Heading5 => Some(5),
            Self::Heading6 => Some(6),
            _ => None,
        }
    }
}

impl fmt::Display for EditorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown editor command: {0}")]
pub struct UnknownCommand(pub SmolStr);

impl FromStr for EditorCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| UnknownCommand(SmolStr::new(s)))
    }
}

/// A command together with its optional value, as issued by the toolbar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: EditorCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SmolStr>,
}

impl CommandRequest {
    pub fn new(command: EditorCommand) -> Self {
        Self {
            command,
            value: None,
        }
    }

    pub fn with_value(command: EditorCommand, value: impl Into<SmolStr>) -> Self {
        Self {
            command,
            value: Some(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for cmd in EditorCommand::ALL {
            assert_eq!(cmd.as_str().parse::<EditorCommand>(), Ok(cmd));
        }
        assert_eq!("heading-3".parse(), Ok(EditorCommand::Heading3));
        assert!("heading-7".parse::<EditorCommand>().is_err());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for cmd in EditorCommand::ALL {
            let json = serde_json::to_string(&cmd).unwrap();
            assert_eq!(json, format!("\"{}\"", cmd.as_str()));
        }
        let req: CommandRequest =
            serde_json::from_str(r##"{"command":"text-color","value":"#ff0000"}"##).unwrap();
        assert_eq!(req, CommandRequest::with_value(EditorCommand::TextColor, "#ff0000"));
    }

    #[test]
    fn test_classification() {
        assert!(EditorCommand::Undo.is_history());
        assert!(!EditorCommand::Bold.is_history());
        assert!(EditorCommand::TextColor.requires_value());
        assert_eq!(EditorCommand::Heading6.heading_level(), Some(6));
        assert_eq!(EditorCommand::Paragraph.heading_level(), None);
    }
}
