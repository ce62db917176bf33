//! Editor configuration, stored as KDL.
//!
//! ```kdl
//! virtualization {
//!     enabled true
//!     overscan 5
//!     estimate-size 50.0
//!     viewport-height 600.0
//! }
//! suggestion-triggers "@" "/"
//! ```
//!
//! Every node is optional; anything absent keeps its default.

use std::path::Path;

use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use vellum_common::{ConfigError, VellumError};
use vellum_editor_core::VirtualizerOptions;
use vellum_editor_core::suggest::DEFAULT_TRIGGERS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VirtualizationConfig {
    pub enabled: bool,
    pub overscan: usize,
    pub estimate_size: f64,
    pub viewport_height: f64,
}

impl Default for VirtualizationConfig {
    fn default() -> Self {
        let defaults = VirtualizerOptions::default();
        Self {
            enabled: defaults.enabled,
            overscan: defaults.overscan,
            estimate_size: defaults.estimate_size,
            viewport_height: 600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EditorConfig {
    pub virtualization: VirtualizationConfig,
    pub suggestion_triggers: Vec<char>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            virtualization: VirtualizationConfig::default(),
            suggestion_triggers: DEFAULT_TRIGGERS.to_vec(),
        }
    }
}

impl EditorConfig {
    /// Load from a KDL file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, VellumError> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self::from_kdl(&path.display().to_string(), &source)?)
    }

    /// Parse a KDL document. `name` labels the source in diagnostics.
    pub fn from_kdl(name: &str, source: &str) -> Result<Self, ConfigError> {
        let doc: KdlDocument = source.parse().map_err(|err: kdl::KdlError| {
            ConfigError::new(name, source, err.to_string(), err.span.offset(), err.span.len())
                .with_advice("check the KDL syntax around the highlighted span")
        })?;
        let reader = Reader { name, source };

        let mut config = Self::default();
        for node in doc.nodes() {
            match node.name().value() {
                "virtualization" => {
                    config.virtualization = reader.virtualization(node)?;
                }
                "suggestion-triggers" => {
                    config.suggestion_triggers = reader.triggers(node)?;
                }
                other => tracing::warn!(node = other, "ignoring unknown config node"),
            }
        }
        Ok(config)
    }

    /// Serialize back to KDL, in the format `from_kdl` reads.
    pub fn to_kdl(&self) -> String {
        let v = &self.virtualization;
        let triggers: Vec<String> = self
            .suggestion_triggers
            .iter()
            .map(|c| format!("{:?}", c.to_string()))
            .collect();
        format!(
            "virtualization {{\n    enabled {}\n    overscan {}\n    estimate-size {:?}\n    viewport-height {:?}\n}}\nsuggestion-triggers {}\n",
            v.enabled,
            v.overscan,
            v.estimate_size,
            v.viewport_height,
            triggers.join(" ")
        )
    }

    /// Windowing options for a document of `count` blocks.
    pub fn virtualizer_options(&self, count: usize) -> VirtualizerOptions {
        VirtualizerOptions {
            count,
            estimate_size: self.virtualization.estimate_size,
            overscan: self.virtualization.overscan,
            enabled: self.virtualization.enabled,
            ..VirtualizerOptions::default()
        }
    }
}

struct Reader<'a> {
    name: &'a str,
    source: &'a str,
}

impl Reader<'_> {
    fn error(&self, node: &KdlNode, message: impl Into<String>) -> ConfigError {
        let span = node.span();
        ConfigError::new(self.name, self.source, message, span.offset(), span.len())
    }

    fn first_value<'n>(&self, node: &'n KdlNode) -> Result<&'n KdlValue, ConfigError> {
        node.entries()
            .first()
            .map(|entry| entry.value())
            .ok_or_else(|| self.error(node, format!("`{}` needs a value", node.name().value())))
    }

    fn virtualization(&self, node: &KdlNode) -> Result<VirtualizationConfig, ConfigError> {
        let mut config = VirtualizationConfig::default();
        let Some(children) = node.children() else {
            return Ok(config);
        };

        for child in children.nodes() {
            let key = child.name().value();
            let value = self.first_value(child)?;
            match key {
                "enabled" => {
                    config.enabled = value
                        .as_bool()
                        .ok_or_else(|| self.error(child, "`enabled` must be true or false"))?;
                }
                "overscan" => {
                    config.overscan = value
                        .as_i64()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| {
                            self.error(child, "`overscan` must be a non-negative integer")
                        })?;
                }
                "estimate-size" | "viewport-height" => {
                    let size = number(value)
                        .filter(|n| *n > 0.0)
                        .ok_or_else(|| self.error(child, format!("`{key}` must be a positive number")))?;
                    if key == "estimate-size" {
                        config.estimate_size = size;
                    } else {
                        config.viewport_height = size;
                    }
                }
                other => tracing::warn!(node = other, "ignoring unknown virtualization setting"),
            }
        }
        Ok(config)
    }

    fn triggers(&self, node: &KdlNode) -> Result<Vec<char>, ConfigError> {
        node.entries()
            .iter()
            .map(|entry| {
                let mut chars = entry.value().as_string().unwrap_or_default().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(self
                        .error(node, "each suggestion trigger must be a one-character string")
                        .with_advice("for example: suggestion-triggers \"@\" \"/\"")),
                }
            })
            .collect()
    }
}

fn number(value: &KdlValue) -> Option<f64> {
    value.as_f64().or_else(|| value.as_i64().map(|n| n as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EditorConfig::from_kdl("t.kdl", "").unwrap(), EditorConfig::default());
    }

    #[test]
    fn test_full_document() {
        let source = r##"
virtualization {
    enabled false
    overscan 8
    estimate-size 32
    viewport-height 900.5
}
suggestion-triggers "@" "#" "/"
"##;
        let config = EditorConfig::from_kdl("t.kdl", source).unwrap();
        assert!(!config.virtualization.enabled);
        assert_eq!(config.virtualization.overscan, 8);
        assert_eq!(config.virtualization.estimate_size, 32.0);
        assert_eq!(config.virtualization.viewport_height, 900.5);
        assert_eq!(config.suggestion_triggers, vec!['@', '#', '/']);

        let options = config.virtualizer_options(10);
        assert_eq!(options.count, 10);
        assert!(!options.enabled);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config =
            EditorConfig::from_kdl("t.kdl", "virtualization {\n    overscan 2\n}\n").unwrap();
        assert_eq!(config.virtualization.overscan, 2);
        assert!(config.virtualization.enabled);
        assert_eq!(config.virtualization.estimate_size, 50.0);
        assert_eq!(config.suggestion_triggers, vec!['@', '/']);
    }

    #[test]
    fn test_round_trip_through_kdl() {
        let mut config = EditorConfig::default();
        config.virtualization.overscan = 3;
        config.suggestion_triggers = vec!['#'];
        let text = config.to_kdl();
        assert_eq!(EditorConfig::from_kdl("t.kdl", &text).unwrap(), config);
    }

    #[test]
    fn test_bad_values_point_at_node() {
        let source = "virtualization {\n    overscan -1\n}\n";
        let err = EditorConfig::from_kdl("t.kdl", source).unwrap_err();
        assert!(err.message().contains("overscan"));
        assert!(source[err.offset()..].trim_start().starts_with("overscan"));

        let err = EditorConfig::from_kdl("t.kdl", "suggestion-triggers \"ab\"").unwrap_err();
        assert!(err.message().contains("one-character"));
    }

    #[test]
    fn test_syntax_error() {
        let err = EditorConfig::from_kdl("t.kdl", "virtualization {").unwrap_err();
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("vellum-config-that-does-not-exist.kdl");
        assert_eq!(EditorConfig::load(&path).unwrap(), EditorConfig::default());
    }
}
