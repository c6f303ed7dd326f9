use crate::error::{CssError, Result};
use crate::style::rule::StyleValue;
use indexmap::IndexMap;
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Engine-wide settings, usually read from a `rulecraft.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject selectors the CSS parser cannot read. Turn off to build rules
    /// without checking them.
    pub validate_selectors: bool,
    pub coverage_interval_ms: u64,
    /// Whether new stylesheets inject as `<link>` instead of `<style>`.
    pub link_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            validate_selectors: true,
            coverage_interval_ms: 100,
            link_mode: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CssError::Definition(e.to_string()))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reads the file when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load_from_file(path).unwrap_or_else(|err| {
            warn!("ignoring config {}: {}", path.display(), err);
            Self::default()
        })
    }

    pub fn coverage_interval(&self) -> Duration {
        Duration::from_millis(self.coverage_interval_ms)
    }
}

/// A stylesheet described in TOML:
///
/// ```toml
/// link = false
///
/// [[rule]]
/// selector = ".nav"
/// styles = { display = "flex", gap = 4 }
///
///   [[rule.rule]]
///   selector = "&:hover"
///   styles = { opacity = 0.8 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SheetDefinition {
    /// Overrides [`EngineConfig::link_mode`] for this sheet.
    #[serde(default)]
    pub link: Option<bool>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleDefinition {
    pub selector: String,
    #[serde(default)]
    pub styles: IndexMap<String, StyleValue>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDefinition>,
}

impl SheetDefinition {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CssError::Definition(e.to_string()))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = EngineConfig::from_toml_str("link_mode = true").unwrap();
        assert!(config.link_mode);
        assert!(config.validate_selectors);
        assert_eq!(config.coverage_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_rejects_wrong_types() {
        let err = EngineConfig::from_toml_str("coverage_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, CssError::Definition(_)));
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = EngineConfig::load_or_default("/nonexistent/rulecraft.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_sheet_definition_keeps_style_order_and_types() {
        let sheet = SheetDefinition::from_toml_str(
            r#"
            link = true

            [[rule]]
            selector = "p"
            styles = { zIndex = 3, color = "red", lineHeight = 1.5 }
            "#,
        )
        .unwrap();
        assert_eq!(sheet.link, Some(true));
        let styles = &sheet.rules[0].styles;
        let keys: Vec<&str> = styles.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zIndex", "color", "lineHeight"]);
        assert_eq!(styles["zIndex"], StyleValue::Number(3.0));
        assert_eq!(styles["color"], StyleValue::from("red"));
        assert_eq!(styles["lineHeight"], StyleValue::Number(1.5));
    }

    #[test]
    fn test_sheet_definition_requires_selector() {
        let err = SheetDefinition::from_toml_str("[[rule]]\nstyles = {}").unwrap_err();
        assert!(err.to_string().starts_with("invalid definition"));
    }
}
