//! Configuration for the XSD helper tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (xsd-helper.toml)
//! - Environment variables (XSD_HELPER__*)
//!
//! ## Example config file (xsd-helper.toml):
//! ```toml
//! [export]
//! root = "http://www.fpml.org/FpML-5/confirmation:dataDocument"
//! skip = ["partyTradeInformation"]
//! extract = ["meta:column"]
//! attribute_layout = "unified"
//!
//! [graph]
//! format = "dot"
//! strict_cycles = true
//!
//! [loader]
//! follow_imports = true
//! skip_prefixes = ["target/", "archive/"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::export::{AttributeLayout, ExportOptions};
use crate::schema::LoadConfig;
use crate::topo::CyclePolicy;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelperConfig {
    /// XPath export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Dependency graph settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Schema loading settings
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// XPath export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Root element or `namespace:Type`
    #[serde(default)]
    pub root: Option<String>,

    /// Element and attribute names to leave out
    #[serde(default)]
    pub skip: Vec<String>,

    /// Extra declaration attributes to add as columns
    #[serde(default)]
    pub extract: Vec<String>,

    #[serde(default)]
    pub attribute_layout: AttributeLayout,
}

/// Dependency graph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub format: GraphFormat,

    /// Fail on dependency cycles instead of breaking them
    #[serde(default)]
    pub strict_cycles: bool,
}

/// Output format for the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
    Json,
}

/// Schema loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_true")]
    pub follow_imports: bool,

    /// Paths skipped when loading a directory
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            follow_imports: true,
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl HelperConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "xsd-helper.toml",
            ".xsd-helper.toml",
            "config/xsd-helper.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "xsd-helper", "xsd-helper") {
            let xdg_config = config_dir.config_dir().join("xsd-helper.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // XSD_HELPER__EXPORT__ROOT=...
        builder = builder.add_source(
            Environment::with_prefix("XSD_HELPER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            follow_imports: self.loader.follow_imports,
            skip_prefixes: self.loader.skip_prefixes.clone(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            root: self.export.root.clone(),
            skip: self.export.skip.clone(),
            extract: self.export.extract.clone(),
            attribute_layout: self.export.attribute_layout,
        }
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        if self.graph.strict_cycles {
            CyclePolicy::Fail
        } else {
            CyclePolicy::Break
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HelperConfig::default();
        assert!(config.loader.follow_imports);
        assert_eq!(config.export.attribute_layout, AttributeLayout::Compact);
        assert_eq!(config.graph.format, GraphFormat::Text);
        assert_eq!(config.cycle_policy(), CyclePolicy::Break);
    }

    #[test]
    fn test_serialize_config() {
        let config = HelperConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[export]"));
        assert!(toml_str.contains("[loader]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[export]
root = "trade"
skip = ["audit"]
attribute_layout = "unified"

[graph]
format = "dot"
strict_cycles = true
"#,
        )
        .unwrap();

        let config = HelperConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.export.root.as_deref(), Some("trade"));
        assert_eq!(config.export.skip, vec!["audit"]);
        assert_eq!(config.export.attribute_layout, AttributeLayout::Unified);
        assert_eq!(config.graph.format, GraphFormat::Dot);
        assert_eq!(config.cycle_policy(), CyclePolicy::Fail);
        assert!(config.loader.follow_imports);

        let options = config.export_options();
        assert_eq!(options.root.as_deref(), Some("trade"));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = HelperConfig::default();
        config.export.extract = vec!["meta:column".to_string()];
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = HelperConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.export.extract, vec!["meta:column"]);
    }
}
