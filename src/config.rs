//! Pipeline configuration.
//!
//! One YAML file configures every stage. Each section falls back to its
//! defaults, so an empty file is a valid configuration:
//!
//! ```yaml
//! layout:
//!   expect_two_columns: true
//!   single_column_pages: [1, 2]
//!   pagination: permissive
//! classifier:
//!   indent_unit: 4
//! regions:
//!   synonyms:
//!     Ceylon: Sri Lanka
//! resolver:
//!   max_edit_distance: 2
//! merge:
//!   source: Allen 1939
//!   require_holotype: true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::{ClassifierPatterns, LineClassifier, PatternOverrides};
use crate::error::ConfigError;
use crate::layout::{ColumnAligner, ColumnOptions, PaginationMode};
use crate::merge::MergeOptions;
use crate::resolve::{RegionOptions, ResolverOptions};

/// The `layout` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub pagination: PaginationMode,
    #[serde(flatten)]
    pub columns: ColumnOptions,
}

/// The `classifier` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Columns of indentation per nesting level.
    pub indent_unit: usize,
    /// Number of previous line kinds remembered.
    pub history: usize,
    #[serde(flatten)]
    pub patterns: PatternOverrides,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            indent_unit: 2,
            history: 4,
            patterns: PatternOverrides::default(),
        }
    }
}

impl ClassifierConfig {
    /// Build a classifier, compiling any pattern overrides.
    pub fn build(&self) -> Result<LineClassifier, ConfigError> {
        let patterns = ClassifierPatterns::with_overrides(&self.patterns)?;
        Ok(LineClassifier::new(patterns, self.indent_unit, self.history))
    }
}

/// Configuration for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub layout: LayoutConfig,
    pub classifier: ClassifierConfig,
    pub regions: RegionOptions,
    pub resolver: ResolverOptions,
    pub merge: MergeOptions,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if the file can't be read, isn't valid YAML, or carries
    /// a pattern override that doesn't compile.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        tracing::info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.classifier.build()?;
        Ok(config)
    }

    pub fn column_aligner(&self) -> ColumnAligner {
        ColumnAligner::new(self.layout.columns.clone())
    }
}
