//! Error types for the ingestion pipeline.
//!
//! Only structural problems are errors. Enrichment misses are reported through
//! `Option`/[`Resolution`](crate::resolve::Resolution) values and merge
//! disagreements through [`MergeDecision`](crate::merge::MergeDecision).

use std::io;

use thiserror::Error;

use crate::registry::{NameId, RegionId};

/// Page and column layout violations. Any of these aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("page marker without a page number: {line:?}")]
    MissingPageNumber { line: String },
    #[error("page numbering gap: expected page {expected}, found page {found}")]
    PageGap { expected: u32, found: u32 },
    #[error("page {page}: no column split cleared the minimum score (best {best_score} < {required})")]
    NoColumnSplit {
        page: u32,
        best_score: usize,
        required: usize,
    },
    #[error("page {page}: line straddles the column split at {split}: {line:?}")]
    AmbiguousColumnSplit { page: u32, split: usize, line: String },
}

/// Problems loading a pipeline configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid pattern for '{field}': {source}")]
    Pattern { field: String, source: regex::Error },
}

/// Registry-side failures (unknown keys, broken links).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown name id {0}")]
    UnknownName(NameId),
    #[error("unknown region id {0}")]
    UnknownRegion(RegionId),
    #[error("region {0:?} appears more than once under the same parent")]
    DuplicateRegion(String),
}

/// Umbrella error for a pipeline run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("page {page}: unrecognized line {text:?}")]
    UnrecognizedLine { page: u32, text: String },
    #[error("record on page(s) {pages:?} is missing mandatory section '{section}'")]
    MissingSection { pages: Vec<u32>, section: String },
    #[error("record on page(s) {pages:?} does not match the '{extractor}' header grammar: {text:?}")]
    MalformedRecord {
        extractor: String,
        pages: Vec<u32>,
        text: String,
    },
    #[error("no extractor registered under '{0}'")]
    UnknownExtractor(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
