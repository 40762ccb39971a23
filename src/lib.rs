//! # Nomenclator: ingesting OCR'd taxonomic catalogues
//!
//! Nomenclator turns the raw text dump of a printed species catalogue into
//! structured records and merges them into a registry of canonical names.
//!
//! ## Features
//!
//! - **Layout recovery**: Page segmentation, pagination checks and two-column realignment
//! - **Line classification**: A finite-state classifier that folds lines into records
//! - **Pluggable extractors**: Publication-specific parsing behind [`RecordExtractor`]
//! - **Name resolution**: Exact, variant, root-name, genus-synonym, edit-distance and sibling-genus matching
//! - **Region resolution**: Free-text localities mapped onto a region hierarchy
//! - **Conflict-aware merging**: Fill what is missing, keep what is more specific, queue the rest for review
//!
//! ## Example: pipeline configuration
//!
//! ```yaml
//! layout:
//!   expect_two_columns: true
//!   single_column_pages: [1]
//! regions:
//!   synonyms:
//!     Ceylon: Sri Lanka
//! resolver:
//!   author_aliases:
//!     Gray: [J. Gray, J.E. Gray]
//! merge:
//!   source: Allen 1939
//!   require_holotype: true
//! ```

// Core record model and errors
pub mod error;
pub mod record;

// Processing stages
pub mod layout;
pub mod classify;
pub mod extract;
pub mod resolve;
pub mod merge;

// Registries the pipeline reads and writes
pub mod registry;

// Run orchestration and output
pub mod config;
pub mod pipeline;
pub mod report;
pub mod serialization;

// Re-export key types
pub use error::{ConfigError, IngestError, LayoutError, RegistryError, Result};
pub use record::{CandidateRecord, FieldValue, RecordKind, SpeciesTypeKind, Tag, TagKind};

pub use config::PipelineConfig;
pub use extract::{CatalogueExtractor, ExtractorRegistry, RecordExtractor};
pub use pipeline::{Pipeline, RecordStream};
pub use report::RunReport;

pub use merge::{MergeDecision, MergeOptions, MergeWriter, Outcome, Reviewer};
pub use registry::{
    CanonicalName, InMemoryRegionTree, InMemoryRegistry, NameId, NameRegistry, RegionId, RegionTree,
};
pub use resolve::{NameResolver, RegionResolver, Resolution, Strategy};
pub use serialization::NdjsonWriter;
