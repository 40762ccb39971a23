//! Applying extracted values onto canonical names.
//!
//! [`decide`] compares a resolved record with its canonical name and returns
//! one [`MergeDecision`] per attribute without touching anything.
//! [`MergeWriter`] applies those decisions, keeps the counters and collects
//! whatever needs a human for [`MergeWriter::replay`].

pub mod policy;
pub mod review;
pub mod writer;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Tag, TagKind};
use crate::registry::{Attribute, AttributeValue, NameId};

pub use policy::decide;
pub use review::{ConfirmAll, ConsoleReviewer, DeclineAll, Reviewer};
pub use writer::{FollowUp, MergeWriter, ReplaySummary};

/// The `merge` section of the pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Compare and report, but write nothing.
    pub dry_run: bool,
    /// Flag records whose type is not a holotype for follow-up.
    pub require_holotype: bool,
    /// Provenance label used for audit comments.
    pub source: String,
    /// Tag kinds that accumulate instead of being fixed once present.
    pub multi_valued_tags: BTreeSet<TagKind>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            require_holotype: false,
            source: "unknown source".to_string(),
            multi_valued_tags: [
                TagKind::Collector,
                TagKind::LocationDetail,
                TagKind::SpecimenDetail,
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// What to do with one incoming attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The attribute was unset.
    Fill,
    Unchanged,
    /// The incoming locality contains the recorded one.
    KeptMoreSpecific,
    AppendTags(Vec<Tag>),
    /// Tags of a kind already present with other content.
    RederiveTags(Vec<Tag>),
    /// Existing citation with the incoming one appended as a cross-reference.
    AnnotateCitation(String),
    /// Different root; recorded as a new spelling once confirmed.
    SpellingVariant,
    DeferredForReview,
    Conflict,
}

/// How an [`Outcome`] is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Applied,
    Deferred,
    Conflicting,
}

impl Outcome {
    pub fn category(&self) -> Category {
        match self {
            Outcome::Fill
            | Outcome::Unchanged
            | Outcome::KeptMoreSpecific
            | Outcome::AppendTags(_)
            | Outcome::AnnotateCitation(_) => Category::Applied,
            Outcome::RederiveTags(_) | Outcome::DeferredForReview => Category::Deferred,
            Outcome::SpellingVariant | Outcome::Conflict => Category::Conflicting,
        }
    }

    /// Whether applying the outcome writes to the registry.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Outcome::Fill
                | Outcome::AppendTags(_)
                | Outcome::RederiveTags(_)
                | Outcome::AnnotateCitation(_)
        )
    }
}

/// One attribute's merge result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub name: NameId,
    pub attribute: Attribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<AttributeValue>,
    pub incoming: AttributeValue,
    pub outcome: Outcome,
    /// Page range of the source record.
    pub pages: String,
}

impl MergeDecision {
    pub fn category(&self) -> Category {
        self.outcome.category()
    }
}

impl fmt::Display for MergeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (p. {}): ", self.name, self.attribute, self.pages)?;
        match &self.existing {
            Some(existing) => write!(f, "{} -> {}", existing, self.incoming),
            None => write!(f, "unset -> {}", self.incoming),
        }
    }
}
