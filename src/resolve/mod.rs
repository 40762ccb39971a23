//! Reconciling extracted names and localities with the registry.

pub mod name;
pub mod region;
pub mod variants;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::NameId;

pub use name::{NameResolver, ResolverOptions};
pub use region::{split_locality, ComponentOrder, RegionOptions, RegionResolver};

/// Name resolution strategies, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    Variant,
    RootName,
    GenusSynonym,
    EditDistance,
    SiblingGenus,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::Exact => "exact",
            Strategy::Variant => "variant",
            Strategy::RootName => "root name",
            Strategy::GenusSynonym => "genus synonym",
            Strategy::EditDistance => "edit distance",
            Strategy::SiblingGenus => "sibling genus",
        };
        f.write_str(label)
    }
}

/// Outcome of resolving one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Found {
        id: NameId,
        strategy: Strategy,
        /// Authority or year diverges from the source beyond tolerance.
        sketchy: bool,
    },
    Ambiguous {
        strategy: Strategy,
        candidates: Vec<NameId>,
    },
    NotFound,
}

impl Resolution {
    pub fn id(&self) -> Option<NameId> {
        match self {
            Resolution::Found { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Running match counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub by_strategy: BTreeMap<Strategy, usize>,
    pub sketchy: usize,
    pub ambiguous: usize,
    pub not_found: usize,
}

impl ResolutionStats {
    pub fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Found {
                strategy, sketchy, ..
            } => {
                *self.by_strategy.entry(*strategy).or_default() += 1;
                if *sketchy {
                    self.sketchy += 1;
                }
            }
            Resolution::Ambiguous { .. } => self.ambiguous += 1,
            Resolution::NotFound => self.not_found += 1,
        }
    }

    pub fn found(&self) -> usize {
        self.by_strategy.values().sum()
    }

    pub fn total(&self) -> usize {
        self.found() + self.ambiguous + self.not_found
    }

    /// Fraction of attempts that found a single name.
    pub fn match_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.found() as f64 / total as f64,
        }
    }
}
