//! The canonical registry as seen from the pipeline.
//!
//! The registry itself is owned elsewhere; this module defines the narrow
//! interfaces the pipeline reads and writes through ([`NameRegistry`],
//! [`RegionTree`]) plus in-memory implementations that load from snapshots.

pub mod names;
pub mod regions;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use names::{
    root_name, Attribute, AttributeValue, AuditComment, CanonicalName, InMemoryRegistry,
    NameRegistry, NomenclatureStatus, RegistrySnapshot,
};
pub use regions::{InMemoryRegionTree, Region, RegionSpec, RegionTree};

/// Opaque key of a canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameId(pub u64);

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque key of a region node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region {}", self.0)
    }
}
