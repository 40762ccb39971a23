//! Region hierarchy lookup.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, RegistryError};
use crate::registry::RegionId;

/// One node of the region hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub parent: Option<RegionId>,
    pub children: Vec<RegionId>,
}

/// Read-only view of the region hierarchy.
pub trait RegionTree {
    fn region(&self, id: RegionId) -> Option<&Region>;

    /// Look a region up by name, case-insensitively. Shallower regions win
    /// when a name occurs at several depths.
    fn find(&self, name: &str) -> Option<RegionId>;

    fn children(&self, id: RegionId) -> &[RegionId] {
        self.region(id).map_or(&[], |region| region.children.as_slice())
    }

    fn parent(&self, id: RegionId) -> Option<RegionId> {
        self.region(id)?.parent
    }

    fn name(&self, id: RegionId) -> Option<&str> {
        self.region(id).map(|region| region.name.as_str())
    }

    /// Whether `ancestor` strictly contains `descendant`.
    fn is_ancestor(&self, ancestor: RegionId, descendant: RegionId) -> bool {
        let mut current = self.parent(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Human-readable path, most specific first: `"Cusco, Peru"`.
    fn path(&self, id: RegionId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            match self.name(id) {
                Some(name) => parts.push(name.to_string()),
                None => break,
            }
            current = self.parent(id);
        }
        parts.join(", ")
    }
}

/// Nested description a tree is loaded from.
///
/// ```yaml
/// - name: Peru
///   children:
///     - name: Cusco
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RegionSpec>,
}

/// Region hierarchy held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegionTree {
    regions: Vec<Region>,
    by_name: HashMap<String, Vec<RegionId>>,
}

impl InMemoryRegionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[RegionSpec]) -> Result<Self, RegistryError> {
        let mut tree = Self::new();
        for spec in specs {
            tree.add_spec(None, spec)?;
        }
        Ok(tree)
    }

    /// Load a nested YAML description. JSON parses too, being valid YAML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let content = fs::read_to_string(path.as_ref())?;
        let specs: Vec<RegionSpec> = serde_yaml::from_str(&content)?;
        let tree = Self::from_specs(&specs)?;
        tracing::info!(
            "Loaded {} regions from {}",
            tree.len(),
            path.as_ref().display()
        );
        Ok(tree)
    }

    fn add_spec(&mut self, parent: Option<RegionId>, spec: &RegionSpec) -> Result<(), RegistryError> {
        let id = self.add(parent, &spec.name)?;
        for child in &spec.children {
            self.add_spec(Some(id), child)?;
        }
        Ok(())
    }

    /// Add a region under `parent`, or at the top level.
    pub fn add(&mut self, parent: Option<RegionId>, name: &str) -> Result<RegionId, RegistryError> {
        let siblings: &[RegionId] = match parent {
            Some(parent) => self
                .regions
                .get(parent.0 as usize)
                .map(|region| region.children.as_slice())
                .ok_or(RegistryError::UnknownRegion(parent))?,
            None => &[],
        };
        let duplicate = match parent {
            Some(_) => siblings
                .iter()
                .any(|id| self.regions[id.0 as usize].name.eq_ignore_ascii_case(name)),
            None => self
                .regions
                .iter()
                .any(|region| region.parent.is_none() && region.name.eq_ignore_ascii_case(name)),
        };
        if duplicate {
            return Err(RegistryError::DuplicateRegion(name.to_string()));
        }

        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region {
            id,
            name: name.to_string(),
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.regions[parent.0 as usize].children.push(id);
        }
        self.by_name.entry(name.to_lowercase()).or_default().push(id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn depth(&self, id: RegionId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }
}

impl RegionTree for InMemoryRegionTree {
    fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize)
    }

    fn find(&self, name: &str) -> Option<RegionId> {
        self.by_name
            .get(&name.trim().to_lowercase())?
            .iter()
            .copied()
            .min_by_key(|id| (self.depth(*id), *id))
    }
}
