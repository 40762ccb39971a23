//! Free-text locality to region resolution.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::registry::{RegionId, RegionTree};
use crate::resolve::variants::strip_diacritics;

/// Order of the components handed to [`RegionResolver::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentOrder {
    /// `["Cusco", "Peru"]`
    #[default]
    MostSpecificFirst,
    /// `["Peru", "Cusco"]`
    MostSpecificLast,
}

/// The `regions` section of the pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOptions {
    /// Historical name to current name.
    pub synonyms: HashMap<String, String>,
    /// Parents whose unresolved children are not worth a diagnostic.
    pub quiet_parents: BTreeSet<String>,
    pub directional_prefixes: Vec<String>,
}

impl Default for RegionOptions {
    fn default() -> Self {
        let prefixes = [
            "North", "South", "East", "West", "Northern", "Southern", "Eastern", "Western",
            "Central", "Northeastern", "Northwestern", "Southeastern", "Southwestern", "Upper",
            "Lower",
        ];
        Self {
            synonyms: HashMap::new(),
            quiet_parents: BTreeSet::new(),
            directional_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Split a locality string into its comma-separated components.
pub fn split_locality(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(|part| part.trim().trim_end_matches('.').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves locality components against a [`RegionTree`].
#[derive(Debug, Clone, Default)]
pub struct RegionResolver {
    options: RegionOptions,
    synonyms: HashMap<String, String>,
}

impl RegionResolver {
    pub fn new(options: RegionOptions) -> Self {
        let synonyms = options
            .synonyms
            .iter()
            .map(|(old, new)| (old.to_lowercase(), new.clone()))
            .collect();
        Self { options, synonyms }
    }

    /// Lookup forms of one component, in precedence order: literal,
    /// synonym, diacritics stripped, directional prefix stripped, "Island"
    /// suffix stripped.
    pub fn variants(&self, component: &str) -> Vec<String> {
        let literal = component.trim().trim_end_matches('.').trim().to_string();
        let mut out: IndexSet<String> = IndexSet::new();
        out.insert(literal.clone());
        if let Some(modern) = self.synonyms.get(&literal.to_lowercase()) {
            out.insert(modern.clone());
        }
        out.insert(strip_diacritics(&literal));
        if let Some(stripped) = self.strip_directional(&literal) {
            out.insert(stripped);
        }
        for suffix in [" Islands", " Island", " Is."] {
            if let Some(stripped) = literal.strip_suffix(suffix) {
                out.insert(stripped.trim().to_string());
            }
        }
        out.shift_remove("");
        out.into_iter().collect()
    }

    fn strip_directional(&self, text: &str) -> Option<String> {
        let (first, rest) = text.split_once(char::is_whitespace)?;
        self.options
            .directional_prefixes
            .iter()
            .any(|prefix| prefix.eq_ignore_ascii_case(first))
            .then(|| rest.trim().to_string())
    }

    /// Resolve a whole locality string such as `"Cusco, Peru"`.
    pub fn resolve_locality<T: RegionTree + ?Sized>(&self, tree: &T, text: &str) -> Option<RegionId> {
        let components = split_locality(text);
        let refs: Vec<&str> = components.iter().map(String::as_str).collect();
        self.resolve(tree, &refs, ComponentOrder::MostSpecificFirst)
    }

    /// Resolve `components` to the most specific region reachable.
    ///
    /// The broadest component must resolve at the top level; each further
    /// component is looked up among the children of the previous match only.
    /// A child miss returns the parent. `None` means even the broadest
    /// component is unknown.
    pub fn resolve<T: RegionTree + ?Sized>(
        &self,
        tree: &T,
        components: &[&str],
        order: ComponentOrder,
    ) -> Option<RegionId> {
        let ordered: Vec<&str> = match order {
            ComponentOrder::MostSpecificFirst => components.iter().rev().copied().collect(),
            ComponentOrder::MostSpecificLast => components.to_vec(),
        };
        let (top, rest) = ordered.split_first()?;

        let Some(mut current) = self.variants(top).iter().find_map(|v| tree.find(v)) else {
            tracing::debug!("No region matches {:?}", top);
            return None;
        };

        for component in rest {
            if tree.children(current).is_empty() {
                break;
            }
            let variants = self.variants(component);
            let child = tree.children(current).iter().copied().find(|child| {
                tree.name(*child)
                    .is_some_and(|name| variants.iter().any(|v| v.eq_ignore_ascii_case(name)))
            });
            match child {
                Some(child) => current = child,
                None => {
                    let parent = tree.name(current).unwrap_or_default();
                    if !self.options.quiet_parents.contains(parent) {
                        tracing::debug!("No child of {:?} matches {:?}", parent, component);
                    }
                    break;
                }
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryRegionTree, RegionSpec};

    fn tree() -> InMemoryRegionTree {
        let specs: Vec<RegionSpec> = serde_yaml::from_str(
            r#"
- name: Peru
  children:
    - name: Cusco
- name: Colombia
  children:
    - name: Bogota
- name: Sri Lanka
- name: Canary
- name: Borneo
"#,
        )
        .unwrap();
        InMemoryRegionTree::from_specs(&specs).unwrap()
    }

    fn resolver() -> RegionResolver {
        let mut options = RegionOptions::default();
        options
            .synonyms
            .insert("Ceylon".to_string(), "Sri Lanka".to_string());
        RegionResolver::new(options)
    }

    #[test]
    fn test_split_locality() {
        assert_eq!(split_locality("Cusco, Peru."), vec!["Cusco", "Peru"]);
        assert!(split_locality(" , ").is_empty());
    }

    #[test]
    fn test_variant_precedence() {
        let variants = resolver().variants("North Ceylon");
        assert_eq!(variants, vec!["North Ceylon", "Ceylon"]);

        let variants = resolver().variants("Ceylon");
        assert_eq!(variants, vec!["Ceylon", "Sri Lanka"]);
    }

    #[test]
    fn test_resolves_through_variants() {
        let tree = tree();
        let resolver = resolver();

        assert_eq!(resolver.resolve_locality(&tree, "Ceylon"), tree.find("Sri Lanka"));
        assert_eq!(resolver.resolve_locality(&tree, "Canary Islands"), tree.find("Canary"));
        assert_eq!(resolver.resolve_locality(&tree, "Northern Borneo"), tree.find("Borneo"));
        assert_eq!(resolver.resolve_locality(&tree, "Bogotá, Colombia"), tree.find("Bogota"));
    }

    #[test]
    fn test_child_miss_returns_parent() {
        let tree = tree();
        let resolver = resolver();

        assert_eq!(resolver.resolve_locality(&tree, "Cusco, Peru"), tree.find("Cusco"));
        assert_eq!(resolver.resolve_locality(&tree, "Arequipa, Peru"), tree.find("Peru"));
        assert_eq!(
            resolver.resolve(&tree, &["Peru", "Cusco"], ComponentOrder::MostSpecificLast),
            tree.find("Cusco")
        );
    }

    #[test]
    fn test_unknown_top_level_is_none() {
        let tree = tree();
        assert_eq!(resolver().resolve_locality(&tree, "Cusco, Atlantis"), None);
        assert_eq!(resolver().resolve(&tree, &[], ComponentOrder::MostSpecificFirst), None);
    }
}
