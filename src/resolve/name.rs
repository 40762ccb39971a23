//! Name resolution: mapping an extracted `(name, authority, year)` onto at
//! most one canonical name.
//!
//! Strategies run in a fixed order and the first one that yields any
//! candidates decides the outcome: exactly one candidate is a match, more
//! than one stops the search as ambiguous.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::record::CandidateRecord;
use crate::registry::{NameId, NameRegistry, NomenclatureStatus};
use crate::resolve::variants::{
    candidate_pairs, split_name, strip_diacritics, strip_initials, strip_subgenus, NameParts,
};
use crate::resolve::{Resolution, ResolutionStats, Strategy};

/// The `resolver` section of the pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Largest Levenshtein distance the edit-distance fallback accepts.
    pub max_edit_distance: usize,
    /// Year difference above which a match is flagged sketchy.
    pub sketchy_year_tolerance: u32,
    /// Year window used to narrow a multi-candidate result.
    pub root_year_tolerance: u32,
    /// Bare author to fuller spellings, tried in order. Replaces the
    /// defaults when given.
    pub author_aliases: IndexMap<String, Vec<String>>,
    /// Genus to genera historically merged with it.
    pub sibling_genera: HashMap<String, Vec<String>>,
    /// Limit on constructed-from hops when following derived spellings.
    pub max_indirection: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        let mut author_aliases = IndexMap::new();
        author_aliases.insert(
            "Gray".to_string(),
            vec!["J. Gray".to_string(), "J.E. Gray".to_string()],
        );
        author_aliases.insert(
            "Geoffroy".to_string(),
            vec![
                "É. Geoffroy Saint-Hilaire".to_string(),
                "I. Geoffroy Saint-Hilaire".to_string(),
            ],
        );
        Self {
            max_edit_distance: 3,
            sketchy_year_tolerance: 1,
            root_year_tolerance: 0,
            author_aliases,
            sibling_genera: HashMap::new(),
            max_indirection: 8,
        }
    }
}

const STRATEGIES: [Strategy; 6] = [
    Strategy::Exact,
    Strategy::Variant,
    Strategy::RootName,
    Strategy::GenusSynonym,
    Strategy::EditDistance,
    Strategy::SiblingGenus,
];

enum Settled {
    Hit(NameId),
    Stop(Vec<NameId>),
    Miss,
}

/// Batch-scoped name resolver.
///
/// Holds the root-name lookup cache and the per-strategy counters for one
/// run. The cache assumes the registry's root index does not change under
/// it; call [`NameResolver::clear_cache`] after adding entries.
#[derive(Debug, Default)]
pub struct NameResolver {
    options: ResolverOptions,
    root_cache: HashMap<String, Vec<NameId>>,
    stats: ResolutionStats,
}

impl NameResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            root_cache: HashMap::new(),
            stats: ResolutionStats::default(),
        }
    }

    pub fn stats(&self) -> &ResolutionStats {
        &self.stats
    }

    pub fn clear_cache(&mut self) {
        self.root_cache.clear();
    }

    /// Resolve a name against `registry`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The registry to search
    /// * `name` - Original name as printed, e.g. `"Mus alpinus"`
    /// * `authority` - Author as printed, e.g. `"Gray"`
    /// * `year` - Optional year, used to narrow several candidates
    ///
    /// # Returns
    ///
    /// The resolution. A found name has already been followed through any
    /// derived spellings to the name it was built from.
    pub fn resolve<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &R,
        name: &str,
        authority: &str,
        year: Option<&str>,
    ) -> Resolution {
        let resolution = match self.search(registry, name, authority, year) {
            Resolution::Found { id, strategy, .. } => Resolution::Found {
                id,
                strategy,
                sketchy: self.is_sketchy(registry, id, name, authority, year),
            },
            other => other,
        };
        self.stats.record(&resolution);
        resolution
    }

    /// Resolve the record's typed name fields and attach the match.
    pub fn resolve_record<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &R,
        record: &mut CandidateRecord,
    ) -> Resolution {
        let Some(name) = record.original_name.clone() else {
            self.stats.record(&Resolution::NotFound);
            return Resolution::NotFound;
        };
        let authority = record.authority.clone().unwrap_or_default();
        let resolution = self.resolve(registry, &name, &authority, record.year.as_deref());
        match &resolution {
            Resolution::Found { id, .. } => {
                if !record.set_name_obj(*id) {
                    tracing::warn!(
                        "Record on page {} already resolved to {:?}, ignoring {}",
                        record.page_range(),
                        record.name_obj(),
                        id
                    );
                }
            }
            Resolution::Ambiguous { candidates, .. } => {
                tracing::info!("{} {}: multiple matches {:?}", name, authority, candidates)
            }
            Resolution::NotFound => tracing::info!("{} {}: no match", name, authority),
        }
        resolution
    }

    fn search<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &R,
        name: &str,
        authority: &str,
        year: Option<&str>,
    ) -> Resolution {
        for strategy in STRATEGIES {
            let candidates = self.candidates(strategy, registry, name, authority);
            tracing::debug!(
                "{} {}: {} gave {} candidate(s)",
                name,
                authority,
                strategy,
                candidates.len()
            );
            match self.settle(registry, candidates, year) {
                Settled::Hit(id) => {
                    return Resolution::Found {
                        id,
                        strategy,
                        sketchy: false,
                    }
                }
                Settled::Stop(candidates) => {
                    return Resolution::Ambiguous {
                        strategy,
                        candidates,
                    }
                }
                Settled::Miss => {}
            }
        }
        Resolution::NotFound
    }

    fn candidates<R: NameRegistry + ?Sized>(
        &mut self,
        strategy: Strategy,
        registry: &R,
        name: &str,
        authority: &str,
    ) -> Vec<NameId> {
        match strategy {
            Strategy::Exact => registry.find_exact(name, authority),
            Strategy::Variant => candidate_pairs(name, authority, &self.options.author_aliases)
                .into_iter()
                .map(|(n, a)| registry.find_exact(&n, &a))
                .find(|ids| !ids.is_empty())
                .unwrap_or_default(),
            Strategy::RootName => match split_name(name) {
                Some(parts) => {
                    let scopes = scopes_of(&parts);
                    self.scoped_root(registry, &parts.root, &scopes)
                }
                None => Vec::new(),
            },
            Strategy::GenusSynonym => {
                let Some(parts) = split_name(name) else {
                    return Vec::new();
                };
                match registry.accepted_genus(&parts.genus) {
                    Some(accepted) => self.scoped_root(registry, &parts.root, &[accepted]),
                    None => Vec::new(),
                }
            }
            Strategy::EditDistance => {
                let stripped = strip_subgenus(name);
                registry
                    .find_by_authority(authority)
                    .into_iter()
                    .filter(|id| {
                        let Some(existing) = registry.get(*id).and_then(|n| n.original_name.as_deref())
                        else {
                            return false;
                        };
                        strsim::levenshtein(existing, name) <= self.options.max_edit_distance
                            || strip_subgenus(existing) == stripped
                    })
                    .collect()
            }
            Strategy::SiblingGenus => {
                let Some(parts) = split_name(name) else {
                    return Vec::new();
                };
                let siblings = self.siblings(&parts.genus);
                if siblings.is_empty() {
                    return Vec::new();
                }
                self.scoped_root(registry, &parts.root, &siblings)
            }
        }
    }

    /// Follow derived spellings, drop duplicates, then narrow by year.
    fn settle<R: NameRegistry + ?Sized>(
        &self,
        registry: &R,
        candidates: Vec<NameId>,
        year: Option<&str>,
    ) -> Settled {
        let candidates: Vec<NameId> = candidates
            .into_iter()
            .map(|id| self.follow(registry, id))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        match candidates.as_slice() {
            [] => return Settled::Miss,
            [only] => return Settled::Hit(*only),
            _ => {}
        }
        let Some(year) = year else {
            return Settled::Stop(candidates);
        };
        let narrowed: Vec<NameId> = candidates
            .iter()
            .copied()
            .filter(|id| {
                registry.get(*id).is_some_and(|n| {
                    years_within(n.year.as_deref(), year, self.options.root_year_tolerance)
                })
            })
            .collect();
        match narrowed.as_slice() {
            [only] => Settled::Hit(*only),
            _ => Settled::Stop(candidates),
        }
    }

    fn follow<R: NameRegistry + ?Sized>(&self, registry: &R, mut id: NameId) -> NameId {
        for _ in 0..self.options.max_indirection {
            let Some(entry) = registry.get(id) else {
                break;
            };
            match entry.constructed_from {
                Some(from) if entry.status.is_derived() => {
                    tracing::debug!("Following {:?} {} to {}", entry.status, id, from);
                    id = from;
                }
                _ => break,
            }
        }
        id
    }

    fn scoped_root<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &R,
        root: &str,
        scopes: &[String],
    ) -> Vec<NameId> {
        let ids = self
            .root_cache
            .entry(root.to_lowercase())
            .or_insert_with(|| registry.find_by_root(root))
            .clone();
        ids.into_iter()
            .filter(|id| {
                let Some(entry) = registry.get(*id) else {
                    return false;
                };
                if entry.status == NomenclatureStatus::Synonym {
                    return false;
                }
                entry
                    .original_name
                    .as_deref()
                    .and_then(split_name)
                    .is_some_and(|parts| scopes_of(&parts).iter().any(|s| scopes.contains(s)))
            })
            .collect()
    }

    fn siblings(&self, genus: &str) -> Vec<String> {
        let mut out: IndexSet<String> = IndexSet::new();
        for (key, merged) in &self.options.sibling_genera {
            if key == genus || merged.iter().any(|g| g == genus) {
                out.insert(key.clone());
                out.extend(merged.iter().cloned());
            }
        }
        out.shift_remove(genus);
        out.into_iter().collect()
    }

    fn is_sketchy<R: NameRegistry + ?Sized>(
        &self,
        registry: &R,
        id: NameId,
        name: &str,
        authority: &str,
        year: Option<&str>,
    ) -> bool {
        let Some(entry) = registry.get(id) else {
            return false;
        };
        let authority_differs =
            !authority.is_empty() && author_core(&entry.authority) != author_core(authority);
        let year_differs = match (entry.year.as_deref(), year) {
            (Some(existing), Some(incoming)) => {
                !years_within(Some(existing), incoming, self.options.sketchy_year_tolerance)
            }
            _ => false,
        };
        if authority_differs || year_differs {
            tracing::warn!(
                "Sketchy match for {} {} {:?}: {} is {} {:?}",
                name,
                authority,
                year,
                id,
                entry.authority,
                entry.year
            );
        }
        authority_differs || year_differs
    }
}

fn scopes_of(parts: &NameParts) -> Vec<String> {
    std::iter::once(parts.genus.clone())
        .chain(parts.subgenus.clone())
        .collect()
}

fn author_core(authority: &str) -> String {
    strip_diacritics(&strip_initials(authority)).to_lowercase()
}

fn years_within(existing: Option<&str>, incoming: &str, tolerance: u32) -> bool {
    let Some(existing) = existing else {
        return false;
    };
    match (leading_year(existing), leading_year(incoming)) {
        (Some(a), Some(b)) => a.abs_diff(b) <= tolerance,
        _ => existing.trim() == incoming.trim(),
    }
}

fn leading_year(text: &str) -> Option<u32> {
    let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
    (digits.len() == 4).then(|| digits.parse().ok()).flatten()
}
