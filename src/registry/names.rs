//! Canonical names and the registry interface over them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, RegistryError};
use crate::record::{SpeciesTypeKind, Tag};
use crate::registry::{NameId, RegionId};

/// Nomenclatural status of a registry entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NomenclatureStatus {
    #[default]
    Available,
    NameCombination,
    UnjustifiedEmendation,
    IncorrectSubsequentSpelling,
    /// Genus-level junior synonym; `constructed_from` points at the accepted genus.
    Synonym,
}

impl NomenclatureStatus {
    /// Statuses whose entries are derived spellings of another name.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            NomenclatureStatus::NameCombination
                | NomenclatureStatus::UnjustifiedEmendation
                | NomenclatureStatus::IncorrectSubsequentSpelling
        )
    }
}

/// Provenance note appended to a name after a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditComment {
    /// Label of the source publication.
    pub source: String,
    pub page_range: String,
    /// Verbatim source excerpt.
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The attributes a merge may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    TypeLocality,
    TypeTags,
    Collection,
    TypeSpecimen,
    SpeciesTypeKind,
    VerbatimCitation,
    OriginalName,
    TypeSpecimenSource,
    Type,
}

impl Attribute {
    /// Every attribute, in merge order.
    pub const ALL: [Attribute; 9] = [
        Attribute::TypeLocality,
        Attribute::TypeTags,
        Attribute::Collection,
        Attribute::TypeSpecimen,
        Attribute::SpeciesTypeKind,
        Attribute::VerbatimCitation,
        Attribute::OriginalName,
        Attribute::TypeSpecimenSource,
        Attribute::Type,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::TypeLocality => "type_locality",
            Attribute::TypeTags => "type_tags",
            Attribute::Collection => "collection",
            Attribute::TypeSpecimen => "type_specimen",
            Attribute::SpeciesTypeKind => "species_type_kind",
            Attribute::VerbatimCitation => "verbatim_citation",
            Attribute::OriginalName => "original_name",
            Attribute::TypeSpecimenSource => "type_specimen_source",
            Attribute::Type => "type",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value for one [`Attribute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    TypeLocality(RegionId),
    TypeTags(Vec<Tag>),
    Collection(String),
    TypeSpecimen(String),
    SpeciesTypeKind(SpeciesTypeKind),
    VerbatimCitation(String),
    OriginalName(String),
    TypeSpecimenSource(String),
    Type(NameId),
}

impl AttributeValue {
    pub fn attribute(&self) -> Attribute {
        match self {
            AttributeValue::TypeLocality(_) => Attribute::TypeLocality,
            AttributeValue::TypeTags(_) => Attribute::TypeTags,
            AttributeValue::Collection(_) => Attribute::Collection,
            AttributeValue::TypeSpecimen(_) => Attribute::TypeSpecimen,
            AttributeValue::SpeciesTypeKind(_) => Attribute::SpeciesTypeKind,
            AttributeValue::VerbatimCitation(_) => Attribute::VerbatimCitation,
            AttributeValue::OriginalName(_) => Attribute::OriginalName,
            AttributeValue::TypeSpecimenSource(_) => Attribute::TypeSpecimenSource,
            AttributeValue::Type(_) => Attribute::Type,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::TypeLocality(id) => write!(f, "{}", id),
            AttributeValue::TypeTags(tags) => {
                let tags: Vec<String> = tags.iter().map(Tag::to_string).collect();
                write!(f, "[{}]", tags.join("; "))
            }
            AttributeValue::Collection(s)
            | AttributeValue::TypeSpecimen(s)
            | AttributeValue::VerbatimCitation(s)
            | AttributeValue::OriginalName(s)
            | AttributeValue::TypeSpecimenSource(s) => f.write_str(s),
            AttributeValue::SpeciesTypeKind(kind) => write!(f, "{}", kind),
            AttributeValue::Type(id) => write!(f, "{}", id),
        }
    }
}

/// Final, undecorated word of a name, lowercased: `"Mus (Leggada) minutoides"`
/// gives `"minutoides"`.
pub fn root_name(name: &str) -> String {
    name.split_whitespace()
        .last()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
        .to_lowercase()
}

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalName {
    pub id: NameId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub authority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Derived from `original_name` on insert.
    #[serde(default)]
    pub root_name: String,
    #[serde(default)]
    pub status: NomenclatureStatus,
    /// Name this entry was built from, or the accepted genus for a synonym.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructed_from: Option<NameId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_locality: Option<RegionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_specimen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_type_kind: Option<SpeciesTypeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim_citation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_specimen_source: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<NameId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<AuditComment>,
    #[serde(default)]
    pub needs_tag_rederivation: bool,
}

impl CanonicalName {
    /// A bare `Available` entry for `original_name` by `authority`.
    pub fn new(id: NameId, original_name: &str, authority: &str, year: Option<&str>) -> Self {
        Self {
            id,
            original_name: Some(original_name.to_string()),
            authority: authority.to_string(),
            year: year.map(str::to_string),
            root_name: root_name(original_name),
            status: NomenclatureStatus::Available,
            constructed_from: None,
            type_locality: None,
            type_tags: Vec::new(),
            collection: None,
            type_specimen: None,
            species_type_kind: None,
            verbatim_citation: None,
            type_specimen_source: None,
            type_name: None,
            comments: Vec::new(),
            needs_tag_rederivation: false,
        }
    }

    pub fn with_status(mut self, status: NomenclatureStatus, from: Option<NameId>) -> Self {
        self.status = status;
        self.constructed_from = from;
        self
    }

    /// Genus the name is placed in, taken from its first word.
    pub fn genus(&self) -> Option<&str> {
        self.original_name.as_deref()?.split_whitespace().next()
    }

    /// Current value of `attribute`, `None` when unset. An empty tag list
    /// counts as unset.
    pub fn attribute(&self, attribute: Attribute) -> Option<AttributeValue> {
        match attribute {
            Attribute::TypeLocality => self.type_locality.map(AttributeValue::TypeLocality),
            Attribute::TypeTags => (!self.type_tags.is_empty())
                .then(|| AttributeValue::TypeTags(self.type_tags.clone())),
            Attribute::Collection => self.collection.clone().map(AttributeValue::Collection),
            Attribute::TypeSpecimen => self.type_specimen.clone().map(AttributeValue::TypeSpecimen),
            Attribute::SpeciesTypeKind => {
                self.species_type_kind.map(AttributeValue::SpeciesTypeKind)
            }
            Attribute::VerbatimCitation => self
                .verbatim_citation
                .clone()
                .map(AttributeValue::VerbatimCitation),
            Attribute::OriginalName => self.original_name.clone().map(AttributeValue::OriginalName),
            Attribute::TypeSpecimenSource => self
                .type_specimen_source
                .clone()
                .map(AttributeValue::TypeSpecimenSource),
            Attribute::Type => self.type_name.map(AttributeValue::Type),
        }
    }

    fn apply(&mut self, value: AttributeValue) {
        match value {
            AttributeValue::TypeLocality(id) => self.type_locality = Some(id),
            AttributeValue::TypeTags(tags) => self.type_tags = tags,
            AttributeValue::Collection(s) => self.collection = Some(s),
            AttributeValue::TypeSpecimen(s) => self.type_specimen = Some(s),
            AttributeValue::SpeciesTypeKind(kind) => self.species_type_kind = Some(kind),
            AttributeValue::VerbatimCitation(s) => self.verbatim_citation = Some(s),
            AttributeValue::OriginalName(s) => {
                self.root_name = root_name(&s);
                self.original_name = Some(s);
            }
            AttributeValue::TypeSpecimenSource(s) => self.type_specimen_source = Some(s),
            AttributeValue::Type(id) => self.type_name = Some(id),
        }
    }
}

/// Operations the pipeline performs against the canonical registry.
///
/// Entries are never created or deleted through this interface, with the
/// single exception of [`NameRegistry::add_variant_spelling`].
pub trait NameRegistry {
    fn get(&self, id: NameId) -> Option<&CanonicalName>;

    /// Entries whose `(original_name, authority)` equals the pair exactly.
    fn find_exact(&self, original_name: &str, authority: &str) -> Vec<NameId>;

    /// Entries whose root name equals `root` (case-insensitive).
    fn find_by_root(&self, root: &str) -> Vec<NameId>;

    fn find_by_authority(&self, authority: &str) -> Vec<NameId>;

    /// Accepted genus for a genus recorded as a junior synonym.
    fn accepted_genus(&self, genus: &str) -> Option<String>;

    fn set_attribute(&mut self, id: NameId, value: AttributeValue) -> Result<(), RegistryError>;

    /// Append `tag` unless an identical tag is already present.
    fn append_tag(&mut self, id: NameId, tag: Tag) -> Result<(), RegistryError>;

    /// Flag the entry's tags for re-derivation from its sources.
    fn request_tag_rederivation(&mut self, id: NameId) -> Result<(), RegistryError>;

    /// Record `spelling` as a new entry derived from `of`.
    fn add_variant_spelling(
        &mut self,
        of: NameId,
        spelling: &str,
        status: NomenclatureStatus,
    ) -> Result<NameId, RegistryError>;

    fn add_comment(&mut self, id: NameId, comment: AuditComment) -> Result<(), RegistryError>;
}

/// Serialized form of an [`InMemoryRegistry`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub names: Vec<CanonicalName>,
}

/// Registry held in memory, indexed by exact pair, root and authority.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    names: BTreeMap<NameId, CanonicalName>,
    by_pair: HashMap<(String, String), Vec<NameId>>,
    by_root: HashMap<String, Vec<NameId>>,
    by_authority: HashMap<String, Vec<NameId>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new();
        for name in snapshot.names {
            registry.insert(name);
        }
        registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            names: self.names.values().cloned().collect(),
        }
    }

    /// Load a JSON snapshot from disk.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let content = fs::read_to_string(path.as_ref())?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded {} names from {}",
            snapshot.names.len(),
            path.as_ref().display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current state as a pretty-printed JSON snapshot.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), IngestError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Insert or replace an entry, keeping the indexes in step.
    pub fn insert(&mut self, mut name: CanonicalName) -> NameId {
        if let Some(original) = &name.original_name {
            name.root_name = root_name(original);
        }
        let id = name.id;
        if let Some(previous) = self.names.remove(&id) {
            self.unindex(&previous);
        }
        self.index(&name);
        self.names.insert(id, name);
        id
    }

    pub fn next_id(&self) -> NameId {
        NameId(self.names.keys().next_back().map_or(1, |id| id.0 + 1))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalName> {
        self.names.values()
    }

    fn index(&mut self, name: &CanonicalName) {
        if let Some(original) = &name.original_name {
            self.by_pair
                .entry((original.clone(), name.authority.clone()))
                .or_default()
                .push(name.id);
        }
        self.by_root
            .entry(name.root_name.to_lowercase())
            .or_default()
            .push(name.id);
        self.by_authority
            .entry(name.authority.clone())
            .or_default()
            .push(name.id);
    }

    fn unindex(&mut self, name: &CanonicalName) {
        let id = name.id;
        if let Some(original) = &name.original_name {
            if let Some(ids) = self
                .by_pair
                .get_mut(&(original.clone(), name.authority.clone()))
            {
                ids.retain(|other| *other != id);
            }
        }
        if let Some(ids) = self.by_root.get_mut(&name.root_name.to_lowercase()) {
            ids.retain(|other| *other != id);
        }
        if let Some(ids) = self.by_authority.get_mut(&name.authority) {
            ids.retain(|other| *other != id);
        }
    }

    fn entry_mut(&mut self, id: NameId) -> Result<&mut CanonicalName, RegistryError> {
        self.names.get_mut(&id).ok_or(RegistryError::UnknownName(id))
    }
}

impl NameRegistry for InMemoryRegistry {
    fn get(&self, id: NameId) -> Option<&CanonicalName> {
        self.names.get(&id)
    }

    fn find_exact(&self, original_name: &str, authority: &str) -> Vec<NameId> {
        self.by_pair
            .get(&(original_name.to_string(), authority.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn find_by_root(&self, root: &str) -> Vec<NameId> {
        self.by_root
            .get(&root.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn find_by_authority(&self, authority: &str) -> Vec<NameId> {
        self.by_authority.get(authority).cloned().unwrap_or_default()
    }

    fn accepted_genus(&self, genus: &str) -> Option<String> {
        self.find_by_root(genus)
            .into_iter()
            .filter_map(|id| self.names.get(&id))
            .filter(|name| {
                name.status == NomenclatureStatus::Synonym
                    && name.original_name.as_deref() == Some(genus)
            })
            .find_map(|name| {
                let senior = self.names.get(&name.constructed_from?)?;
                senior.original_name.clone()
            })
    }

    fn set_attribute(&mut self, id: NameId, value: AttributeValue) -> Result<(), RegistryError> {
        let reindex = matches!(value, AttributeValue::OriginalName(_));
        let entry = self.entry_mut(id)?;
        if !reindex {
            entry.apply(value);
            return Ok(());
        }
        let mut updated = entry.clone();
        updated.apply(value);
        self.insert(updated);
        Ok(())
    }

    fn append_tag(&mut self, id: NameId, tag: Tag) -> Result<(), RegistryError> {
        let entry = self.entry_mut(id)?;
        if !entry.type_tags.contains(&tag) {
            entry.type_tags.push(tag);
        }
        Ok(())
    }

    fn request_tag_rederivation(&mut self, id: NameId) -> Result<(), RegistryError> {
        self.entry_mut(id)?.needs_tag_rederivation = true;
        Ok(())
    }

    fn add_variant_spelling(
        &mut self,
        of: NameId,
        spelling: &str,
        status: NomenclatureStatus,
    ) -> Result<NameId, RegistryError> {
        let base = self.names.get(&of).ok_or(RegistryError::UnknownName(of))?;
        let id = self.next_id();
        let variant = CanonicalName::new(id, spelling, &base.authority, base.year.as_deref())
            .with_status(status, Some(of));
        tracing::info!("Added {:?} spelling {:?} of {}", status, spelling, of);
        Ok(self.insert(variant))
    }

    fn add_comment(&mut self, id: NameId, comment: AuditComment) -> Result<(), RegistryError> {
        self.entry_mut(id)?.comments.push(comment);
        Ok(())
    }
}
