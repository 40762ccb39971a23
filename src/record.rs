//! Candidate records and the small value types attached to them.
//!
//! A [`CandidateRecord`] is built line by line while a source document is
//! processed. The fields every later stage depends on are typed; anything
//! publication-specific lives in the ordered [`CandidateRecord::fields`] map.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::registry::{NameId, RegionId};

/// Field holding the record's header line(s).
pub const HEADER_FIELD: &str = "header";

/// Value of an open extension field.
///
/// Raw physical lines are collected as [`FieldValue::Lines`] and folded into
/// [`FieldValue::Text`] by [`clean_text`](crate::classify::clean_text).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldValue {
    Lines(Vec<String>),
    Text(String),
}

impl FieldValue {
    /// The value as text, if it has already been folded.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Lines(_) => None,
        }
    }

    /// All physical lines joined with `\n`.
    pub fn joined(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Lines(lines) => lines.join("\n"),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Lines(lines) => write!(f, "{}", lines.join(" / ")),
        }
    }
}

/// Whether a record opens a species-group entry or a higher taxon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Taxon,
    HigherTaxon,
}

/// Category of physical type material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeciesTypeKind {
    Holotype,
    Lectotype,
    Syntypes,
    Neotype,
    Nonexistent,
}

impl fmt::Display for SpeciesTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpeciesTypeKind::Holotype => "holotype",
            SpeciesTypeKind::Lectotype => "lectotype",
            SpeciesTypeKind::Syntypes => "syntypes",
            SpeciesTypeKind::Neotype => "neotype",
            SpeciesTypeKind::Nonexistent => "nonexistent",
        };
        f.write_str(label)
    }
}

/// Kind of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Collector,
    Coordinates,
    LocationDetail,
    SpecimenDetail,
    Date,
    Age,
    Gender,
    Organ,
    Altitude,
    Host,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TagKind::Collector => "collector",
            TagKind::Coordinates => "coordinates",
            TagKind::LocationDetail => "location detail",
            TagKind::SpecimenDetail => "specimen detail",
            TagKind::Date => "date",
            TagKind::Age => "age",
            TagKind::Gender => "gender",
            TagKind::Organ => "organ",
            TagKind::Altitude => "altitude",
            TagKind::Host => "host",
        };
        f.write_str(label)
    }
}

/// A typed annotation on a name. Two tags are the same fact only when both
/// kind and text match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    pub text: String,
}

impl Tag {
    pub fn new(kind: TagKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.text)
    }
}

/// An in-flight record extracted from one source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub kind: RecordKind,
    /// Source pages, in order, without repeats.
    pub pages: Vec<u32>,
    /// Unprocessed text snapshot, set once the record's lines are classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Free-text type locality, before region resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,

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
    /// Type taxon, for genus-group names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<NameId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_obj: Option<NameId>,

    /// Source-specific extras, in insertion order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldValue>,
}

impl CandidateRecord {
    /// Start a record on `page`.
    pub fn new(kind: RecordKind, page: u32) -> Self {
        Self {
            kind,
            pages: vec![page],
            ..Self::default()
        }
    }

    /// Note that the record continues on `page`.
    pub fn add_page(&mut self, page: u32) {
        if self.pages.last() != Some(&page) {
            self.pages.push(page);
        }
    }

    /// Append a raw physical line to `field`, creating it if needed.
    ///
    /// A field already folded to text is reopened as lines.
    pub fn push_line(&mut self, field: &str, line: impl Into<String>) {
        let line = line.into();
        match self.fields.get_mut(field) {
            Some(value) => match value {
                FieldValue::Lines(lines) => lines.push(line),
                FieldValue::Text(text) => {
                    let existing = std::mem::take(text);
                    *value = FieldValue::Lines(vec![existing, line]);
                }
            },
            None => {
                self.fields
                    .insert(field.to_string(), FieldValue::Lines(vec![line]));
            }
        }
    }

    pub fn set_field(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(field.into(), FieldValue::Text(value.into()));
    }

    /// Text of a folded extension field.
    pub fn field_text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    /// Remove an extension field and return its text, folded or not.
    pub fn take_field(&mut self, field: &str) -> Option<String> {
        self.fields.shift_remove(field).map(|v| v.joined())
    }

    /// The canonical name this record resolved to, if any.
    pub fn name_obj(&self) -> Option<NameId> {
        self.name_obj
    }

    /// Attach the resolved canonical name.
    ///
    /// Resolution is monotonic: once set, the link is never replaced or
    /// cleared. Returns `false` when a different name was already attached.
    pub fn set_name_obj(&mut self, id: NameId) -> bool {
        match self.name_obj {
            None => {
                self.name_obj = Some(id);
                true
            }
            Some(existing) => existing == id,
        }
    }

    /// Page range label, e.g. `"12"` or `"12-14"`.
    pub fn page_range(&self) -> String {
        match (self.pages.first(), self.pages.last()) {
            (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
            (Some(first), _) => first.to_string(),
            _ => String::new(),
        }
    }
}
