//! Source-specific extraction.
//!
//! The core stages only split a document into records. A [`RecordExtractor`]
//! knows one publication's conventions and turns a cleaned record's header
//! and sections into the typed fields the resolvers and the merge writer
//! use. Extractors are registered by name in an [`ExtractorRegistry`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::IngestError;
use crate::record::{CandidateRecord, RecordKind, SpeciesTypeKind, Tag, TagKind, HEADER_FIELD};

/// Turns a cleaned record into a typed one.
pub trait RecordExtractor: Send + Sync {
    /// Registry key, e.g. `"catalogue"`.
    fn name(&self) -> &str;

    /// Extract typed fields from `record`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The record with typed fields filled in
    /// * `Ok(None)` - The record carries nothing to merge (e.g. a family heading)
    /// * `Err(_)` - The record breaks the publication's format
    fn extract(&self, record: CandidateRecord) -> Result<Option<CandidateRecord>, IngestError>;
}

/// A [`RecordExtractor`] backed by a closure.
pub struct FnExtractor<F> {
    name: String,
    func: F,
}

/// Wrap a closure as a named extractor.
pub fn from_fn<F>(name: impl Into<String>, func: F) -> FnExtractor<F>
where
    F: Fn(CandidateRecord) -> Result<Option<CandidateRecord>, IngestError> + Send + Sync,
{
    FnExtractor {
        name: name.into(),
        func,
    }
}

impl<F> RecordExtractor for FnExtractor<F>
where
    F: Fn(CandidateRecord) -> Result<Option<CandidateRecord>, IngestError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, record: CandidateRecord) -> Result<Option<CandidateRecord>, IngestError> {
        (self.func)(record)
    }
}

/// Extractors keyed by name.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Box<dyn RecordExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// A registry holding the extractors shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CatalogueExtractor::default()));
        registry
    }

    /// Register an extractor under its own name, replacing any previous one.
    pub fn register(&mut self, extractor: Box<dyn RecordExtractor>) {
        let name = extractor.name().to_string();
        self.extractors.insert(name, extractor);
    }

    /// Look an extractor up by name.
    pub fn get(&self, name: &str) -> Result<&dyn RecordExtractor, IngestError> {
        self.extractors
            .get(name)
            .map(|extractor| extractor.as_ref())
            .ok_or_else(|| IngestError::UnknownExtractor(name.to_string()))
    }

    pub fn has_extractor(&self, name: &str) -> bool {
        self.extractors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list_extractors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extractors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

static CATALOGUE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<number>\d+)\.\s+)?(?P<name>[A-Z][a-z]+(?:\s+\([A-Z][a-z]+\))?(?:\s+[a-z\-]+){1,2})\s+(?P<author>\p{Lu}[^,]*?),\s+(?P<year>\d{4})[a-z]?\.?\s*(?P<rest>.*)$",
    )
    .expect("valid catalogue header pattern")
});

static INLINE_TYPE_LOCALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btype\s+locality\s*:\s*").expect("valid type locality pattern"));

static COLLECTION_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<code>[A-Z]{2,})\b").expect("valid collection code pattern"));

const TYPE_SECTIONS: [(&str, SpeciesTypeKind); 4] = [
    ("holotype", SpeciesTypeKind::Holotype),
    ("lectotype", SpeciesTypeKind::Lectotype),
    ("neotype", SpeciesTypeKind::Neotype),
    ("syntypes", SpeciesTypeKind::Syntypes),
];

/// Extractor for numbered checklist entries of the form
///
/// ```text
/// 1234. Mus alpinus Gray, 1843. Proc. Zool. Soc. 12. TYPE LOCALITY: Switzerland.
/// ```
///
/// The locality may also come as its own `TYPE LOCALITY:` section. Type
/// material sections (`Holotype:`, `Lectotype:`, ...) set the specimen and
/// its kind; a `Collector:` section becomes a collector tag. Anything else
/// stays in the extension map.
#[derive(Debug, Clone, Default)]
pub struct CatalogueExtractor {
    /// Sections a species record must carry; a missing one is fatal.
    pub required_sections: Vec<String>,
}

impl CatalogueExtractor {
    pub fn requiring(sections: &[&str]) -> Self {
        Self {
            required_sections: sections.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecordExtractor for CatalogueExtractor {
    fn name(&self) -> &str {
        "catalogue"
    }

    fn extract(&self, mut record: CandidateRecord) -> Result<Option<CandidateRecord>, IngestError> {
        if record.kind == RecordKind::HigherTaxon {
            return Ok(None);
        }
        let Some(header) = record.field_text(HEADER_FIELD).map(str::to_string) else {
            return Err(IngestError::MissingSection {
                pages: record.pages.clone(),
                section: HEADER_FIELD.to_string(),
            });
        };
        let Some(caps) = CATALOGUE_HEADER.captures(&header) else {
            return Err(IngestError::MalformedRecord {
                extractor: self.name().to_string(),
                pages: record.pages.clone(),
                text: header,
            });
        };

        record.original_name = Some(caps["name"].split_whitespace().collect::<Vec<_>>().join(" "));
        record.authority = Some(caps["author"].trim().to_string());
        record.year = Some(caps["year"].to_string());
        if let Some(number) = caps.name("number") {
            record.set_field("number", number.as_str());
        }

        let rest = caps["rest"].trim();
        let (citation, inline_locality) = match INLINE_TYPE_LOCALITY.find(rest) {
            Some(m) => (&rest[..m.start()], Some(&rest[m.end()..])),
            None => (rest, None),
        };
        let citation = citation.trim().trim_end_matches('.').trim();
        if !citation.is_empty() {
            record.set_field("citation", citation);
        }

        let section_locality = record.take_field("type_locality");
        record.loc = section_locality
            .as_deref()
            .or(inline_locality)
            .map(|loc| loc.trim().trim_end_matches('.').trim().to_string())
            .filter(|loc| !loc.is_empty());

        for (section, kind) in TYPE_SECTIONS {
            if let Some(specimen) = record.take_field(section) {
                let specimen = specimen.trim().trim_end_matches('.').to_string();
                record.collection = COLLECTION_CODE
                    .captures(&specimen)
                    .map(|caps| caps["code"].to_string());
                record.species_type_kind = Some(kind);
                record.type_specimen = Some(specimen);
                break;
            }
        }
        if let Some(collector) = record.take_field("collector") {
            record
                .type_tags
                .push(Tag::new(TagKind::Collector, collector.trim().trim_end_matches('.')));
        }

        for section in &self.required_sections {
            let present = match section.as_str() {
                "type_locality" => record.loc.is_some(),
                other => record.fields.contains_key(other),
            };
            if !present {
                return Err(IngestError::MissingSection {
                    pages: record.pages.clone(),
                    section: section.clone(),
                });
            }
        }
        Ok(Some(record))
    }
}
