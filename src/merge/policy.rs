//! Per-attribute merge policy.

use crate::merge::{MergeDecision, MergeOptions, Outcome};
use crate::record::{CandidateRecord, Tag};
use crate::registry::{root_name, AttributeValue, CanonicalName, NameRegistry, RegionTree};

/// Typed attribute values carried by `record`, in merge order.
pub fn incoming_values(record: &CandidateRecord) -> Vec<AttributeValue> {
    let mut values = Vec::new();
    if let Some(region) = record.type_locality {
        values.push(AttributeValue::TypeLocality(region));
    }
    if !record.type_tags.is_empty() {
        values.push(AttributeValue::TypeTags(record.type_tags.clone()));
    }
    if let Some(collection) = &record.collection {
        values.push(AttributeValue::Collection(collection.clone()));
    }
    if let Some(specimen) = &record.type_specimen {
        values.push(AttributeValue::TypeSpecimen(specimen.clone()));
    }
    if let Some(kind) = record.species_type_kind {
        values.push(AttributeValue::SpeciesTypeKind(kind));
    }
    if let Some(citation) = &record.verbatim_citation {
        values.push(AttributeValue::VerbatimCitation(citation.clone()));
    }
    if let Some(name) = &record.original_name {
        values.push(AttributeValue::OriginalName(name.clone()));
    }
    if let Some(source) = &record.type_specimen_source {
        values.push(AttributeValue::TypeSpecimenSource(source.clone()));
    }
    if let Some(id) = record.type_name {
        values.push(AttributeValue::Type(id));
    }
    values
}

/// Compare a resolved record with its canonical name.
///
/// Pure: nothing is written. Returns an empty list when the record has no
/// resolved name or the name is missing from `registry`.
pub fn decide<R, T>(
    registry: &R,
    regions: &T,
    options: &MergeOptions,
    record: &CandidateRecord,
) -> Vec<MergeDecision>
where
    R: NameRegistry + ?Sized,
    T: RegionTree + ?Sized,
{
    let Some(name) = record.name_obj().and_then(|id| registry.get(id)) else {
        return Vec::new();
    };
    let pages = record.page_range();

    let mut decisions = Vec::new();
    for incoming in incoming_values(record) {
        let attribute = incoming.attribute();
        let existing = name.attribute(attribute);
        let outcomes = match &existing {
            None => vec![Outcome::Fill],
            Some(existing) if *existing == incoming => vec![Outcome::Unchanged],
            Some(existing) => differing(name, regions, options, existing, &incoming),
        };
        for outcome in outcomes {
            decisions.push(MergeDecision {
                name: name.id,
                attribute,
                existing: existing.clone(),
                incoming: incoming.clone(),
                outcome,
                pages: pages.clone(),
            });
        }
    }
    decisions
}

fn differing<T: RegionTree + ?Sized>(
    name: &CanonicalName,
    regions: &T,
    options: &MergeOptions,
    existing: &AttributeValue,
    incoming: &AttributeValue,
) -> Vec<Outcome> {
    match (existing, incoming) {
        (AttributeValue::TypeLocality(current), AttributeValue::TypeLocality(new)) => {
            if regions.is_ancestor(*new, *current) {
                vec![Outcome::KeptMoreSpecific]
            } else {
                vec![Outcome::Conflict]
            }
        }
        (AttributeValue::TypeTags(_), AttributeValue::TypeTags(new)) => {
            merge_tags(&name.type_tags, new, options)
        }
        (AttributeValue::VerbatimCitation(current), AttributeValue::VerbatimCitation(new)) => {
            let note = format!("[{}]", new);
            if current.contains(&note) {
                vec![Outcome::Unchanged]
            } else {
                vec![Outcome::AnnotateCitation(format!("{} {}", current, note))]
            }
        }
        (AttributeValue::OriginalName(current), AttributeValue::OriginalName(new)) => {
            if root_name(current) != root_name(new) {
                vec![Outcome::SpellingVariant]
            } else {
                vec![Outcome::DeferredForReview]
            }
        }
        _ => vec![Outcome::Conflict],
    }
}

fn merge_tags(existing: &[Tag], incoming: &[Tag], options: &MergeOptions) -> Vec<Outcome> {
    let mut append = Vec::new();
    let mut rederive = Vec::new();
    for tag in incoming {
        if existing.contains(tag) || append.contains(tag) || rederive.contains(tag) {
            continue;
        }
        let kind_present = existing.iter().any(|t| t.kind == tag.kind);
        if !kind_present || options.multi_valued_tags.contains(&tag.kind) {
            append.push(tag.clone());
        } else {
            rederive.push(tag.clone());
        }
    }

    let mut outcomes = Vec::new();
    if !append.is_empty() {
        outcomes.push(Outcome::AppendTags(append));
    }
    if !rederive.is_empty() {
        outcomes.push(Outcome::RederiveTags(rederive));
    }
    if outcomes.is_empty() {
        outcomes.push(Outcome::Unchanged);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::Category;
    use crate::record::{RecordKind, TagKind};
    use crate::registry::{Attribute, InMemoryRegionTree, InMemoryRegistry, NameId, RegionSpec};

    fn setup() -> (InMemoryRegistry, InMemoryRegionTree) {
        let specs: Vec<RegionSpec> = serde_yaml::from_str(
            "- name: Peru\n  children:\n    - name: Cusco\n- name: Chile\n",
        )
        .unwrap();
        let regions = InMemoryRegionTree::from_specs(&specs).unwrap();

        let mut name = CanonicalName::new(NameId(1), "Mus alpinus", "Gray", Some("1843"));
        name.type_locality = regions.find("Cusco");
        name.type_tags = vec![
            Tag::new(TagKind::Collector, "Smith"),
            Tag::new(TagKind::Date, "1840"),
        ];
        name.verbatim_citation = Some("P.Z.S. 1843: 12".to_string());
        name.collection = Some("BMNH".to_string());
        let mut registry = InMemoryRegistry::new();
        registry.insert(name);
        (registry, regions)
    }

    fn record() -> CandidateRecord {
        let mut record = CandidateRecord::new(RecordKind::Taxon, 12);
        record.set_name_obj(NameId(1));
        record
    }

    #[test]
    fn test_vaguer_locality_is_kept_out() {
        let (registry, regions) = setup();
        let mut record = record();
        record.type_locality = regions.find("Peru");

        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].outcome, Outcome::KeptMoreSpecific);
        assert!(!decisions[0].outcome.mutates());

        record.type_locality = regions.find("Chile");
        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions[0].outcome, Outcome::Conflict);
        assert_eq!(decisions[0].category(), Category::Conflicting);
    }

    #[test]
    fn test_tags_append_or_request_rederivation() {
        let (registry, regions) = setup();
        let mut record = record();
        record.type_tags = vec![
            Tag::new(TagKind::Collector, "Smith"),
            Tag::new(TagKind::Collector, "Jones"),
            Tag::new(TagKind::Date, "1841"),
            Tag::new(TagKind::Altitude, "3000 m"),
        ];

        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        let outcomes: Vec<&Outcome> = decisions.iter().map(|d| &d.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                &Outcome::AppendTags(vec![
                    Tag::new(TagKind::Collector, "Jones"),
                    Tag::new(TagKind::Altitude, "3000 m"),
                ]),
                &Outcome::RederiveTags(vec![Tag::new(TagKind::Date, "1841")]),
            ]
        );
    }

    #[test]
    fn test_citation_is_annotated_once() {
        let (mut registry, regions) = setup();
        let mut record = record();
        record.verbatim_citation = Some("Ann. Mag. 1844: 3".to_string());

        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        let Outcome::AnnotateCitation(text) = &decisions[0].outcome else {
            panic!("expected an annotation, got {:?}", decisions[0].outcome);
        };
        assert_eq!(text, "P.Z.S. 1843: 12 [Ann. Mag. 1844: 3]");

        registry
            .set_attribute(NameId(1), AttributeValue::VerbatimCitation(text.clone()))
            .unwrap();
        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions[0].outcome, Outcome::Unchanged);
    }

    #[test]
    fn test_original_name_discrepancies() {
        let (registry, regions) = setup();
        let mut record = record();

        record.original_name = Some("Mus alpina".to_string());
        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions[0].outcome, Outcome::SpellingVariant);

        record.original_name = Some("Mus (Mus) alpinus".to_string());
        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions[0].outcome, Outcome::DeferredForReview);
    }

    #[test]
    fn test_fill_unchanged_and_conflict() {
        let (registry, regions) = setup();
        let mut record = record();
        record.collection = Some("BMNH".to_string());
        record.type_specimen = Some("BMNH 43.1.2.3".to_string());
        record.species_type_kind = Some(crate::record::SpeciesTypeKind::Holotype);

        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        let outcomes: Vec<(Attribute, &Outcome)> =
            decisions.iter().map(|d| (d.attribute, &d.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![
                (Attribute::Collection, &Outcome::Unchanged),
                (Attribute::TypeSpecimen, &Outcome::Fill),
                (Attribute::SpeciesTypeKind, &Outcome::Fill),
            ]
        );

        record.collection = Some("AMNH".to_string());
        let decisions = decide(&registry, &regions, &MergeOptions::default(), &record);
        assert_eq!(decisions[0].outcome, Outcome::Conflict);
    }

    #[test]
    fn test_unresolved_record_has_no_decisions() {
        let (registry, regions) = setup();
        let mut record = CandidateRecord::new(RecordKind::Taxon, 1);
        record.collection = Some("BMNH".to_string());
        assert!(decide(&registry, &regions, &MergeOptions::default(), &record).is_empty());
    }
}
