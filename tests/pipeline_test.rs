//! End-to-end runs through every stage.

use std::io::Write;

use nomenclator::merge::{ConfirmAll, DeclineAll};
use nomenclator::registry::{Attribute, CanonicalName, InMemoryRegionTree, InMemoryRegistry, NameId};
use nomenclator::resolve::Strategy;
use nomenclator::{
    CandidateRecord, CatalogueExtractor, ExtractorRegistry, IngestError, NameRegistry, NdjsonWriter,
    Pipeline, PipelineConfig, RegionTree,
};

fn seeded_registry() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::new();
    registry.insert(CanonicalName::new(NameId(1), "Mus alpinus", "Gray", Some("1843")));
    registry
}

fn region_tree() -> InMemoryRegionTree {
    let mut tree = InMemoryRegionTree::new();
    tree.add(None, "Switzerland").unwrap();
    tree
}

#[test]
fn test_catalogue_line_fills_type_locality() {
    let lines = [
        "\x0c1",
        "1234. Mus alpinus Gray, 1843. Some citation. TYPE LOCALITY: Switzerland.",
    ];
    let mut registry = seeded_registry();
    let before = registry.get(NameId(1)).unwrap().clone();
    let regions = region_tree();
    let switzerland = regions.find("Switzerland");
    assert!(switzerland.is_some());

    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut seen: Vec<CandidateRecord> = Vec::new();
    let report = pipeline
        .run(
            lines,
            &CatalogueExtractor::default(),
            &mut registry,
            &regions,
            &mut DeclineAll,
            |record| {
                seen.push(record.clone());
                Ok(())
            },
        )
        .unwrap();

    assert_eq!(seen.len(), 1);
    let record = &seen[0];
    assert_eq!(record.original_name.as_deref(), Some("Mus alpinus"));
    assert_eq!(record.authority.as_deref(), Some("Gray"));
    assert_eq!(record.year.as_deref(), Some("1843"));
    assert_eq!(record.type_locality, switzerland);
    assert_eq!(record.name_obj(), Some(NameId(1)));

    let after = registry.get(NameId(1)).unwrap();
    assert_eq!(after.type_locality, switzerland);
    assert_eq!(before.type_locality, None);
    for attribute in Attribute::ALL {
        if attribute != Attribute::TypeLocality {
            assert_eq!(after.attribute(attribute), before.attribute(attribute), "{}", attribute);
        }
    }
    assert_eq!(after.comments.len(), 1);

    assert_eq!(report.records, 1);
    assert_eq!(report.total_fills(), 1);
    assert_eq!(report.fills.get(&Attribute::TypeLocality), Some(&1));
    assert_eq!(report.resolution.by_strategy.get(&Strategy::Exact), Some(&1));
    assert!(report.conflicts.is_empty());
    assert!(report.finished_at.is_some());
}

#[test]
fn test_rerun_changes_nothing() {
    let lines = [
        "\x0c1",
        "1234. Mus alpinus Gray, 1843. Some citation. TYPE LOCALITY: Switzerland.",
    ];
    let mut registry = seeded_registry();
    let regions = region_tree();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let extractor = CatalogueExtractor::default();

    pipeline
        .run(lines, &extractor, &mut registry, &regions, &mut DeclineAll, |_| Ok(()))
        .unwrap();
    let first = registry.get(NameId(1)).unwrap().clone();

    let report = pipeline
        .run(lines, &extractor, &mut registry, &regions, &mut DeclineAll, |_| Ok(()))
        .unwrap();

    assert_eq!(report.total_fills(), 0);
    assert_eq!(registry.get(NameId(1)).unwrap(), &first);
}

#[test]
fn test_two_column_page_yields_records_in_reading_order() {
    let left = [
        "12. Sorex araneus L., 1758.",
        "  Syst. Nat., ed. 10, p. 53.",
        "  TYPE LOCALITY: Sweden.",
        "",
        "13. Sorex minutus L., 1766.",
        "  Syst. Nat., ed. 12, p. 73.",
        "  TYPE LOCALITY: Siberia.",
    ];
    let right = [
        "14. Talpa europaea L., 1758.",
        "  Syst. Nat., ed. 10, p. 52.",
        "  TYPE LOCALITY: England.",
        "",
        "15. Erinaceus europaeus L., 1758.",
        "  Syst. Nat., ed. 10, p. 52.",
        "  TYPE LOCALITY: Wamlingbo.",
    ];
    let mut lines = vec!["\x0c7".to_string()];
    lines.extend(left.iter().zip(right.iter()).map(|(l, r)| {
        format!("{:<32}    {}", l, r).trim_end().to_string()
    }));

    let config = PipelineConfig::from_yaml("layout:\n  expect_two_columns: true\n  min_score: 3\n").unwrap();
    let pipeline = Pipeline::new(config).unwrap();
    let extractor = CatalogueExtractor::default();

    let names: Vec<String> = pipeline
        .extracted(&lines, &extractor)
        .unwrap()
        .map(|record| record.map(|r| r.original_name.unwrap_or_default()))
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        names,
        vec!["Sorex araneus", "Sorex minutus", "Talpa europaea", "Erinaceus europaeus"]
    );
}

#[test]
fn test_unrecognized_line_aborts_with_text() {
    let lines = ["\x0c1", "    orphan indented text"];
    let mut registry = seeded_registry();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    let err = pipeline
        .run(
            lines,
            &CatalogueExtractor::default(),
            &mut registry,
            &region_tree(),
            &mut DeclineAll,
            |_| Ok(()),
        )
        .unwrap_err();

    match err {
        IngestError::UnrecognizedLine { page, text } => {
            assert_eq!(page, 1);
            assert!(text.contains("orphan indented text"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_confirmed_conflict_is_applied_at_end_of_run() {
    let mut registry = seeded_registry();
    let mut regions = InMemoryRegionTree::new();
    let switzerland = regions.add(None, "Switzerland").unwrap();
    let italy = regions.add(None, "Italy").unwrap();
    registry
        .set_attribute(NameId(1), nomenclator::registry::AttributeValue::TypeLocality(italy))
        .unwrap();

    let lines = ["\x0c1", "1. Mus alpinus Gray, 1843. TYPE LOCALITY: Switzerland."];
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let report = pipeline
        .run(lines, &CatalogueExtractor::default(), &mut registry, &regions, &mut ConfirmAll, |_| Ok(()))
        .unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.review.confirmed, 1);
    assert_eq!(registry.get(NameId(1)).unwrap().type_locality, Some(switzerland));
}

#[test]
fn test_dry_run_from_config_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("registry.json");
    let regions_path = dir.path().join("regions.yaml");
    let config_path = dir.path().join("pipeline.yaml");
    let output_path = dir.path().join("records.ndjson");

    seeded_registry().save_json(&registry_path).unwrap();
    std::fs::write(&regions_path, "- name: Switzerland\n").unwrap();
    std::fs::write(&config_path, "merge:\n  dry_run: true\n  source: Allen 1939\n").unwrap();

    let config = PipelineConfig::load_from_file(&config_path).unwrap();
    let mut registry = InMemoryRegistry::load_json(&registry_path).unwrap();
    let regions = InMemoryRegionTree::load_from_file(&regions_path).unwrap();
    let extractors = ExtractorRegistry::default();
    let extractor = extractors.get("catalogue").unwrap();

    let mut writer = NdjsonWriter::new(std::fs::File::create(&output_path).unwrap());
    let lines = ["\x0c1", "1234. Mus alpinus Gray, 1843. Some citation. TYPE LOCALITY: Switzerland."];
    let report = Pipeline::new(config)
        .unwrap()
        .run(lines, extractor, &mut registry, &regions, &mut DeclineAll, |record| {
            writer.write(record)
        })
        .unwrap();
    writer.flush().unwrap();

    assert!(report.dry_run);
    assert_eq!(report.source, "Allen 1939");
    assert_eq!(report.fills.get(&Attribute::TypeLocality), Some(&1));
    let name = registry.get(NameId(1)).unwrap();
    assert_eq!(name.type_locality, None);
    assert!(name.comments.is_empty());

    let exported = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(exported.lines().count(), 1);
    let record: CandidateRecord = serde_json::from_str(exported.lines().next().unwrap()).unwrap();
    assert_eq!(record.loc.as_deref(), Some("Switzerland"));

    let mut sink = Vec::new();
    writeln!(sink, "{}", report).unwrap();
    assert!(String::from_utf8(sink).unwrap().contains("dry run"));
}
