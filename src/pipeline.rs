//! Stage composition and the per-run driver.
//!
//! Every stage is a lazy adapter over the previous one, so a publication
//! flows through one record at a time:
//!
//! ```text
//! lines -> segment_pages -> validate_pages -> align_columns -> page_lines
//!       -> classify_lines -> assemble_records -> clean_records
//!       -> extract_records -> (resolve localities and names) -> merge
//! ```
//!
//! [`Pipeline::records`] stops before the merge and yields enriched records.
//! [`Pipeline::run`] merges each record as it arrives and returns a
//! [`RunReport`].

use crate::classify::{
    clean_text, classify_lines, ClassifiedLine, ClassifyLines, LineClassifier, RecordAssembler,
};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, IngestError, LayoutError};
use crate::extract::RecordExtractor;
use crate::layout::{page_lines, segment_pages, ColumnAligner, PageStreamExt};
use crate::merge::{MergeWriter, Reviewer};
use crate::record::CandidateRecord;
use crate::registry::{NameRegistry, RegionTree};
use crate::report::RunReport;
use crate::resolve::{NameResolver, RegionResolver, Resolution};

/// A lazy stream of records.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<CandidateRecord, IngestError>> + 'a>;

/// Adapters over a `(page, line)` stream.
pub trait LineStreamExt: Iterator<Item = Result<(u32, String), LayoutError>> + Sized {
    fn classify_lines(self, classifier: LineClassifier) -> ClassifyLines<Self> {
        classify_lines(self, classifier)
    }
}

impl<I> LineStreamExt for I where I: Iterator<Item = Result<(u32, String), LayoutError>> {}

/// Adapters over a classified line stream.
pub trait ClassifiedStreamExt: Iterator<Item = Result<ClassifiedLine, IngestError>> + Sized {
    fn assemble_records(self) -> RecordAssembler<Self> {
        RecordAssembler::new(self)
    }
}

impl<I> ClassifiedStreamExt for I where I: Iterator<Item = Result<ClassifiedLine, IngestError>> {}

/// Adapters over a record stream.
pub trait RecordStreamExt: Iterator<Item = Result<CandidateRecord, IngestError>> + Sized {
    /// Fold every field to normalized text.
    fn clean_records(self) -> CleanRecords<Self> {
        CleanRecords { inner: self }
    }

    /// Run `extractor` over each record, dropping the ones it skips.
    fn extract_records(self, extractor: &dyn RecordExtractor) -> ExtractRecords<'_, Self> {
        ExtractRecords {
            inner: self,
            extractor,
            failed: false,
        }
    }
}

impl<I> RecordStreamExt for I where I: Iterator<Item = Result<CandidateRecord, IngestError>> {}

/// Iterator returned by [`RecordStreamExt::clean_records`].
pub struct CleanRecords<I> {
    inner: I,
}

impl<I> Iterator for CleanRecords<I>
where
    I: Iterator<Item = Result<CandidateRecord, IngestError>>,
{
    type Item = Result<CandidateRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| record.map(clean_text))
    }
}

/// Iterator returned by [`RecordStreamExt::extract_records`].
pub struct ExtractRecords<'a, I> {
    inner: I,
    extractor: &'a dyn RecordExtractor,
    failed: bool,
}

impl<I> Iterator for ExtractRecords<'_, I>
where
    I: Iterator<Item = Result<CandidateRecord, IngestError>>,
{
    type Item = Result<CandidateRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let result = match self.inner.next()? {
                Ok(record) => match self.extractor.extract(record) {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => continue,
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            self.failed = result.is_err();
            return Some(result);
        }
    }
}

/// Runs publications through every stage with one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    aligner: ColumnAligner,
    regions: RegionResolver,
}

impl Pipeline {
    /// Build a pipeline, checking the configuration's pattern overrides.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.classifier.build()?;
        Ok(Self {
            aligner: config.column_aligner(),
            regions: RegionResolver::new(config.regions.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A fresh name resolver for one batch.
    pub fn name_resolver(&self) -> NameResolver {
        NameResolver::new(self.config.resolver.clone())
    }

    /// Layout, classification, assembly, cleaning and extraction, lazily.
    pub fn extracted<'a, L>(
        &'a self,
        lines: L,
        extractor: &'a dyn RecordExtractor,
    ) -> Result<RecordStream<'a>, IngestError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        L::IntoIter: 'a,
    {
        let classifier = self.config.classifier.build()?;
        let pages = segment_pages(lines)
            .validate_pages(self.config.layout.pagination)
            .align_columns(&self.aligner);
        let records = page_lines(pages)
            .classify_lines(classifier)
            .assemble_records()
            .clean_records()
            .extract_records(extractor);
        Ok(Box::new(records))
    }

    /// Resolve the record's locality and name in place.
    ///
    /// Both are best-effort: misses leave the fields unset.
    pub fn enrich<R, T>(
        &self,
        record: &mut CandidateRecord,
        registry: &R,
        regions: &T,
        resolver: &mut NameResolver,
    ) -> Resolution
    where
        R: NameRegistry + ?Sized,
        T: RegionTree + ?Sized,
    {
        if record.type_locality.is_none() {
            if let Some(loc) = record.loc.as_deref() {
                record.type_locality = self.regions.resolve_locality(regions, loc);
                if record.type_locality.is_none() {
                    tracing::info!("p. {}: unresolved locality {:?}", record.page_range(), loc);
                }
            }
        }
        resolver.resolve_record(registry, record)
    }

    /// Enriched records, without merging.
    pub fn records<'a, L, R, T>(
        &'a self,
        lines: L,
        extractor: &'a dyn RecordExtractor,
        registry: &'a R,
        regions: &'a T,
        resolver: &'a mut NameResolver,
    ) -> Result<RecordStream<'a>, IngestError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        L::IntoIter: 'a,
        R: NameRegistry + ?Sized,
        T: RegionTree + ?Sized,
    {
        let records = self.extracted(lines, extractor)?.map(move |record| {
            let mut record = record?;
            self.enrich(&mut record, registry, regions, resolver);
            Ok(record)
        });
        Ok(Box::new(records))
    }

    /// Process a whole publication.
    ///
    /// # Arguments
    ///
    /// * `lines` - The publication's text, line by line
    /// * `extractor` - Publication-specific extractor
    /// * `registry` - Registry to resolve against and merge into
    /// * `regions` - Region hierarchy
    /// * `reviewer` - Adjudicates the run's conflicts once all records are merged
    /// * `on_record` - Called with every enriched record, e.g. to export it
    ///
    /// # Returns
    ///
    /// The run report. A structural error aborts the run; merges already
    /// made stay in the registry.
    pub fn run<L, R, T, F>(
        &self,
        lines: L,
        extractor: &dyn RecordExtractor,
        registry: &mut R,
        regions: &T,
        reviewer: &mut dyn Reviewer,
        mut on_record: F,
    ) -> Result<RunReport, IngestError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        R: NameRegistry + ?Sized,
        T: RegionTree + ?Sized,
        F: FnMut(&CandidateRecord) -> Result<(), IngestError>,
    {
        let merge = &self.config.merge;
        let mut report = RunReport::begin(&merge.source, extractor.name(), merge.dry_run);
        tracing::info!(
            "Run {} started: {} via {}",
            report.run_id,
            report.source,
            report.extractor
        );
        let mut resolver = self.name_resolver();
        let mut writer = MergeWriter::new(merge.clone());

        for record in self.extracted(lines, extractor)? {
            let mut record = record?;
            report.records += 1;
            self.enrich(&mut record, &*registry, regions, &mut resolver);
            if record.type_locality.is_some() {
                report.localities_resolved += 1;
            }
            writer.merge(registry, regions, &record)?;
            on_record(&record)?;
        }

        let review = writer.replay(registry, reviewer)?;
        report.finish(&resolver, &writer, review);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CatalogueExtractor;
    use crate::merge::DeclineAll;
    use crate::registry::{Attribute, CanonicalName, InMemoryRegionTree, InMemoryRegistry, NameId, RegionSpec};

    const TEXT: &[&str] = &[
        "\x0c1",
        "FAMILY MURIDAE",
        "",
        "1. Mus alpinus Gray, 1843. Proc. Zool. Soc. 12.",
        "  TYPE LOCALITY: Bern,",
        "    Switzerland.",
        "",
        "\x0c2",
        "2. Mus minor Lesson, 1827. Zool. 1: 2. TYPE LOCALITY: Atlantis.",
    ];

    fn fixtures() -> (InMemoryRegistry, InMemoryRegionTree) {
        let specs: Vec<RegionSpec> = serde_yaml::from_str(
            "- name: Switzerland\n  children:\n    - name: Bern\n",
        )
        .unwrap();
        let mut registry = InMemoryRegistry::new();
        registry.insert(CanonicalName::new(NameId(1), "Mus alpinus", "J. Gray", Some("1843")));
        (registry, InMemoryRegionTree::from_specs(&specs).unwrap())
    }

    #[test]
    fn test_records_are_enriched_lazily() {
        let (registry, regions) = fixtures();
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let extractor = CatalogueExtractor::default();
        let mut resolver = pipeline.name_resolver();

        let records: Vec<CandidateRecord> = pipeline
            .records(TEXT.iter(), &extractor, &registry, &regions, &mut resolver)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].loc.as_deref(), Some("Bern, Switzerland"));
        assert_eq!(records[0].type_locality, regions.find("Bern"));
        assert_eq!(records[0].name_obj(), Some(NameId(1)));
        assert_eq!(records[1].pages, vec![2]);
        assert_eq!(records[1].type_locality, None);
        assert_eq!(records[1].name_obj(), None);
        assert_eq!(resolver.stats().not_found, 1);
    }

    #[test]
    fn test_run_merges_and_reports() {
        let (mut registry, regions) = fixtures();
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut exported = Vec::new();

        let report = pipeline
            .run(
                TEXT.iter(),
                &CatalogueExtractor::default(),
                &mut registry,
                &regions,
                &mut DeclineAll,
                |record| {
                    exported.push(record.pages.clone());
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(report.localities_resolved, 1);
        assert_eq!(report.fills.get(&Attribute::TypeLocality), Some(&1));
        assert_eq!(exported, vec![vec![1], vec![2]]);
        assert_eq!(registry.get(NameId(1)).unwrap().type_locality, regions.find("Bern"));
    }

    #[test]
    fn test_structural_error_aborts() {
        let (mut registry, regions) = fixtures();
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let lines = [
            "\x0c1",
            "1. Mus alpinus Gray, 1843.",
            "2. Mus minor Lesson, 1827.",
            "\x0c3",
            "3. Mus major Lesson, 1827.",
        ];

        let err = pipeline
            .run(
                lines,
                &CatalogueExtractor::default(),
                &mut registry,
                &regions,
                &mut DeclineAll,
                |_| Ok(()),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Layout(LayoutError::PageGap { expected: 2, found: 3 })
        ));
        assert_eq!(registry.get(NameId(1)).unwrap().comments.len(), 1);
    }
}
