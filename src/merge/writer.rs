//! Writing merge decisions to the registry.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::merge::policy::decide;
use crate::merge::review::Reviewer;
use crate::merge::{MergeDecision, MergeOptions, Outcome};
use crate::record::{CandidateRecord, SpeciesTypeKind};
use crate::registry::{
    Attribute, AttributeValue, AuditComment, NameId, NameRegistry, NomenclatureStatus, RegionTree,
};

/// A record that was written but needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub name: NameId,
    pub pages: String,
    pub reason: String,
}

/// Result of [`MergeWriter::replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub confirmed: usize,
    pub declined: usize,
}

/// Applies merge decisions record by record.
///
/// Writes are incremental: a record's decisions reach the registry as soon
/// as [`MergeWriter::merge`] returns. Conflicts are only collected, for
/// [`MergeWriter::replay`] at the end of the run.
#[derive(Debug, Default)]
pub struct MergeWriter {
    options: MergeOptions,
    fills: BTreeMap<Attribute, usize>,
    deferred: Vec<MergeDecision>,
    conflicts: Vec<MergeDecision>,
    applied: BTreeSet<usize>,
    follow_ups: Vec<FollowUp>,
    merged: usize,
}

impl MergeWriter {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Fill counts per attribute. Dry runs count what would have been filled.
    pub fn fills(&self) -> &BTreeMap<Attribute, usize> {
        &self.fills
    }

    pub fn deferred(&self) -> &[MergeDecision] {
        &self.deferred
    }

    pub fn conflicts(&self) -> &[MergeDecision] {
        &self.conflicts
    }

    pub fn follow_ups(&self) -> &[FollowUp] {
        &self.follow_ups
    }

    /// Number of records merged.
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Merge one resolved record into `registry`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The registry holding the record's resolved name
    /// * `regions` - Region hierarchy used for locality containment
    /// * `record` - A record with `name_obj` set
    ///
    /// # Returns
    ///
    /// The decisions taken. Unresolved records yield an empty list.
    pub fn merge<R, T>(
        &mut self,
        registry: &mut R,
        regions: &T,
        record: &CandidateRecord,
    ) -> Result<Vec<MergeDecision>, RegistryError>
    where
        R: NameRegistry + ?Sized,
        T: RegionTree + ?Sized,
    {
        let Some(id) = record.name_obj() else {
            return Ok(Vec::new());
        };
        if registry.get(id).is_none() {
            return Err(RegistryError::UnknownName(id));
        }

        let decisions = decide(&*registry, regions, &self.options, record);
        for decision in &decisions {
            self.apply(registry, decision)?;
        }

        if !self.options.dry_run {
            self.add_audit_comment(registry, id, record)?;
        }
        let holotype = record.species_type_kind == Some(SpeciesTypeKind::Holotype);
        if self.options.require_holotype && !holotype {
            tracing::warn!("{} (p. {}): no holotype given", id, record.page_range());
            self.follow_ups.push(FollowUp {
                name: id,
                pages: record.page_range(),
                reason: "no holotype".to_string(),
            });
        }
        self.merged += 1;
        Ok(decisions)
    }

    fn apply<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
        decision: &MergeDecision,
    ) -> Result<(), RegistryError> {
        let write = !self.options.dry_run;
        match &decision.outcome {
            Outcome::Fill => {
                if write {
                    registry.set_attribute(decision.name, decision.incoming.clone())?;
                }
                *self.fills.entry(decision.attribute).or_default() += 1;
                tracing::info!("Filled {}", decision);
            }
            Outcome::AppendTags(tags) => {
                if write {
                    for tag in tags {
                        registry.append_tag(decision.name, tag.clone())?;
                    }
                }
                *self.fills.entry(decision.attribute).or_default() += 1;
                tracing::info!("{}: appended {} tag(s)", decision.name, tags.len());
            }
            Outcome::AnnotateCitation(text) => {
                if write {
                    registry.set_attribute(
                        decision.name,
                        AttributeValue::VerbatimCitation(text.clone()),
                    )?;
                }
            }
            Outcome::RederiveTags(_) => {
                if write {
                    registry.request_tag_rederivation(decision.name)?;
                }
                self.deferred.push(decision.clone());
            }
            Outcome::DeferredForReview => self.deferred.push(decision.clone()),
            Outcome::SpellingVariant | Outcome::Conflict => {
                tracing::warn!("Conflict: {}", decision);
                self.conflicts.push(decision.clone());
            }
            Outcome::Unchanged | Outcome::KeptMoreSpecific => {}
        }
        Ok(())
    }

    fn add_audit_comment<R: NameRegistry + ?Sized>(
        &self,
        registry: &mut R,
        id: NameId,
        record: &CandidateRecord,
    ) -> Result<(), RegistryError> {
        let Some(name) = registry.get(id) else {
            return Err(RegistryError::UnknownName(id));
        };
        if name.comments.iter().any(|c| c.source == self.options.source) {
            return Ok(());
        }
        let text = record.raw_text.clone().unwrap_or_default();
        registry.add_comment(
            id,
            AuditComment {
                source: self.options.source.clone(),
                page_range: record.page_range(),
                text,
                created_at: Utc::now(),
            },
        )
    }

    /// Put every collected conflict to `reviewer` and apply the confirmed
    /// ones. A confirmed spelling difference becomes a new incorrect
    /// subsequent spelling; other confirmations overwrite. Declined
    /// conflicts stay listed for batch review. Conflicts confirmed by an
    /// earlier replay are not put again.
    pub fn replay<R: NameRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
        reviewer: &mut dyn Reviewer,
    ) -> Result<ReplaySummary, RegistryError> {
        let mut summary = ReplaySummary::default();
        for (index, decision) in self.conflicts.iter().enumerate() {
            if self.applied.contains(&index) {
                continue;
            }
            if !reviewer.confirm(decision, registry.get(decision.name)) {
                summary.declined += 1;
                continue;
            }
            summary.confirmed += 1;
            if self.options.dry_run {
                continue;
            }
            self.applied.insert(index);
            match (&decision.outcome, &decision.incoming) {
                (Outcome::SpellingVariant, AttributeValue::OriginalName(spelling)) => {
                    registry.add_variant_spelling(
                        decision.name,
                        spelling,
                        NomenclatureStatus::IncorrectSubsequentSpelling,
                    )?;
                }
                _ => registry.set_attribute(decision.name, decision.incoming.clone())?,
            }
        }
        tracing::info!(
            "Review: {} confirmed, {} declined",
            summary.confirmed,
            summary.declined
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{ConfirmAll, DeclineAll};
    use crate::record::{RecordKind, Tag, TagKind};
    use crate::registry::{CanonicalName, InMemoryRegionTree, InMemoryRegistry, RegionSpec};

    fn setup() -> (InMemoryRegistry, InMemoryRegionTree) {
        let specs: Vec<RegionSpec> =
            serde_yaml::from_str("- name: Peru\n  children:\n    - name: Cusco\n").unwrap();
        let regions = InMemoryRegionTree::from_specs(&specs).unwrap();
        let mut name = CanonicalName::new(NameId(1), "Mus alpinus", "Gray", Some("1843"));
        name.collection = Some("BMNH".to_string());
        let mut registry = InMemoryRegistry::new();
        registry.insert(name);
        (registry, regions)
    }

    fn record(regions: &InMemoryRegionTree) -> CandidateRecord {
        let mut record = CandidateRecord::new(RecordKind::Taxon, 12);
        record.add_page(13);
        record.raw_text = Some("Mus alpinus Gray, 1843".to_string());
        record.set_name_obj(NameId(1));
        record.type_locality = regions.find("Cusco");
        record.type_tags = vec![Tag::new(TagKind::Collector, "Jones")];
        record.collection = Some("AMNH".to_string());
        record
    }

    fn options() -> MergeOptions {
        MergeOptions {
            source: "Catalogue 1990".to_string(),
            ..MergeOptions::default()
        }
    }

    #[test]
    fn test_merge_fills_and_collects_conflicts() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(options());

        writer.merge(&mut registry, &regions, &record(&regions)).unwrap();

        let name = registry.get(NameId(1)).unwrap();
        assert_eq!(name.type_locality, regions.find("Cusco"));
        assert_eq!(name.type_tags, vec![Tag::new(TagKind::Collector, "Jones")]);
        assert_eq!(name.collection.as_deref(), Some("BMNH"));
        assert_eq!(name.comments.len(), 1);
        assert_eq!(name.comments[0].page_range, "12-13");
        assert_eq!(writer.fills().get(&Attribute::TypeLocality), Some(&1));
        assert_eq!(writer.conflicts().len(), 1);
        assert_eq!(writer.merged(), 1);
    }

    #[test]
    fn test_audit_comment_is_idempotent() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(options());
        let record = record(&regions);

        writer.merge(&mut registry, &regions, &record).unwrap();
        writer.merge(&mut registry, &regions, &record).unwrap();

        assert_eq!(registry.get(NameId(1)).unwrap().comments.len(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(MergeOptions {
            dry_run: true,
            ..options()
        });

        writer.merge(&mut registry, &regions, &record(&regions)).unwrap();
        writer.replay(&mut registry, &mut ConfirmAll).unwrap();

        let name = registry.get(NameId(1)).unwrap();
        assert_eq!(name.type_locality, None);
        assert!(name.type_tags.is_empty());
        assert!(name.comments.is_empty());
        assert_eq!(name.collection.as_deref(), Some("BMNH"));
        assert_eq!(writer.fills().get(&Attribute::TypeLocality), Some(&1));
    }

    #[test]
    fn test_holotype_follow_up() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(MergeOptions {
            require_holotype: true,
            ..options()
        });

        writer.merge(&mut registry, &regions, &record(&regions)).unwrap();

        assert_eq!(writer.follow_ups().len(), 1);
        assert_eq!(writer.follow_ups()[0].reason, "no holotype");
        assert_eq!(
            registry.get(NameId(1)).unwrap().type_locality,
            regions.find("Cusco")
        );
    }

    #[test]
    fn test_lectotype_is_not_a_holotype() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(MergeOptions {
            require_holotype: true,
            ..options()
        });

        let mut lectotype = record(&regions);
        lectotype.type_specimen = Some("BMNH 7.1.1.1".to_string());
        lectotype.species_type_kind = Some(SpeciesTypeKind::Lectotype);
        writer.merge(&mut registry, &regions, &lectotype).unwrap();
        assert_eq!(writer.follow_ups().len(), 1);

        let mut holotype = lectotype.clone();
        holotype.species_type_kind = Some(SpeciesTypeKind::Holotype);
        writer.merge(&mut registry, &regions, &holotype).unwrap();
        assert_eq!(writer.follow_ups().len(), 1);
    }

    #[test]
    fn test_replay_applies_confirmed() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(options());
        let mut record = record(&regions);
        record.original_name = Some("Mus alpina".to_string());
        writer.merge(&mut registry, &regions, &record).unwrap();

        let declined = writer.replay(&mut registry, &mut DeclineAll).unwrap();
        assert_eq!(declined, ReplaySummary { confirmed: 0, declined: 2 });
        assert_eq!(registry.len(), 1);

        let confirmed = writer.replay(&mut registry, &mut ConfirmAll).unwrap();
        assert_eq!(confirmed.confirmed, 2);
        assert_eq!(registry.get(NameId(1)).unwrap().collection.as_deref(), Some("AMNH"));
        let variant = registry.find_exact("Mus alpina", "Gray");
        assert_eq!(variant.len(), 1);
        assert_eq!(
            registry.get(variant[0]).unwrap().status,
            NomenclatureStatus::IncorrectSubsequentSpelling
        );
        assert_eq!(
            registry.get(NameId(1)).unwrap().original_name.as_deref(),
            Some("Mus alpinus")
        );
    }

    #[test]
    fn test_second_replay_applies_nothing() {
        let (mut registry, regions) = setup();
        let mut writer = MergeWriter::new(options());
        let mut record = record(&regions);
        record.original_name = Some("Mus alpina".to_string());
        writer.merge(&mut registry, &regions, &record).unwrap();

        writer.replay(&mut registry, &mut ConfirmAll).unwrap();
        let after_first = registry.get(NameId(1)).unwrap().clone();
        let names = registry.len();

        let again = writer.replay(&mut registry, &mut ConfirmAll).unwrap();
        assert_eq!(again, ReplaySummary::default());
        assert_eq!(registry.len(), names);
        assert_eq!(registry.find_exact("Mus alpina", "Gray").len(), 1);
        assert_eq!(registry.get(NameId(1)).unwrap(), &after_first);
        assert_eq!(writer.conflicts().len(), 2);
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let (mut registry, regions) = setup();
        let mut record = CandidateRecord::new(RecordKind::Taxon, 1);
        record.type_locality = regions.find("Peru");
        record.set_name_obj(NameId(42));

        let result = MergeWriter::new(options()).merge(&mut registry, &regions, &record);
        assert_eq!(result, Err(RegistryError::UnknownName(NameId(42))));
    }
}
