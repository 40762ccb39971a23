//! End-of-run summary.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::merge::{FollowUp, MergeDecision, MergeWriter, ReplaySummary};
use crate::registry::Attribute;
use crate::resolve::{NameResolver, ResolutionStats};

/// What a run did: fills per attribute, how names were matched, and every
/// item left for a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub extractor: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Records that came out of the extractor.
    pub records: usize,
    /// Records whose locality resolved to a region.
    pub localities_resolved: usize,
    /// Records handed to the merge writer.
    pub merged: usize,
    pub fills: BTreeMap<Attribute, usize>,
    pub resolution: ResolutionStats,

    pub deferred: Vec<MergeDecision>,
    pub conflicts: Vec<MergeDecision>,
    pub follow_ups: Vec<FollowUp>,
    pub review: ReplaySummary,
}

impl RunReport {
    pub fn begin(source: &str, extractor: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.to_string(),
            extractor: extractor.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            records: 0,
            localities_resolved: 0,
            merged: 0,
            fills: BTreeMap::new(),
            resolution: ResolutionStats::default(),
            deferred: Vec::new(),
            conflicts: Vec::new(),
            follow_ups: Vec::new(),
            review: ReplaySummary::default(),
        }
    }

    /// Copy the counters out of the run's resolver and writer.
    pub fn finish(&mut self, resolver: &NameResolver, writer: &MergeWriter, review: ReplaySummary) {
        self.finished_at = Some(Utc::now());
        self.merged = writer.merged();
        self.fills = writer.fills().clone();
        self.resolution = resolver.stats().clone();
        self.deferred = writer.deferred().to_vec();
        self.conflicts = writer.conflicts().to_vec();
        self.follow_ups = writer.follow_ups().to_vec();
        self.review = review;
        tracing::info!(
            "Run {} finished: {} records, {} merged, {} fills, match rate {:.1}%",
            self.run_id,
            self.records,
            self.merged,
            self.total_fills(),
            self.resolution.match_rate() * 100.0
        );
    }

    pub fn total_fills(&self) -> usize {
        self.fills.values().sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({} via {})", self.run_id, self.source, self.extractor)?;
        if self.dry_run {
            writeln!(f, "  dry run: nothing was written")?;
        }
        writeln!(f, "  records:             {}", self.records)?;
        writeln!(f, "  localities resolved: {}", self.localities_resolved)?;
        writeln!(f, "  merged:              {}", self.merged)?;

        writeln!(f, "Fills:")?;
        if self.fills.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (attribute, count) in &self.fills {
            writeln!(f, "  {:<22} {}", attribute.as_str(), count)?;
        }

        writeln!(
            f,
            "Name resolution ({:.1}% matched):",
            self.resolution.match_rate() * 100.0
        )?;
        for (strategy, count) in &self.resolution.by_strategy {
            writeln!(f, "  {:<22} {}", strategy.to_string(), count)?;
        }
        writeln!(f, "  {:<22} {}", "ambiguous", self.resolution.ambiguous)?;
        writeln!(f, "  {:<22} {}", "not found", self.resolution.not_found)?;
        writeln!(f, "  {:<22} {}", "sketchy", self.resolution.sketchy)?;

        writeln!(f, "Needs review:")?;
        writeln!(f, "  deferred:   {}", self.deferred.len())?;
        writeln!(
            f,
            "  conflicts:  {} ({} confirmed, {} declined)",
            self.conflicts.len(),
            self.review.confirmed,
            self.review.declined
        )?;
        writeln!(f, "  follow-ups: {}", self.follow_ups.len())?;
        for decision in self.deferred.iter().chain(&self.conflicts) {
            writeln!(f, "    {}", decision)?;
        }
        for follow_up in &self.follow_ups {
            writeln!(
                f,
                "    {} (p. {}): {}",
                follow_up.name, follow_up.pages, follow_up.reason
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{Resolution, Strategy};
    use crate::registry::NameId;

    #[test]
    fn test_display_lists_counts() {
        let mut report = RunReport::begin("Allen 1939", "catalogue", true);
        report.records = 3;
        report.fills.insert(Attribute::TypeLocality, 2);
        report.resolution.record(&Resolution::Found {
            id: NameId(1),
            strategy: Strategy::Variant,
            sketchy: false,
        });
        report.resolution.record(&Resolution::NotFound);

        let text = report.to_string();
        assert!(text.contains("Allen 1939 via catalogue"));
        assert!(text.contains("dry run"));
        assert!(text.contains("type_locality"));
        assert!(text.contains("variant"));
        assert!(text.contains("50.0% matched"));
    }

    #[test]
    fn test_serializes_to_json() {
        let report = RunReport::begin("Allen 1939", "catalogue", false);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "Allen 1939");
        assert!(json.get("finished_at").is_none());
        assert_eq!(json["run_id"].as_str().unwrap().len(), 36);
    }
}
