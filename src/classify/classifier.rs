//! Line classification as an explicit finite-state machine.
//!
//! Each physical line is reduced to an [`Event`] (what the line looks like
//! and how its indentation moved) and fed through [`transition`], a pure
//! `(state, event) -> (kind, action)` table. [`LineClassifier`] only adds the
//! pattern tests and a short bounded history on top of that table.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::RecordKind;

static SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<label>[A-Z][A-Z\-]+(?: [A-Z][A-Z\-]+)*|[A-Z][a-z\-]+(?: [a-z\-]+)?)\s*:\s*(?P<rest>.*)$")
        .expect("Invalid section regex")
});

// An author name followed by a four-digit year at the end of the line.
static STRONG_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\p{Lu}[\p{L}'.\-]*,?\s+1[5-9]\d{2}[a-z]?\)?[.,]?$").expect("Invalid strong header regex")
});

static HIGH_TAXON_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?i:order|suborder|superfamily|family|subfamily|tribe|genus|subgenus)\s+[A-Z][A-Za-z]+|[A-Z]{3,}(?:IDAE|INAE|INI|OIDEA|FORMES))\b",
    )
    .expect("Invalid higher taxon regex")
});

/// Role of a physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Blank,
    Section,
    Continuation,
    TaxonHeader,
    HighTaxonHeader,
}

impl LineKind {
    fn is_field(self) -> bool {
        matches!(self, LineKind::Section | LineKind::Continuation)
    }

    fn is_header(self) -> bool {
        matches!(self, LineKind::TaxonHeader | LineKind::HighTaxonHeader)
    }
}

/// What the text of a line matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Blank,
    HighTaxon,
    Section,
    StrongHeader,
    Plain,
}

/// Input to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub signal: Signal,
    /// No indentation at all.
    pub at_margin: bool,
    /// Indentation dropped by more than one level since the last non-blank line.
    pub dropped: bool,
    /// Indented deeper than the last non-blank line.
    pub deeper: bool,
}

/// What the assembler should do with a classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Break,
    OpenRecord(RecordKind),
    OpenSection,
    Append,
}

/// Result of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub kind: LineKind,
    pub action: Action,
}

impl Step {
    fn to(kind: LineKind) -> Self {
        let action = match kind {
            LineKind::Blank => Action::Break,
            LineKind::Section => Action::OpenSection,
            LineKind::Continuation => Action::Append,
            LineKind::TaxonHeader => Action::OpenRecord(RecordKind::Taxon),
            LineKind::HighTaxonHeader => Action::OpenRecord(RecordKind::HigherTaxon),
        };
        Self { kind, action }
    }
}

/// The transition table.
///
/// `prev` is the kind of the immediately preceding line and `last_non_blank`
/// the most recent non-blank kind still in the history window. `None` means
/// the line cannot be placed.
pub fn transition(
    prev: Option<LineKind>,
    last_non_blank: Option<LineKind>,
    event: &Event,
) -> Option<Step> {
    use LineKind::*;

    let kind = match (event.signal, prev) {
        (Signal::Blank, _) => Blank,
        (Signal::HighTaxon, _) => HighTaxonHeader,
        (Signal::Section, _) => Section,
        (Signal::StrongHeader, _) if !event.deeper => TaxonHeader,

        (_, None) if event.at_margin => TaxonHeader,
        (_, None) => return None,

        (_, Some(Blank)) if event.at_margin => TaxonHeader,
        (_, Some(Blank)) => match last_non_blank {
            Some(kind) if kind.is_field() => Continuation,
            _ => return None,
        },

        (_, Some(kind)) if kind.is_header() && event.at_margin => TaxonHeader,
        (_, Some(kind)) if kind.is_header() => Continuation,

        (_, Some(_)) if event.dropped => TaxonHeader,
        (_, Some(_)) => Continuation,
    };
    Some(Step::to(kind))
}

/// Classified physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub kind: LineKind,
    pub action: Action,
    pub text: String,
    pub page: u32,
    pub indent: usize,
    /// Label of a section line, as written.
    pub label: Option<String>,
}

/// Typed outcome of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Classified(ClassifiedLine),
    Unrecognized { page: u32, text: String },
}

/// Optional regex overrides, as they appear in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternOverrides {
    pub section: Option<String>,
    pub strong_header: Option<String>,
    pub high_taxon_header: Option<String>,
}

/// The literal tests an extractor may customize.
#[derive(Debug, Clone)]
pub struct ClassifierPatterns {
    /// Must capture the label in a group named `label`.
    pub section: Regex,
    pub strong_header: Regex,
    pub high_taxon_header: Regex,
}

impl Default for ClassifierPatterns {
    fn default() -> Self {
        Self {
            section: SECTION.clone(),
            strong_header: STRONG_HEADER.clone(),
            high_taxon_header: HIGH_TAXON_HEADER.clone(),
        }
    }
}

impl ClassifierPatterns {
    /// Defaults with any configured overrides compiled in.
    pub fn with_overrides(overrides: &PatternOverrides) -> Result<Self, ConfigError> {
        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                field: field.to_string(),
                source,
            })
        };
        let mut patterns = Self::default();
        if let Some(p) = &overrides.section {
            patterns.section = compile("section", p)?;
        }
        if let Some(p) = &overrides.strong_header {
            patterns.strong_header = compile("strong_header", p)?;
        }
        if let Some(p) = &overrides.high_taxon_header {
            patterns.high_taxon_header = compile("high_taxon_header", p)?;
        }
        Ok(patterns)
    }
}

/// Classifies lines one at a time, remembering only the last few kinds.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    patterns: ClassifierPatterns,
    indent_unit: usize,
    capacity: usize,
    history: VecDeque<LineKind>,
    last_indent: Option<usize>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(ClassifierPatterns::default(), 2, 4)
    }
}

impl LineClassifier {
    pub fn new(patterns: ClassifierPatterns, indent_unit: usize, history: usize) -> Self {
        Self {
            patterns,
            indent_unit: indent_unit.max(1),
            capacity: history.max(1),
            history: VecDeque::with_capacity(history.max(1)),
            last_indent: None,
        }
    }

    /// Derive the event for a line without touching any state.
    pub fn event(&self, text: &str) -> (Event, usize, Option<String>) {
        let indent = text.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed = text.trim();
        let mut label = None;

        let signal = if trimmed.is_empty() {
            Signal::Blank
        } else if self.patterns.high_taxon_header.is_match(trimmed) {
            Signal::HighTaxon
        } else if let Some(caps) = self.patterns.section.captures(trimmed) {
            label = caps.name("label").map(|m| m.as_str().trim().to_string());
            Signal::Section
        } else if self.patterns.strong_header.is_match(trimmed) {
            Signal::StrongHeader
        } else {
            Signal::Plain
        };

        let level = indent / self.indent_unit;
        let (dropped, deeper) = match self.last_indent {
            Some(last) => (last / self.indent_unit > level + 1, indent > last),
            None => (false, false),
        };
        let event = Event {
            signal,
            at_margin: indent == 0,
            dropped,
            deeper,
        };
        (event, indent, label)
    }

    /// Classify the next line of the stream.
    pub fn classify(&mut self, page: u32, text: &str) -> LineOutcome {
        let (event, indent, label) = self.event(text);
        let prev = self.history.back().copied();
        let last_non_blank = self
            .history
            .iter()
            .rev()
            .copied()
            .find(|k| *k != LineKind::Blank);

        let Some(step) = transition(prev, last_non_blank, &event) else {
            return LineOutcome::Unrecognized {
                page,
                text: text.to_string(),
            };
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(step.kind);
        if step.kind != LineKind::Blank {
            self.last_indent = Some(indent);
        }

        LineOutcome::Classified(ClassifiedLine {
            kind: step.kind,
            action: step.action,
            text: text.to_string(),
            page,
            indent,
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(lines: &[&str]) -> Vec<Option<LineKind>> {
        let mut classifier = LineClassifier::default();
        lines
            .iter()
            .map(|line| match classifier.classify(1, line) {
                LineOutcome::Classified(c) => Some(c.kind),
                LineOutcome::Unrecognized { .. } => None,
            })
            .collect()
    }

    fn event(signal: Signal, at_margin: bool) -> Event {
        Event {
            signal,
            at_margin,
            dropped: false,
            deeper: false,
        }
    }

    #[test]
    fn test_margin_line_after_blank_opens_record() {
        let step = transition(
            Some(LineKind::Blank),
            Some(LineKind::Continuation),
            &event(Signal::Plain, true),
        )
        .unwrap();
        assert_eq!(step.kind, LineKind::TaxonHeader);
        assert_eq!(step.action, Action::OpenRecord(RecordKind::Taxon));
    }

    #[test]
    fn test_field_text_continues_unless_strong_header() {
        let plain = transition(
            Some(LineKind::Section),
            Some(LineKind::Section),
            &event(Signal::Plain, true),
        );
        assert_eq!(plain.unwrap().kind, LineKind::Continuation);

        let strong = transition(
            Some(LineKind::Continuation),
            Some(LineKind::Continuation),
            &event(Signal::StrongHeader, true),
        );
        assert_eq!(strong.unwrap().kind, LineKind::TaxonHeader);
    }

    #[test]
    fn test_indentation_drop_forces_header() {
        let mut e = event(Signal::Plain, false);
        e.dropped = true;
        let step = transition(Some(LineKind::Continuation), Some(LineKind::Continuation), &e);
        assert_eq!(step.unwrap().kind, LineKind::TaxonHeader);
    }

    #[test]
    fn test_indented_line_at_start_is_unrecognized() {
        assert_eq!(transition(None, None, &event(Signal::Plain, false)), None);
    }

    #[test]
    fn test_classifies_catalogue_entry() {
        let lines = [
            "FAMILY MURIDAE",
            "",
            "Mus alpinus Gray, 1843",
            "  Proc. Zool. Soc. London, p. 12, with",
            "  a long description.",
            "  TYPE LOCALITY: Alps of",
            "    Switzerland.",
            "",
            "Mus minor Lesson, 1827",
        ];

        assert_eq!(
            kinds(&lines),
            vec![
                Some(LineKind::HighTaxonHeader),
                Some(LineKind::Blank),
                Some(LineKind::TaxonHeader),
                Some(LineKind::Continuation),
                Some(LineKind::Continuation),
                Some(LineKind::Section),
                Some(LineKind::Continuation),
                Some(LineKind::Blank),
                Some(LineKind::TaxonHeader),
            ]
        );
    }

    #[test]
    fn test_section_label_is_captured() {
        let mut classifier = LineClassifier::default();
        classifier.classify(1, "Mus alpinus Gray, 1843");
        match classifier.classify(1, "  Distribution: Alps.") {
            LineOutcome::Classified(line) => {
                assert_eq!(line.kind, LineKind::Section);
                assert_eq!(line.label.as_deref(), Some("Distribution"));
                assert_eq!(line.indent, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_orphan_indented_line_is_unrecognized() {
        let mut classifier = LineClassifier::default();
        let outcome = classifier.classify(4, "   stray text");
        assert_eq!(
            outcome,
            LineOutcome::Unrecognized {
                page: 4,
                text: "   stray text".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let overrides = PatternOverrides {
            section: Some("([unclosed".to_string()),
            ..PatternOverrides::default()
        };
        let err = ClassifierPatterns::with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { ref field, .. } if field == "section"));
    }
}
