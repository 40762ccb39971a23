//! Line classification and record assembly.

pub mod assembler;
pub mod classifier;

pub use assembler::{clean_text, clean_value, field_key, RecordAssembler};
pub use classifier::{
    transition, Action, ClassifiedLine, ClassifierPatterns, Event, LineClassifier, LineKind,
    LineOutcome, PatternOverrides, Signal, Step,
};

use crate::error::{IngestError, LayoutError};

/// Stream adapter returned by [`classify_lines`].
///
/// An unrecognized line ends the stream with
/// [`IngestError::UnrecognizedLine`].
pub struct ClassifyLines<I> {
    lines: I,
    classifier: LineClassifier,
    failed: bool,
}

/// Classify a `(page, line)` stream.
pub fn classify_lines<I>(lines: I, classifier: LineClassifier) -> ClassifyLines<I>
where
    I: Iterator<Item = Result<(u32, String), LayoutError>>,
{
    ClassifyLines {
        lines,
        classifier,
        failed: false,
    }
}

impl<I> Iterator for ClassifyLines<I>
where
    I: Iterator<Item = Result<(u32, String), LayoutError>>,
{
    type Item = Result<ClassifiedLine, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = match self.lines.next()? {
            Ok((page, text)) => match self.classifier.classify(page, &text) {
                LineOutcome::Classified(line) => Ok(line),
                LineOutcome::Unrecognized { page, text } => {
                    Err(IngestError::UnrecognizedLine { page, text })
                }
            },
            Err(err) => Err(err.into()),
        };
        self.failed = result.is_err();
        Some(result)
    }
}
