//! Human adjudication of merge conflicts.

use std::io::{self, BufRead, Write};

use crate::merge::MergeDecision;
use crate::registry::CanonicalName;

/// Decides whether a conflicting incoming value should be applied.
pub trait Reviewer {
    fn confirm(&mut self, decision: &MergeDecision, current: Option<&CanonicalName>) -> bool;
}

/// Declines everything. Used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineAll;

impl Reviewer for DeclineAll {
    fn confirm(&mut self, _decision: &MergeDecision, _current: Option<&CanonicalName>) -> bool {
        false
    }
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfirmAll;

impl Reviewer for ConfirmAll {
    fn confirm(&mut self, _decision: &MergeDecision, _current: Option<&CanonicalName>) -> bool {
        true
    }
}

/// Prompts on a terminal and reads a `y`/`n` answer.
pub struct ConsoleReviewer<I, O> {
    input: I,
    output: O,
}

impl ConsoleReviewer<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<I: BufRead, O: Write> ConsoleReviewer<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, decision: &MergeDecision, current: Option<&CanonicalName>) -> io::Result<bool> {
        if let Some(name) = current {
            writeln!(
                self.output,
                "{} {} {}",
                name.original_name.as_deref().unwrap_or("?"),
                name.authority,
                name.year.as_deref().unwrap_or("")
            )?;
        }
        writeln!(self.output, "  {}", decision)?;
        write!(self.output, "Apply incoming value? [y/N] ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

impl<I: BufRead, O: Write> Reviewer for ConsoleReviewer<I, O> {
    fn confirm(&mut self, decision: &MergeDecision, current: Option<&CanonicalName>) -> bool {
        match self.ask(decision, current) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Review prompt failed, declining: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::Outcome;
    use crate::registry::{AttributeValue, NameId};

    fn decision() -> MergeDecision {
        MergeDecision {
            name: NameId(1),
            attribute: crate::registry::Attribute::Collection,
            existing: Some(AttributeValue::Collection("BMNH".to_string())),
            incoming: AttributeValue::Collection("AMNH".to_string()),
            outcome: Outcome::Conflict,
            pages: "12".to_string(),
        }
    }

    #[test]
    fn test_console_reviewer_reads_answer() {
        let mut output = Vec::new();
        let mut reviewer = ConsoleReviewer::new(&b"yes\n"[..], &mut output);
        assert!(reviewer.confirm(&decision(), None));

        let prompt = String::from_utf8(output).unwrap();
        assert!(prompt.contains("#1 collection (p. 12): BMNH -> AMNH"));
    }

    #[test]
    fn test_console_reviewer_defaults_to_no() {
        let mut reviewer = ConsoleReviewer::new(&b"\n"[..], Vec::new());
        assert!(!reviewer.confirm(&decision(), None));

        let mut reviewer = ConsoleReviewer::new(&b""[..], Vec::new());
        assert!(!reviewer.confirm(&decision(), None));
    }
}
