//! Folding classified lines into records, and normalizing field text.

use convert_case::{Case, Casing};

use crate::classify::classifier::{Action, ClassifiedLine};
use crate::error::IngestError;
use crate::record::{CandidateRecord, FieldValue, HEADER_FIELD};

/// Field key for a section label: `"TYPE LOCALITY"` becomes `"type_locality"`.
pub fn field_key(label: &str) -> String {
    label.trim().to_case(Case::Snake)
}

/// Groups a classified line stream into raw [`CandidateRecord`]s.
///
/// Header lines open a record, section lines open a field and continuation
/// lines extend the current field. Field values stay as raw physical lines;
/// run [`clean_text`] afterwards to fold them.
pub struct RecordAssembler<I> {
    lines: I,
    current: Option<CandidateRecord>,
    field: String,
    raw: Vec<String>,
    failed: bool,
}

impl<I> RecordAssembler<I> {
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            current: None,
            field: HEADER_FIELD.to_string(),
            raw: Vec::new(),
            failed: false,
        }
    }

    fn finish(&mut self) -> Option<CandidateRecord> {
        let mut record = self.current.take()?;
        record.raw_text = Some(std::mem::take(&mut self.raw).join("\n"));
        Some(record)
    }
}

impl<I> Iterator for RecordAssembler<I>
where
    I: Iterator<Item = Result<ClassifiedLine, IngestError>>,
{
    type Item = Result<CandidateRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                None => return self.finish().map(Ok),
            };
            let text = line.text.trim();

            match line.action {
                Action::Break => continue,
                Action::OpenRecord(kind) => {
                    let finished = self.finish();
                    let mut record = CandidateRecord::new(kind, line.page);
                    record.push_line(HEADER_FIELD, text);
                    self.current = Some(record);
                    self.field = HEADER_FIELD.to_string();
                    self.raw.push(text.to_string());
                    if let Some(record) = finished {
                        return Some(Ok(record));
                    }
                }
                Action::OpenSection | Action::Append => {
                    let Some(record) = self.current.as_mut() else {
                        self.failed = true;
                        return Some(Err(IngestError::UnrecognizedLine {
                            page: line.page,
                            text: line.text,
                        }));
                    };
                    if line.action == Action::OpenSection {
                        self.field = line
                            .label
                            .as_deref()
                            .map(field_key)
                            .unwrap_or_else(|| HEADER_FIELD.to_string());
                    }
                    record.add_page(line.page);
                    record.push_line(&self.field, text);
                    self.raw.push(text.to_string());
                }
            }
        }
    }
}

/// Fold one field value into a single normalized string.
///
/// Soft line-break hyphenation is removed, whitespace collapsed, a redundant
/// copy of the field's own label at the start is dropped, and the result is
/// trimmed. Applying it to its own output changes nothing.
pub fn clean_value(field: &str, value: &str) -> String {
    let unwrapped = value
        .replace("-\n", "")
        .replace("\u{ad}\n", "")
        .replace('\u{ad}', "");
    let collapsed = unwrapped.split_whitespace().collect::<Vec<_>>().join(" ");
    if field == HEADER_FIELD {
        return collapsed;
    }
    strip_label(field, &collapsed).to_string()
}

fn strip_label<'a>(field: &str, value: &'a str) -> &'a str {
    let label: String = field.chars().map(separator_to_space).collect();
    let mut rest = value.trim();
    loop {
        let Some(head) = rest.get(..label.len()) else {
            return rest;
        };
        let same = head
            .chars()
            .map(separator_to_space)
            .zip(label.chars())
            .all(|(a, b)| a.eq_ignore_ascii_case(&b));
        let boundary = rest[label.len()..]
            .chars()
            .next()
            .map_or(true, |c| c == ':' || c == '.' || c.is_whitespace());
        if label.is_empty() || !same || !boundary {
            return rest;
        }
        rest = rest[label.len()..].trim_start_matches(|c: char| c == ':' || c == '.' || c.is_whitespace());
    }
}

fn separator_to_space(c: char) -> char {
    if c == '_' || c == '-' {
        ' '
    } else {
        c
    }
}

/// Fold every extension field of `record` to text. `pages` and `raw_text`
/// are left alone.
pub fn clean_text(mut record: CandidateRecord) -> CandidateRecord {
    for (field, value) in record.fields.iter_mut() {
        let cleaned = clean_value(field, &value.joined());
        *value = FieldValue::Text(cleaned);
    }
    record
}
