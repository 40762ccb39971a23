//! Splitting a line stream into pages and gating on page-number continuity.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::layout::Page;

const FORM_FEED: char = '\x0c';

/// How [`PageValidator`] reacts to a gap in page numbering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    /// Stop with [`LayoutError::PageGap`] on the first gap.
    #[default]
    Strict,
    /// Log the gap and keep going.
    Permissive,
}

/// Lazily groups lines into pages.
///
/// A line starting with a form feed opens a new page. The page number is the
/// first whitespace-separated token of that marker line if it is numeric,
/// otherwise the last one; the rest of the marker line is a running head and
/// is dropped.
pub struct PageSegmenter<I> {
    lines: I,
    current: Option<Page>,
    /// Marker line of a page whose number is unknown (bare form feed).
    unnumbered: Option<String>,
    finished: bool,
}

/// Start segmenting `lines` into pages.
pub fn segment_pages<I>(lines: I) -> PageSegmenter<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    PageSegmenter {
        lines: lines.into_iter(),
        current: None,
        unnumbered: None,
        finished: false,
    }
}

/// Page number carried by a marker line (form feed already removed).
pub fn parse_page_number(marker: &str) -> Option<u32> {
    let mut tokens = marker.split_whitespace();
    let first = tokens.next()?;
    if let Ok(number) = first.parse() {
        return Some(number);
    }
    tokens.last().and_then(|last| last.parse().ok())
}

impl<I> Iterator for PageSegmenter<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Result<Page, LayoutError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let Some(line) = self.lines.next() else {
                self.finished = true;
                return self.current.take().map(Ok);
            };
            let line = line.as_ref().replace('\u{a0}', " ");

            if let Some(marker) = line.strip_prefix(FORM_FEED) {
                let finished_page = self.current.take();
                match parse_page_number(marker) {
                    Some(number) => {
                        self.unnumbered = None;
                        self.current = Some(Page::new(number, Vec::new()));
                    }
                    None => {
                        // Trailing form feeds are common; only fail if text follows.
                        self.unnumbered = Some(line.clone());
                    }
                }
                if let Some(page) = finished_page {
                    return Some(Ok(page));
                }
                continue;
            }

            match self.current.as_mut() {
                Some(page) => page.lines.push(line),
                None => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(marker) = self.unnumbered.take() {
                        self.finished = true;
                        return Some(Err(LayoutError::MissingPageNumber { line: marker }));
                    }
                    tracing::debug!("dropping text before the first page marker: {:?}", line);
                }
            }
        }
    }
}

/// Checks `page[i + 1] == page[i] + 1` over a page stream.
pub struct PageValidator<I> {
    pages: I,
    mode: PaginationMode,
    last: Option<u32>,
    failed: bool,
}

impl<I> PageValidator<I> {
    pub fn new(pages: I, mode: PaginationMode) -> Self {
        Self {
            pages,
            mode,
            last: None,
            failed: false,
        }
    }
}

impl<I> Iterator for PageValidator<I>
where
    I: Iterator<Item = Result<Page, LayoutError>>,
{
    type Item = Result<Page, LayoutError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let page = match self.pages.next()? {
            Ok(page) => page,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };

        if let Some(last) = self.last {
            // Nothing may follow the last representable page number.
            let next = last.checked_add(1);
            if next != Some(page.number) {
                let expected = next.unwrap_or(u32::MAX);
                match self.mode {
                    PaginationMode::Strict => {
                        self.failed = true;
                        return Some(Err(LayoutError::PageGap {
                            expected,
                            found: page.number,
                        }));
                    }
                    PaginationMode::Permissive => {
                        tracing::warn!(
                            "page numbering gap: expected {}, found {}",
                            expected,
                            page.number
                        );
                    }
                }
            }
        }
        self.last = Some(page.number);
        Some(Ok(page))
    }
}
