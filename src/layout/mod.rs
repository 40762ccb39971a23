//! Page segmentation and column realignment.
//!
//! Text dumps arrive as one flat stream of lines with form-feed page markers.
//! [`segment_pages`] splits that stream into [`Page`]s, [`PageStreamExt`]
//! layers the pagination gate and column realignment on top, and
//! [`page_lines`] flattens pages back into `(page, line)` pairs for the
//! line classifier.

pub mod columns;
pub mod pages;

pub use columns::{ColumnAligner, ColumnOptions, ColumnSplit};
pub use pages::{segment_pages, PageSegmenter, PageValidator, PaginationMode};

use crate::error::LayoutError;

/// One physical page of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub lines: Vec<String>,
}

impl Page {
    pub fn new(number: u32, lines: Vec<String>) -> Self {
        Self { number, lines }
    }
}

/// Stage adapters over a stream of pages.
pub trait PageStreamExt: Iterator<Item = Result<Page, LayoutError>> + Sized {
    /// Check that page numbers increase by exactly one.
    fn validate_pages(self, mode: PaginationMode) -> PageValidator<Self> {
        PageValidator::new(self, mode)
    }

    /// Rewrite two-column pages into single-column reading order.
    fn align_columns(self, aligner: &ColumnAligner) -> AlignColumns<'_, Self> {
        AlignColumns {
            inner: self,
            aligner,
        }
    }
}

impl<I> PageStreamExt for I where I: Iterator<Item = Result<Page, LayoutError>> {}

/// Iterator returned by [`PageStreamExt::align_columns`].
pub struct AlignColumns<'a, I> {
    inner: I,
    aligner: &'a ColumnAligner,
}

impl<I> Iterator for AlignColumns<'_, I>
where
    I: Iterator<Item = Result<Page, LayoutError>>,
{
    type Item = Result<Page, LayoutError>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.inner.next()?;
        Some(page.and_then(|page| self.aligner.align(page)))
    }
}

/// Flatten pages into `(page_number, line)` pairs, keeping the stream lazy.
pub fn page_lines<I>(pages: I) -> impl Iterator<Item = Result<(u32, String), LayoutError>>
where
    I: Iterator<Item = Result<Page, LayoutError>>,
{
    pages.flat_map(|page| -> Box<dyn Iterator<Item = Result<(u32, String), LayoutError>>> {
        match page {
            Ok(page) => {
                let number = page.number;
                Box::new(page.lines.into_iter().map(move |line| Ok((number, line))))
            }
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    })
}
