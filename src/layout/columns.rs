//! Recovering reading order from pages with two physical columns.
//!
//! OCR tools often serialize a two-column page row by row, so each physical
//! line holds the left column's text, a gutter of spaces and the right
//! column's text. The aligner finds the gutter from the text alone and
//! re-serializes the page as the whole left column followed by the whole
//! right column.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::layout::Page;

/// Tuning knobs for [`ColumnAligner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOptions {
    /// Pages are expected to be two-column; failing to find a split is fatal.
    pub expect_two_columns: bool,
    /// Pages passed through untouched regardless of detection.
    pub single_column_pages: BTreeSet<u32>,
    /// Strip each column's common leading indentation after splitting.
    pub dedent: bool,
    /// Minimum number of lines that must support a split.
    pub min_score: usize,
    /// Minimum share of non-blank lines that must support a split.
    pub min_score_fraction: f64,
    /// Fraction of the page width inside which a split may fall.
    pub band: (f64, f64),
    /// Characters a line must have to the right of a split to count for it.
    pub min_tail: usize,
    /// Leading spaces a right-column line may carry and still count for a split.
    pub indent_allowance: usize,
    /// How far from the split a straddling line may be re-cut at a gap.
    pub repair_window: usize,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            expect_two_columns: false,
            single_column_pages: BTreeSet::new(),
            dedent: false,
            min_score: 5,
            min_score_fraction: 0.25,
            band: (0.25, 0.75),
            min_tail: 2,
            indent_allowance: 2,
            repair_window: 4,
        }
    }
}

/// A detected split: `index` is the first character column of the right column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSplit {
    pub index: usize,
    pub score: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    split: ColumnSplit,
    exact: usize,
    blank: usize,
    off_center: usize,
}

/// Detects and undoes two-column serialization.
#[derive(Debug, Clone, Default)]
pub struct ColumnAligner {
    options: ColumnOptions,
}

impl ColumnAligner {
    pub fn new(options: ColumnOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ColumnOptions {
        &self.options
    }

    /// Number of supporting lines a split needs on a page with `non_blank` lines.
    pub fn required_score(&self, non_blank: usize) -> usize {
        let fraction = (self.options.min_score_fraction * non_blank as f64).ceil() as usize;
        self.options.min_score.max(fraction)
    }

    /// Best split candidate, whether or not it clears the threshold.
    fn best_candidate(&self, rows: &[Vec<char>]) -> Option<Candidate> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width < 4 {
            return None;
        }
        let (band_lo, band_hi) = self.options.band;
        let lo = ((width as f64 * band_lo).ceil() as usize).max(1);
        let hi = ((width as f64 * band_hi).floor() as usize).min(width - 2);
        let center = width / 2;

        let mut best: Option<Candidate> = None;
        for gutter in lo..=hi {
            let index = gutter + 1;
            let mut score = 0;
            let mut exact = 0;
            let mut blank = 0;
            let mut left_support = 0;
            for row in rows {
                if row[..gutter.min(row.len())].iter().any(|c| !c.is_whitespace()) {
                    left_support += 1;
                }
                if !row.get(gutter).copied().unwrap_or(' ').is_whitespace() {
                    continue;
                }
                blank += 1;
                let start = (index..=index + self.options.indent_allowance)
                    .find(|&p| row.get(p).is_some_and(|c| !c.is_whitespace()));
                if let Some(start) = start {
                    if row.len() - start >= self.options.min_tail {
                        score += 1;
                        if start == index {
                            exact += 1;
                        }
                    }
                }
            }
            if score == 0 || left_support < self.options.min_score.min(score) {
                continue;
            }
            let candidate = Candidate {
                split: ColumnSplit { index, score },
                exact,
                blank,
                off_center: index.abs_diff(center),
            };
            let key = |c: &Candidate| (c.split.score, c.exact, c.blank, Reverse(c.off_center));
            if best.as_ref().map_or(true, |current| key(&candidate) > key(current)) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Find the column split of a page, if one clears the threshold.
    pub fn find_split(&self, lines: &[String]) -> Option<ColumnSplit> {
        let rows = to_rows(lines);
        let non_blank = rows.iter().filter(|r| r.iter().any(|c| !c.is_whitespace())).count();
        let required = self.required_score(non_blank);
        self.best_candidate(&rows)
            .map(|c| c.split)
            .filter(|split| split.score >= required)
    }

    /// Realign one page.
    ///
    /// Pages listed in `single_column_pages` pass through unchanged. A page
    /// with no convincing split passes through too, unless the aligner
    /// expects two columns, in which case it is an error.
    pub fn align(&self, page: Page) -> Result<Page, LayoutError> {
        if self.options.single_column_pages.contains(&page.number) {
            return Ok(page);
        }
        let rows = to_rows(&page.lines);
        let non_blank = rows.iter().filter(|r| r.iter().any(|c| !c.is_whitespace())).count();
        let required = self.required_score(non_blank);
        let candidate = self.best_candidate(&rows);

        let split = match candidate {
            Some(c) if c.split.score >= required => c.split,
            other => {
                if self.options.expect_two_columns {
                    return Err(LayoutError::NoColumnSplit {
                        page: page.number,
                        best_score: other.map_or(0, |c| c.split.score),
                        required,
                    });
                }
                return Ok(page);
            }
        };

        tracing::debug!(
            "page {}: splitting columns at {} (score {})",
            page.number,
            split.index,
            split.score
        );
        let lines = self.split_rows(page.number, &rows, split.index)?;
        Ok(Page::new(page.number, lines))
    }

    /// Cut every row at `index` and return left parts followed by right parts.
    pub fn split_rows(
        &self,
        page: u32,
        rows: &[Vec<char>],
        index: usize,
    ) -> Result<Vec<String>, LayoutError> {
        if let Some(row) = self.stray_short_row(rows, index) {
            return Err(LayoutError::AmbiguousColumnSplit {
                page,
                split: index,
                line: row.iter().collect(),
            });
        }

        let mut left = Vec::with_capacity(rows.len());
        let mut right = Vec::with_capacity(rows.len());

        for row in rows {
            let cut = self.cut_point(page, row, index)?;
            let cut = cut.min(row.len());
            left.push(trim_end(&row[..cut]));
            right.push(trim_end(&row[cut..]));
        }

        if self.options.dedent {
            dedent(&mut left);
            dedent(&mut right);
        }
        drop_trailing_blanks(&mut left);
        drop_trailing_blanks(&mut right);
        left.extend(right);
        Ok(left)
    }

    /// A short row with nothing right of the split, wedged between two rows
    /// that both carry right-column text. Such a row is usually a fragment
    /// of the right column printed without its gutter, and cutting it at the
    /// split would file it under the left column.
    fn stray_short_row<'r>(&self, rows: &'r [Vec<char>], index: usize) -> Option<&'r Vec<char>> {
        let has_right = |row: &Vec<char>| row.iter().skip(index).any(|c| !c.is_whitespace());
        rows.windows(3).find_map(|w| {
            let text: usize = w[1].iter().filter(|c| !c.is_whitespace()).count();
            let short = text > 0 && !has_right(&w[1]) && text * 2 < index;
            (short && has_right(&w[0]) && has_right(&w[2])).then_some(&w[1])
        })
    }

    /// Where to cut `row`. Normally `index`; a row whose text runs across
    /// the split is re-cut at the nearest gap of two or more spaces.
    fn cut_point(&self, page: u32, row: &[char], index: usize) -> Result<usize, LayoutError> {
        if row.len() <= index || row[index - 1].is_whitespace() || row[index].is_whitespace() {
            return Ok(index);
        }

        let window = self.options.repair_window;
        let lo = index.saturating_sub(window).max(1);
        let hi = (index + window).min(row.len() - 1);
        let nearest_gap = (lo..=hi)
            .filter(|&i| {
                !row[i].is_whitespace() && row[i - 1].is_whitespace() && i >= 2 && row[i - 2].is_whitespace()
            })
            .min_by_key(|&i| i.abs_diff(index));

        match nearest_gap {
            Some(cut) => {
                tracing::debug!("page {}: re-cut straddling line at {} instead of {}", page, cut, index);
                Ok(cut)
            }
            None => Err(LayoutError::AmbiguousColumnSplit {
                page,
                split: index,
                line: row.iter().collect(),
            }),
        }
    }
}

fn to_rows(lines: &[String]) -> Vec<Vec<char>> {
    lines.iter().map(|l| l.chars().collect()).collect()
}

fn trim_end(chars: &[char]) -> String {
    chars.iter().collect::<String>().trim_end().to_string()
}

fn dedent(lines: &mut [String]) {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return;
    }
    for line in lines.iter_mut() {
        *line = line.chars().skip(indent).collect();
    }
}

fn drop_trailing_blanks(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interleave(left: &[&str], right: &[&str], left_width: usize, gutter: usize) -> Vec<String> {
        let rows = left.len().max(right.len());
        (0..rows)
            .map(|i| {
                let l = left.get(i).copied().unwrap_or("");
                let r = right.get(i).copied().unwrap_or("");
                format!("{:<width$}{}{}", l, " ".repeat(gutter), r, width = left_width)
                    .trim_end()
                    .to_string()
            })
            .collect()
    }

    const LEFT: &[&str] = &[
        "1234. Mus alpinus Gray, 1843.",
        "  Proc. Zool. Soc. London",
        "  TYPE LOCALITY: Switzerland.",
        "",
        "1235. Mus minor Lesson, 1827.",
        "  Man. Mamm., p. 270.",
        "  TYPE LOCALITY: Bengal.",
    ];

    const RIGHT: &[&str] = &[
        "1236. Sorex araneus L., 1758.",
        "  Syst. Nat., ed. 10, p. 53.",
        "  TYPE LOCALITY: Sweden.",
        "",
        "1237. Sorex minutus L., 1766.",
        "  Syst. Nat., ed. 12, p. 73.",
        "  TYPE LOCALITY: Siberia.",
    ];

    #[test]
    fn test_two_column_page_round_trips() {
        let lines = interleave(LEFT, RIGHT, 32, 4);
        let aligner = ColumnAligner::new(ColumnOptions {
            expect_two_columns: true,
            min_score: 3,
            ..ColumnOptions::default()
        });

        let page = aligner.align(Page::new(5, lines)).unwrap();

        let expected: Vec<String> = LEFT.iter().chain(RIGHT).map(|s| s.to_string()).collect();
        assert_eq!(page.lines, expected);
    }

    #[test]
    fn test_find_split_reports_right_column_start() {
        let lines = interleave(LEFT, RIGHT, 32, 4);
        let aligner = ColumnAligner::new(ColumnOptions {
            min_score: 3,
            ..ColumnOptions::default()
        });

        let split = aligner.find_split(&lines).unwrap();
        assert_eq!(split.index, 36);
    }

    #[test]
    fn test_single_column_page_passes_through() {
        let lines: Vec<String> = LEFT.iter().map(|s| s.to_string()).collect();
        let aligner = ColumnAligner::default();

        let page = aligner.align(Page::new(1, lines.clone())).unwrap();
        assert_eq!(page.lines, lines);
    }

    #[test]
    fn test_expected_two_columns_without_split_is_fatal() {
        let lines: Vec<String> = LEFT.iter().map(|s| s.to_string()).collect();
        let aligner = ColumnAligner::new(ColumnOptions {
            expect_two_columns: true,
            ..ColumnOptions::default()
        });

        let err = aligner.align(Page::new(9, lines)).unwrap_err();
        assert!(matches!(err, LayoutError::NoColumnSplit { page: 9, .. }));
    }

    #[test]
    fn test_opt_out_page_is_untouched() {
        let lines = interleave(LEFT, RIGHT, 32, 4);
        let mut options = ColumnOptions {
            expect_two_columns: true,
            min_score: 3,
            ..ColumnOptions::default()
        };
        options.single_column_pages.insert(5);
        let aligner = ColumnAligner::new(options);

        let page = aligner.align(Page::new(5, lines.clone())).unwrap();
        assert_eq!(page.lines, lines);
    }

    #[test]
    fn test_shifted_right_line_is_recut_at_gap() {
        let mut lines = interleave(LEFT, RIGHT, 32, 4);
        // Right column text of the first row drifted two characters left.
        lines[0] = format!("{:<32}  {}", LEFT[0], RIGHT[0]);
        let aligner = ColumnAligner::new(ColumnOptions {
            min_score: 3,
            ..ColumnOptions::default()
        });

        let page = aligner.align(Page::new(5, lines)).unwrap();
        assert_eq!(page.lines[0], LEFT[0]);
        assert_eq!(page.lines[LEFT.len()], RIGHT[0]);
        assert_eq!(page.lines[LEFT.len() + 1], RIGHT[1]);
    }

    #[test]
    fn test_stray_short_row_is_rejected() {
        let mut lines = interleave(LEFT, RIGHT, 32, 4);
        // A right-column fragment that lost its gutter.
        lines.insert(5, "1758.".to_string());
        let aligner = ColumnAligner::new(ColumnOptions {
            expect_two_columns: true,
            min_score: 3,
            ..ColumnOptions::default()
        });

        let err = aligner.align(Page::new(5, lines)).unwrap_err();
        assert_eq!(
            err,
            LayoutError::AmbiguousColumnSplit {
                page: 5,
                split: 36,
                line: "1758.".to_string(),
            }
        );
    }

    #[test]
    fn test_unbroken_straddling_line_is_rejected() {
        let mut lines = interleave(LEFT, RIGHT, 32, 4);
        lines[1] = "x".repeat(50);
        let aligner = ColumnAligner::new(ColumnOptions {
            min_score: 3,
            ..ColumnOptions::default()
        });

        let err = aligner.align(Page::new(5, lines)).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::AmbiguousColumnSplit { page: 5, split: 36, ref line } if line.len() == 50
        ));
    }

    #[test]
    fn test_dedent_strips_common_indentation() {
        let mut lines = vec!["    alpha".to_string(), "      beta".to_string()];
        dedent(&mut lines);
        assert_eq!(lines, vec!["alpha", "  beta"]);
    }
}
