//! Whitespace-driven table detection over extracted page text.
//!
//! Mirrors "stream" layout parsing: there are no ruling lines to follow, so columns are inferred
//! from gaps of two or more spaces (or a tab) between words. Consecutive lines with at least two
//! cells form one table; a line with fewer cells closes the current table.
//!
//! Lines with fewer cells than the widest line of their table are aligned by character position:
//! the widest lines define the column bands, and every other cell lands in the leftmost band it
//! overlaps. A header spanning two value columns therefore sits over the first of them, and a
//! row with a blank cell keeps its values under the right headers.

use super::{RawTable, TableError, TableExtractor};
use crate::document::Document;

const MIN_CELLS: usize = 2;

/// Text-based extractor for tables without ruling lines.
#[derive(Debug, Clone, Copy)]
pub struct StreamTableExtractor {
    min_rows: usize,
}

impl StreamTableExtractor {
    /// Construct an extractor that keeps tables with at least two rows.
    pub const fn new() -> Self {
        Self { min_rows: 2 }
    }

    /// Override the minimum number of rows a block needs to count as a table.
    pub const fn with_min_rows(min_rows: usize) -> Self {
        Self { min_rows }
    }

    /// Detect tables in a block of page text.
    pub fn tables_in_text(&self, text: &str) -> Vec<RawTable> {
        let mut tables = Vec::new();
        let mut current: Vec<Vec<Cell>> = Vec::new();

        for line in text.lines() {
            let cells = split_cells(line);
            if cells.len() >= MIN_CELLS {
                current.push(cells);
            } else if !current.is_empty() {
                self.flush(&mut current, &mut tables);
            }
        }
        self.flush(&mut current, &mut tables);

        tables
    }

    fn flush(&self, current: &mut Vec<Vec<Cell>>, tables: &mut Vec<RawTable>) {
        let rows = std::mem::take(current);
        if rows.len() >= self.min_rows {
            tables.push(RawTable::new(align_columns(rows)));
        }
    }
}

impl Default for StreamTableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TableExtractor for StreamTableExtractor {
    fn extract_tables(&self, document: &Document, page: &str) -> Result<Vec<RawTable>, TableError> {
        let page = page
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(|number| document.page(number))
            .ok_or_else(|| TableError::PageNotFound(page.to_string()))?;

        let tables = self.tables_in_text(&page.text);
        tracing::debug!(page = page.number, tables = tables.len(), "Stream table scan complete");
        Ok(tables)
    }
}

/// A cell of text and the character span it occupies on its line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cell {
    text: String,
    start: usize,
    end: usize,
}

impl Cell {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    fn center(&self) -> usize {
        (self.start + self.end) / 2
    }
}

fn split_cells(line: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut start = 0usize;
    let mut spaces = 0usize;

    for (offset, ch) in line.trim_end().chars().enumerate() {
        match ch {
            '\t' => {
                push_cell(&mut cells, &mut cell, start, offset);
                spaces = 0;
            }
            ' ' => spaces += 1,
            _ => {
                if cell.is_empty() {
                    start = offset;
                } else if spaces >= 2 {
                    push_cell(&mut cells, &mut cell, start, offset - spaces);
                    start = offset;
                } else if spaces == 1 {
                    cell.push(' ');
                }
                spaces = 0;
                cell.push(ch);
            }
        }
    }
    let end = start + cell.chars().count();
    push_cell(&mut cells, &mut cell, start, end);
    cells
}

fn push_cell(cells: &mut Vec<Cell>, cell: &mut String, start: usize, end: usize) {
    if !cell.is_empty() {
        cells.push(Cell {
            text: std::mem::take(cell),
            start,
            end,
        });
    }
}

/// Place every cell of a table block into a column grid.
fn align_columns(rows: Vec<Vec<Cell>>) -> Vec<Vec<String>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut bands: Vec<(usize, usize)> = vec![(usize::MAX, 0); width];
    for row in rows.iter().filter(|row| row.len() == width) {
        for (band, cell) in bands.iter_mut().zip(row) {
            band.0 = band.0.min(cell.start);
            band.1 = band.1.max(cell.end);
        }
    }

    rows.into_iter()
        .map(|row| {
            if row.len() == width {
                return row.into_iter().map(|cell| cell.text).collect();
            }
            let mut grid = vec![String::new(); width];
            for cell in row {
                let column = bands
                    .iter()
                    .position(|&(start, end)| cell.overlaps(start, end))
                    .unwrap_or_else(|| nearest_band(&bands, cell.center()));
                let slot = &mut grid[column];
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(&cell.text);
            }
            grid
        })
        .collect()
}

fn nearest_band(bands: &[(usize, usize)], center: usize) -> usize {
    bands
        .iter()
        .enumerate()
        .min_by_key(|(_, (start, end))| ((start + end) / 2).abs_diff(center))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(cells: Vec<Cell>) -> Vec<String> {
        cells.into_iter().map(|cell| cell.text).collect()
    }

    #[test]
    fn splits_on_wide_gaps_and_tabs_only() {
        assert_eq!(
            texts(split_cells("Revenue from operations   37,923\t37,441")),
            vec!["Revenue from operations", "37,923", "37,441"]
        );
        assert_eq!(texts(split_cells("Statement of Profit and Loss")), vec![
            "Statement of Profit and Loss"
        ]);
        assert!(split_cells("   ").is_empty());
    }

    #[test]
    fn cells_remember_their_character_span() {
        let cells = split_cells("  Total expenses    40");
        assert_eq!(cells.len(), 2);
        assert_eq!((cells[0].start, cells[0].end), (2, 16));
        assert_eq!((cells[1].start, cells[1].end), (20, 22));
    }

    #[test]
    fn short_rows_align_under_the_overlapping_columns() {
        let text = "\
Particulars        Note     Three months       Year ended
                            2024     2023      2024     2023
Revenue            2.16     37,923   37,441    153,670  146,767
Total expenses              28,799   28,826    117,052  111,818";
        let tables = StreamTableExtractor::new().tables_in_text(text);
        assert_eq!(tables.len(), 1);
        let rows = tables[0].rows();
        assert_eq!(rows[0], vec!["Particulars", "Note", "Three months", "", "Year ended", ""]);
        assert_eq!(rows[1], vec!["", "", "2024", "2023", "2024", "2023"]);
        assert_eq!(rows[3], vec![
            "Total expenses",
            "",
            "28,799",
            "28,826",
            "117,052",
            "111,818"
        ]);
    }

    #[test]
    fn single_cell_lines_separate_tables() {
        let text = "Statement of Profit and Loss\n\
                    Revenue    Expenses\n\
                    100    40\n\
                    Notes to accounts\n\
                    Assets    Liabilities\n\
                    9    8\n";
        let tables = StreamTableExtractor::new().tables_in_text(text);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows()[0], vec!["Revenue", "Expenses"]);
        assert_eq!(tables[0].rows()[1], vec!["100", "40"]);
        assert_eq!(tables[1].rows()[0], vec!["Assets", "Liabilities"]);
    }

    #[test]
    fn short_blocks_are_not_tables() {
        let tables = StreamTableExtractor::new().tables_in_text("Heading\nA    B\nFooter");
        assert!(tables.is_empty());
        let lenient = StreamTableExtractor::with_min_rows(1).tables_in_text("Heading\nA    B\nFooter");
        assert_eq!(lenient.len(), 1);
    }

    #[test]
    fn unknown_page_is_an_error() {
        let document = Document::from_texts(["only page"]);
        let extractor = StreamTableExtractor::new();
        assert!(matches!(
            extractor.extract_tables(&document, "3"),
            Err(TableError::PageNotFound(page)) if page == "3"
        ));
        assert!(extractor.extract_tables(&document, "first").is_err());
    }
}
