//! Template-specific reshaping of raw grids into [`FinancialTable`]s.
//!
//! Each statement layout gets its own [`TableNormalizer`]. [`NormalizerSet`] picks the first
//! normalizer whose signature matches the raw grid, so new layouts plug in without touching the
//! pipeline.

use super::{FinancialTable, RawTable, TableError};

/// Reshaping strategy for one statement layout.
pub trait TableNormalizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the grid looks like this normalizer's layout.
    fn matches(&self, raw: &RawTable) -> bool;

    /// Check the structural preconditions of [`TableNormalizer::reshape`].
    fn validate(&self, raw: &RawTable) -> Result<(), TableError>;

    /// Convert the grid into a table keyed by reporting period.
    fn reshape(&self, raw: RawTable) -> Result<FinancialTable, TableError>;
}

/// Ordered collection of normalizers; earlier entries win.
pub struct NormalizerSet {
    normalizers: Vec<Box<dyn TableNormalizer>>,
}

impl NormalizerSet {
    /// Build a set from normalizers in priority order.
    pub fn new(normalizers: Vec<Box<dyn TableNormalizer>>) -> Self {
        Self { normalizers }
    }

    /// Reshape `raw` with the first matching normalizer.
    pub fn normalize(&self, raw: RawTable) -> Result<FinancialTable, TableError> {
        let normalizer = self
            .normalizers
            .iter()
            .find(|normalizer| normalizer.matches(&raw))
            .ok_or_else(|| TableError::Shape("no normalizer matches the table layout".into()))?;

        tracing::debug!(
            normalizer = normalizer.name(),
            rows = raw.rows().len(),
            width = raw.width(),
            "Normalizing statement table"
        );
        normalizer.validate(&raw)?;
        normalizer.reshape(raw)
    }
}

impl Default for NormalizerSet {
    fn default() -> Self {
        Self::new(vec![
            Box::new(QuarterlyStatementNormalizer::default()),
            Box::new(HeaderRowNormalizer),
        ])
    }
}

/// Layout with a quarterly pair of columns and a combined "year ended" column.
///
/// The two yearly values either share one cell separated by a line break, or sit in the
/// combined column and the unnamed column right after it.
#[derive(Debug, Clone)]
pub struct QuarterlyStatementNormalizer {
    combined_column: String,
    note_column: String,
    year_columns: [String; 2],
    quarter_columns: [String; 2],
}

impl Default for QuarterlyStatementNormalizer {
    fn default() -> Self {
        Self {
            combined_column: "Year ended March 31,".into(),
            note_column: "Note No.".into(),
            year_columns: [
                "Year ended March 31,2024".into(),
                "Year ended March 31,2023".into(),
            ],
            quarter_columns: [
                "Three months ended March 31,2024".into(),
                "Three months ended March 31,2023".into(),
            ],
        }
    }
}

// Leading noise rows, then the header row, then a period sub-header.
const NOISE_ROWS: usize = 2;
const HEADER_ROWS: usize = 2;

impl QuarterlyStatementNormalizer {
    fn header<'a>(&self, raw: &'a RawTable) -> Option<&'a [String]> {
        raw.rows().get(NOISE_ROWS).map(Vec::as_slice)
    }

    /// Split the combined column's `current\nprevious` values.
    fn split_combined(
        &self,
        body: &[Vec<String>],
        combined: usize,
    ) -> Result<Vec<[String; 2]>, TableError> {
        let splits: Vec<Vec<&str>> = body
            .iter()
            .map(|row| row[combined].split('\n').collect())
            .collect();
        let parts = splits.iter().map(Vec::len).max().unwrap_or(0);
        if !body.is_empty() && parts != 2 {
            return Err(TableError::Shape(format!(
                "'{}' splits into {parts} values, expected 2",
                self.combined_column
            )));
        }
        Ok(splits
            .into_iter()
            .map(|values| {
                [
                    values.first().map(|v| v.trim().to_string()).unwrap_or_default(),
                    values.get(1).map(|v| v.trim().to_string()).unwrap_or_default(),
                ]
            })
            .collect())
    }

    fn position(header: &[String], name: &str) -> Result<usize, TableError> {
        header
            .iter()
            .position(|column| column.trim() == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }
}

impl TableNormalizer for QuarterlyStatementNormalizer {
    fn name(&self) -> &'static str {
        "quarterly-statement"
    }

    fn matches(&self, raw: &RawTable) -> bool {
        raw.rows()
            .iter()
            .any(|row| row.iter().any(|cell| cell.trim() == self.combined_column))
    }

    fn validate(&self, raw: &RawTable) -> Result<(), TableError> {
        let header = self.header(raw).ok_or_else(|| {
            TableError::Shape(format!("expected at least {} rows", NOISE_ROWS + 1))
        })?;
        Self::position(header, &self.combined_column)?;
        Self::position(header, &self.note_column)?;
        Ok(())
    }

    fn reshape(&self, raw: RawTable) -> Result<FinancialTable, TableError> {
        let mut rows = raw.into_rows().into_iter().skip(NOISE_ROWS);
        let mut header: Vec<String> = rows
            .next()
            .ok_or_else(|| TableError::Shape("missing header row".into()))?
            .into_iter()
            .map(|column| column.trim().to_string())
            .collect();
        let mut body: Vec<Vec<String>> = rows.skip(HEADER_ROWS - 1).collect();

        let combined = Self::position(&header, &self.combined_column)?;
        let side_by_side = header.get(combined + 1).is_some_and(String::is_empty)
            && body.iter().all(|row| !row[combined].contains('\n'));
        let years = if side_by_side {
            body.iter()
                .map(|row| {
                    [
                        row[combined].trim().to_string(),
                        row[combined + 1].trim().to_string(),
                    ]
                })
                .collect()
        } else {
            self.split_combined(&body, combined)?
        };
        for (row, [current, previous]) in body.iter_mut().zip(years) {
            row.push(current);
            row.push(previous);
        }
        header.extend(self.year_columns.iter().cloned());

        let note = Self::position(&header, &self.note_column)?;
        let mut dropped = vec![note, combined];
        if side_by_side {
            dropped.push(combined + 1);
        }
        dropped.sort_unstable_by(|a, b| b.cmp(a));
        for index in dropped {
            header.remove(index);
            for row in &mut body {
                row.remove(index);
            }
        }

        if header.len() < 3 {
            return Err(TableError::Shape(format!(
                "expected at least 3 columns after reshaping, found {}",
                header.len()
            )));
        }
        header[1] = self.quarter_columns[0].clone();
        header[2] = self.quarter_columns[1].clone();

        Ok(FinancialTable::new(header, body))
    }
}

/// Generic layout: the first row names the columns, every following row is data.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderRowNormalizer;

impl TableNormalizer for HeaderRowNormalizer {
    fn name(&self) -> &'static str {
        "header-row"
    }

    fn matches(&self, raw: &RawTable) -> bool {
        !raw.is_empty()
    }

    fn validate(&self, raw: &RawTable) -> Result<(), TableError> {
        match raw.rows().first() {
            Some(header) if header.iter().any(|cell| !cell.trim().is_empty()) => Ok(()),
            _ => Err(TableError::Shape("header row is empty".into())),
        }
    }

    fn reshape(&self, raw: RawTable) -> Result<FinancialTable, TableError> {
        let mut rows = raw.into_rows().into_iter();
        let header = rows
            .next()
            .ok_or_else(|| TableError::Shape("missing header row".into()))?
            .into_iter()
            .map(|column| column.trim().to_string())
            .collect();
        let body = rows
            .map(|row| row.into_iter().map(|cell| cell.trim().to_string()).collect())
            .collect();
        Ok(FinancialTable::new(header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn quarterly_grid() -> RawTable {
        grid(&[
            &["Standalone Statement of Profit and Loss", "", "", "", ""],
            &["(In crore)", "", "", "", ""],
            &[
                "Particulars",
                "Note No.",
                "Three months ended March 31,",
                "",
                "Year ended March 31,",
            ],
            &["", "", "2024", "2023", "2024\n2023"],
            &["Revenue from operations", "2.16", "37,923", "37,441", "153,670\n146,767"],
            &["Total expenses", "", "28,799", "28,826", "117,052\n111,818"],
        ])
    }

    #[test]
    fn quarterly_layout_is_split_and_renamed() {
        let normalizer = QuarterlyStatementNormalizer::default();
        let raw = quarterly_grid();
        assert!(normalizer.matches(&raw));
        normalizer.validate(&raw).expect("valid layout");

        let table = normalizer.reshape(raw).expect("reshape");
        assert_eq!(
            table.columns(),
            [
                "Particulars",
                "Three months ended March 31,2024",
                "Three months ended March 31,2023",
                "Year ended March 31,2024",
                "Year ended March 31,2023",
            ]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.row_text(0).as_deref(),
            Some("Revenue from operations 37,923 37,441 153,670 146,767")
        );
        assert_eq!(
            table.row_text(1).as_deref(),
            Some("Total expenses 28,799 28,826 117,052 111,818")
        );
    }

    #[test]
    fn quarterly_layout_accepts_years_in_adjacent_cells() {
        let raw = grid(&[
            &["Standalone Statement of Profit and Loss", "", "", "", "", "(In crore)"],
            &["for the year ended March 31, 2024", "", "", "", "", "Audited"],
            &[
                "Particulars",
                "Note No.",
                "Three months ended March 31,",
                "",
                "Year ended March 31,",
                "",
            ],
            &["", "", "2024", "2023", "2024", "2023"],
            &["Revenue from operations", "2.16", "37,923", "37,441", "153,670", "146,767"],
            &["Total expenses", "", "28,799", "28,826", "117,052", "111,818"],
        ]);

        let table = NormalizerSet::default().normalize(raw).expect("reshape");
        assert_eq!(
            table.columns(),
            [
                "Particulars",
                "Three months ended March 31,2024",
                "Three months ended March 31,2023",
                "Year ended March 31,2024",
                "Year ended March 31,2023",
            ]
        );
        assert_eq!(
            table.row_text(1).as_deref(),
            Some("Total expenses 28,799 28,826 117,052 111,818")
        );
    }

    #[test]
    fn quarterly_layout_requires_note_column() {
        let raw = grid(&[
            &["noise", "", ""],
            &["noise", "", ""],
            &["Particulars", "Three months ended March 31,", "Year ended March 31,"],
            &["", "2024", "2024\n2023"],
        ]);
        let error = QuarterlyStatementNormalizer::default()
            .validate(&raw)
            .expect_err("missing column");
        assert!(matches!(error, TableError::MissingColumn(name) if name == "Note No."));
    }

    #[test]
    fn section_rows_without_values_are_padded() {
        let mut rows = quarterly_grid().into_rows();
        rows.push(vec![
            "Expenses".into(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]);
        let table = QuarterlyStatementNormalizer::default()
            .reshape(RawTable::new(rows))
            .expect("reshape");
        let row = table.row(2).expect("section row");
        assert_eq!(row.cells[0].value, "Expenses");
        assert!(row.cells[1..].iter().all(|cell| cell.value.is_empty()));
    }

    #[test]
    fn header_row_layout_promotes_first_row() {
        let table = HeaderRowNormalizer
            .reshape(grid(&[&["Revenue", "Expenses"], &["100", "40"]]))
            .expect("reshape");
        assert_eq!(table.columns(), ["Revenue", "Expenses"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.row_text(0).as_deref(), Some("100 40"));
    }

    #[test]
    fn set_prefers_quarterly_layout_and_falls_back_to_header_row() {
        let set = NormalizerSet::default();
        let quarterly = set.normalize(quarterly_grid()).expect("quarterly");
        assert_eq!(quarterly.columns().len(), 5);

        let simple = set
            .normalize(grid(&[&["Revenue", "Expenses"], &["100", "40"]]))
            .expect("header row");
        assert_eq!(simple.columns(), ["Revenue", "Expenses"]);
    }

    #[test]
    fn empty_grid_matches_nothing() {
        let error = NormalizerSet::default()
            .normalize(RawTable::default())
            .expect_err("no normalizer");
        assert!(matches!(error, TableError::Shape(_)));
    }
}
