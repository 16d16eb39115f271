//! Formats retrieved rows into prompt context.

use super::types::RelevantRowSet;
use crate::table::TableRow;
use std::collections::BTreeMap;

/// Render `rows` one per line as `Row {index}: {column}: {value}, ...`.
///
/// An empty slice yields an empty string; there is no trailing newline.
pub fn compose_context(rows: &[TableRow]) -> String {
    rows.iter()
        .map(|row| {
            let cells = row
                .cells
                .iter()
                .map(|cell| format!("{}: {}", cell.column, cell.value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Row {}: {}", row.index, cells)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Union of the rows retrieved for every query, deduplicated and ordered by index.
pub fn merge_row_sets(sets: &[RelevantRowSet]) -> Vec<TableRow> {
    let mut merged = BTreeMap::new();
    for row in sets.iter().flat_map(|set| &set.rows) {
        merged.entry(row.index).or_insert_with(|| row.clone());
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RowCell;

    fn row(index: usize, cells: &[(&str, &str)]) -> TableRow {
        TableRow {
            index,
            cells: cells
                .iter()
                .map(|(column, value)| RowCell {
                    column: column.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_rows_give_empty_context() {
        assert_eq!(compose_context(&[]), "");
    }

    #[test]
    fn single_row_has_no_trailing_newline() {
        let context = compose_context(&[row(0, &[("Revenue", "100"), ("Expenses", "40")])]);
        assert_eq!(context, "Row 0: Revenue: 100, Expenses: 40");
    }

    #[test]
    fn rows_are_joined_by_newlines() {
        let context = compose_context(&[row(1, &[("A", "1")]), row(3, &[("A", "2")])]);
        assert_eq!(context, "Row 1: A: 1\nRow 3: A: 2");
    }

    #[test]
    fn merged_sets_are_unique_and_sorted() {
        let sets = vec![
            RelevantRowSet {
                query: "a".into(),
                rows: vec![row(2, &[("A", "x")]), row(0, &[("A", "y")])],
            },
            RelevantRowSet {
                query: "b".into(),
                rows: vec![row(0, &[("A", "y")]), row(1, &[("A", "z")])],
            },
        ];
        let indices: Vec<usize> = merge_row_sets(&sets).iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
