//! Plain-text tables for listings.

use std::fmt::Write as _;

/// Column-aligned table with a header row.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates an empty table with the given column headers.
    #[must_use]
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; missing cells render empty and extra cells are dropped.
    pub fn push_row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Returns `true` when no rows were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(column, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(column))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Renders the table with `+---+` borders, one line per row.
    #[must_use]
    pub fn render(&self) -> String {
        let widths = self.widths();
        let border = |left: char, joint: char, right: char| {
            let mut line = String::new();
            line.push(left);
            let segments: Vec<String> = widths.iter().map(|width| "-".repeat(width + 2)).collect();
            line.push_str(&segments.join(&joint.to_string()));
            line.push(right);
            line
        };
        let format_row = |cells: &[String]| {
            let mut line = String::from("|");
            for (cell, width) in cells.iter().zip(&widths) {
                // Writing to a String cannot fail.
                write!(line, " {cell:<width$} |").ok();
            }
            line
        };

        let mut lines = vec![border('+', '+', '+'), format_row(&self.headers), border('|', '+', '|')];
        lines.extend(self.rows.iter().map(|row| format_row(row)));
        lines.push(border('+', '+', '+'));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn render_pads_columns_to_the_widest_cell() {
        let mut table = Table::new(["Filename", "Size"]);
        table.push_row(["rockyou.txt", "139921507"]);
        table.push_row(["a", "1"]);

        assert_eq!(
            table.render(),
            [
                "+-------------+-----------+",
                "| Filename    | Size      |",
                "|-------------+-----------|",
                "| rockyou.txt | 139921507 |",
                "| a           | 1         |",
                "+-------------+-----------+",
            ]
            .join("\n")
        );
    }

    #[rstest]
    fn short_rows_are_padded_with_empty_cells() {
        let mut table = Table::new(["ID", "IP"]);
        table.push_row(["srv-1"]);

        assert_eq!(
            table.rows(),
            [vec![String::from("srv-1"), String::new()]]
        );
        assert!(!table.is_empty());
    }
}
