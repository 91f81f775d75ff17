//! Plain-text table layout with `|` and `-` borders.
//!
//! Rows live in groups. The unnamed group always comes first; named groups
//! follow in the order they were started and get a full-width title row.
//! Subtotal rows attach to a group, total rows to the whole table.

#[derive(Clone, Debug, Default, PartialEq)]
struct RowGroup {
    name: String,
    rows: Vec<Vec<String>>,
    subtotals: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableFormatter {
    headers: Vec<String>,
    groups: Vec<RowGroup>,
    current: usize,
    totals: Vec<Vec<String>>,
}

impl TableFormatter {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        TableFormatter {
            headers: headers.into_iter().map(Into::into).collect(),
            groups: vec![RowGroup::default()],
            current: 0,
            totals: Vec::new(),
        }
    }

    pub fn add_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    /// Switch to the group called `name`; `""` is the unnamed group.
    pub fn start_row_group(&mut self, name: &str) {
        let name = name.trim();
        self.current = match self.groups.iter().position(|g| g.name == name) {
            Some(pos) => pos,
            None => {
                self.groups.push(RowGroup {
                    name: name.to_string(),
                    ..RowGroup::default()
                });
                self.groups.len() - 1
            }
        };
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.groups[self.current].rows.push(row);
    }

    pub fn add_subtotal(&mut self, group: &str, row: Vec<String>) {
        if let Some(g) = self.groups.iter_mut().find(|g| g.name == group) {
            g.subtotals.push(row);
        }
    }

    pub fn add_total(&mut self, row: Vec<String>) {
        self.totals.push(row);
    }

    fn all_rows(&self) -> impl Iterator<Item = &Vec<String>> {
        std::iter::once(&self.headers)
            .chain(self.groups.iter().flat_map(|g| g.rows.iter().chain(g.subtotals.iter())))
            .chain(self.totals.iter())
    }

    pub fn format_table(&self) -> String {
        let columns = self.all_rows().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                self.all_rows()
                    .filter_map(|r| r.get(c))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let plain = format!("|-{}-|", dashes.join("---"));
        let divider = format!("|-{}-|", dashes.join("-|-"));
        let inner = widths.iter().sum::<usize>() + 3 * columns.saturating_sub(1);

        let format_row = |row: &Vec<String>| -> String {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(c, w)| format!("{:<w$}", row.get(c).map(String::as_str).unwrap_or(""), w = *w))
                .collect();
            format!("| {} |", cells.join(" | "))
        };

        let mut body: Vec<String> = Vec::new();
        for group in self.groups.iter().filter(|g| !g.rows.is_empty()) {
            if !body.is_empty() {
                body.push(plain.clone());
            }
            if !group.name.is_empty() {
                body.push(format!("| {:<inner$} |", group.name, inner = inner));
                body.push(plain.clone());
            }
            body.extend(group.rows.iter().map(format_row));
            // Subtotals of unnamed rows go after all named groups.
            if !group.name.is_empty() {
                for row in &group.subtotals {
                    body.push(plain.clone());
                    body.push(format_row(row));
                }
            }
        }
        for row in &self.groups[0].subtotals {
            body.push(plain.clone());
            body.push(format_row(row));
        }
        if !self.totals.is_empty() {
            body.push(plain.clone());
            body.extend(self.totals.iter().map(format_row));
        }

        let head_divider = if self.groups.len() == 1 || !self.groups[0].rows.is_empty() {
            divider
        } else {
            plain.clone()
        };

        let mut out = vec![plain.clone(), format_row(&self.headers), head_divider];
        out.extend(body);
        out.push(plain);
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_flat_table() {
        let mut tf = TableFormatter::new(["Var", "Value", "Remark"]);
        tf.add_row(row(&["rent", "900", "monthly"]));
        tf.add_row(row(&["food", "250"]));
        let expected = "\
|------------------------|
| Var  | Value | Remark  |
|------|-------|---------|
| rent | 900   | monthly |
| food | 250   |         |
|------------------------|";
        assert_eq!(tf.format_table(), expected);
    }

    #[test]
    fn test_grouped_table_with_total() {
        let mut tf = TableFormatter::new(["Var", "Value", "Remark"]);
        tf.start_row_group("totals");
        tf.add_row(row(&["", "10", ""]));
        tf.add_row(row(&["", "20", ""]));
        tf.start_row_group("");
        tf.add_total(row(&["sum", "30"]));
        let expected = "\
|----------------------|
| Var | Value | Remark |
|----------------------|
| totals               |
|----------------------|
|     | 10    |        |
|     | 20    |        |
|----------------------|
| sum | 30    |        |
|----------------------|";
        assert_eq!(tf.format_table(), expected);
    }

    #[test]
    fn test_unnamed_rows_come_first_and_subtotals_attach() {
        let mut tf = TableFormatter::new(["Var", "Value"]);
        tf.start_row_group("g");
        tf.add_row(row(&["a", "1"]));
        tf.start_row_group("");
        tf.add_row(row(&["b", "2"]));
        tf.add_subtotal("g", row(&["sub", "1"]));
        tf.add_subtotal("", row(&["sub", "2"]));
        let text = tf.format_table();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "|-----|-------|");
        assert_eq!(lines[3], "| b   | 2     |");
        assert_eq!(lines[5], "| g           |");
        assert_eq!(lines[7], "| a   | 1     |");
        assert_eq!(lines[9], "| sub | 1     |");
        assert_eq!(lines[11], "| sub | 2     |");
        assert!(text.lines().all(|l| l.starts_with('|')));
    }
}
