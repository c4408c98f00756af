use serde::Serialize;

/// One snapshot of the tabular feed: header names plus data rows in feed order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feed {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Feed {
    /// Build a feed from a header line and raw value lines. Short lines are padded
    /// with empty strings; cells beyond the header are dropped.
    pub fn from_lines(headers: Vec<String>, lines: Vec<Vec<String>>) -> Self {
        let rows = lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let values = headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), line.get(i).cloned().unwrap_or_default()))
                    .collect();
                Row { index, values }
            })
            .collect();

        Self { headers, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.eq_ignore_ascii_case(name.trim()))
    }
}

/// One product/content unit from the feed. Never mutated after the snapshot is taken.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Row {
    /// Zero-based position among the data rows.
    pub index: usize,
    /// `(header, value)` in column order; duplicate headers are kept.
    pub values: Vec<(String, String)>,
}

impl Row {
    /// Line number in the feed, counting the header line as 1.
    pub fn line_number(&self) -> usize {
        self.index + 2
    }

    /// Trimmed cell value of the leftmost matching column; header matching
    /// ignores ASCII case, the same rule the feed writer uses.
    pub fn get(&self, column: &str) -> Option<&str> {
        let column = column.trim();
        self.values
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(column))
            .map(|(_, v)| v.trim())
    }

    /// First non-empty value among `columns`, tried in order. Returns the column too.
    pub fn first_non_empty<'a>(&'a self, columns: &'a [String]) -> Option<(&'a str, &'a str)> {
        columns.iter().find_map(|col| {
            self.get(col)
                .filter(|v| !v.is_empty())
                .map(|v| (col.as_str(), v))
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.get(column).is_some()
    }
}

/// Loose boolean used for posted/ready flags in hand-edited sheets.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x" | "✓" | "✔" | "done" | "ready" | "approved" | "posted"
    )
}
