/// A simple text-based grid table for terminal output
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl Table {
    /// Create a new table with the given headers
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let col_widths = headers.iter().map(|h| h.chars().count()).collect();
        Table {
            headers,
            rows: Vec::new(),
            col_widths,
        }
    }

    /// Add a row to the table; extra cells beyond the header count are dropped
    pub fn add_row(&mut self, row: Vec<String>) {
        for (i, col) in row.iter().enumerate() {
            if i < self.col_widths.len() {
                self.col_widths[i] = self.col_widths[i].max(col.chars().count());
            }
        }

        self.rows.push(row);
    }

    /// Render the table with grid borders
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.render_separator('-'));
        output.push('\n');
        output.push_str(&self.render_row(&self.headers));
        output.push('\n');
        output.push_str(&self.render_separator('='));
        output.push('\n');

        for row in &self.rows {
            output.push_str(&self.render_row(row));
            output.push('\n');
            output.push_str(&self.render_separator('-'));
            output.push('\n');
        }

        output
    }

    /// Render a single row, padding missing cells
    fn render_row(&self, row: &[String]) -> String {
        let mut line = String::from("|");
        for (i, &width) in self.col_widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!(" {:<width$} |", cell, width = width));
        }
        line
    }

    fn render_separator(&self, fill: char) -> String {
        let mut line = String::from("+");
        for &width in &self.col_widths {
            line.push_str(&fill.to_string().repeat(width + 2));
            line.push('+');
        }
        line
    }
}
