//! Terminal rendering for reports and records.

use std::io::IsTerminal;

use clinicdb::admin::{VerifyFinding, VerifySeverity};
use clinicdb::storage::{CollectionName, Record};
use nu_ansi_term::{Color, Style};
use serde_json::Value;

/// Widest a table cell may grow before it is cut.
const MAX_CELL_WIDTH: usize = 32;

pub struct Ui {
    color: bool,
}

impl Ui {
    pub fn new() -> Self {
        Self {
            color: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    fn style(&self, style: Style) -> Style {
        if self.color {
            style
        } else {
            Style::new()
        }
    }

    /// Aligned `label: value` lines under a bold title.
    pub fn report(&self, title: &str, rows: &[(&str, String)]) {
        if rows.is_empty() {
            return;
        }
        println!("{}", self.style(Style::new().bold()).paint(title));
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        let label_style = self.style(Color::Cyan.normal());
        for (label, value) in rows {
            println!("  {} {value}", label_style.paint(format!("{label:>width$}:")));
        }
    }

    pub fn findings(&self, findings: &[VerifyFinding]) {
        for finding in findings {
            let tag = match finding.severity {
                VerifySeverity::Info => self.style(Color::Blue.normal()).paint("info"),
                VerifySeverity::Warning => self.style(Color::Yellow.bold()).paint("warn"),
                VerifySeverity::Error => self.style(Color::Red.bold()).paint("error"),
            };
            println!("  [{tag}] {}", finding.message);
        }
    }

    /// Prints `records` as a table keyed by the collection's primary key.
    pub fn records(&self, collection: CollectionName, records: &[Record]) {
        if records.is_empty() {
            println!("{collection}: no records");
            return;
        }
        let plural = if records.len() == 1 { "record" } else { "records" };
        println!(
            "{}",
            self.style(Style::new().bold())
                .paint(format!("{collection} ({} {plural})", records.len()))
        );
        let table = Table::build(collection.schema().primary_key, records);
        let lines = table.lines();
        let header_style = self.style(Style::new().underline());
        let key_style = self.style(Color::Cyan.normal());
        for (row, line) in lines.into_iter().enumerate() {
            let split = line
                .char_indices()
                .nth(table.widths[0])
                .map_or(line.len(), |(at, _)| at);
            let (key, rest) = line.split_at(split);
            if row == 0 {
                println!("{}", header_style.paint(line.trim_end()));
            } else {
                println!("{}{}", key_style.paint(key), rest.trim_end());
            }
        }
    }

    pub fn done(&self, message: &str) {
        println!("{} {message}", self.style(Color::Green.bold()).paint("ok"));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {message}", self.style(Color::Yellow.bold()).paint("warning:"));
    }
}

/// Plain-text table: the primary key first, then every other field in the
/// order it first appears across the records.
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
}

impl Table {
    fn build(primary_key: &str, records: &[Record]) -> Self {
        let mut columns = vec![primary_key.to_string()];
        for record in records {
            for field in record.fields().keys() {
                if !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
        }
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| cell(record.get(column)))
                    .collect()
            })
            .collect();
        let widths = columns
            .iter()
            .enumerate()
            .map(|(pos, column)| {
                rows.iter()
                    .map(|row| row[pos].chars().count())
                    .chain([column.chars().count()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        Self {
            columns,
            rows,
            widths,
        }
    }

    /// Header line followed by one line per record. Cells are separated by
    /// two spaces; the first cell of every line spans exactly `widths[0]`
    /// characters before the separator.
    fn lines(&self) -> Vec<String> {
        std::iter::once(&self.columns)
            .chain(&self.rows)
            .map(|cells| {
                let mut line = String::new();
                for (pos, text) in cells.iter().enumerate() {
                    if pos > 0 {
                        line.push_str("  ");
                    }
                    line.push_str(text);
                    let pad = self.widths[pos].saturating_sub(text.chars().count());
                    line.extend(std::iter::repeat(' ').take(pad));
                }
                line
            })
            .collect()
    }
}

fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => return "-".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    let text = text.replace(['\n', '\r', '\t'], " ");
    if text.chars().count() <= MAX_CELL_WIDTH {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
    cut.push('~');
    cut
}
