//! Terminal presentation of a [`Report`].
//!
//! Kept apart from the pipeline: everything here takes a finished report
//! and only decides how it looks.

use chrono::{DateTime, Utc};
use colored::*;

use crate::annotate::AnnotatedDatabase;
use crate::migration::MigrationStatus;
use crate::report::Report;

const COLUMN_GAP: &str = "  ";

/// A table cell: visible text plus its colored form.
#[derive(Debug, Clone)]
struct Cell {
    plain: String,
    painted: String,
}

impl Cell {
    fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            painted: text.clone(),
            plain: text,
        }
    }

    fn painted(text: &str, painted: ColoredString) -> Self {
        Self {
            plain: text.to_string(),
            painted: painted.to_string(),
        }
    }

    fn width(&self) -> usize {
        self.plain.chars().count()
    }
}

/// "fromNow"-style wording for the distance between `then` and `now`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then).num_seconds();
    let phrase = humanize_seconds(delta.unsigned_abs());
    if delta < 0 {
        format!("in {}", phrase)
    } else {
        format!("{} ago", phrase)
    }
}

fn humanize_seconds(secs: u64) -> String {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 60.0 * MINUTE;
    const DAY: f64 = 24.0 * HOUR;

    let s = secs as f64;
    let round = |v: f64| v.round() as u64;

    if s < 45.0 {
        "a few seconds".to_string()
    } else if s < 90.0 {
        "a minute".to_string()
    } else if s < 45.0 * MINUTE {
        format!("{} minutes", round(s / MINUTE))
    } else if s < 90.0 * MINUTE {
        "an hour".to_string()
    } else if s < 22.0 * HOUR {
        format!("{} hours", round(s / HOUR))
    } else if s < 36.0 * HOUR {
        "a day".to_string()
    } else if s < 26.0 * DAY {
        format!("{} days", round(s / DAY))
    } else if s < 45.0 * DAY {
        "a month".to_string()
    } else if s < 320.0 * DAY {
        format!("{} months", round(s / (30.4 * DAY)))
    } else if s < 548.0 * DAY {
        "a year".to_string()
    } else {
        format!("{} years", round(s / (365.0 * DAY)).max(2))
    }
}

fn row_cells(row: &AnnotatedDatabase, now: DateTime<Utc>) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(4);

    if row.is_current {
        cells.push(Cell::plain("*"));
        cells.push(Cell::painted(&row.name, row.name.bright_yellow()));
    } else {
        cells.push(Cell::plain(""));
        cells.push(Cell::plain(row.name.as_str()));
    }

    if let Some(MigrationStatus::Present {
        record,
        file_exists,
    }) = &row.status
    {
        let when = relative_time(record.applied_at, now);
        if *file_exists {
            let file = if row.is_current {
                record.name.bright_green().underline()
            } else {
                record.name.underline()
            };
            cells.push(Cell::painted(&record.name, file));
            cells.push(Cell::painted(&when, when.bright_blue()));
        } else {
            cells.push(Cell::painted(&record.name, record.name.bright_black()));
            cells.push(Cell::painted(&when, when.bright_black()));
        }
    }

    cells
}

/// Render the report as aligned table lines, one per database.
pub fn render_report(report: &Report, now: DateTime<Utc>) -> Vec<String> {
    let table: Vec<Vec<Cell>> = report.iter().map(|row| row_cells(row, now)).collect();

    let columns = table.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for cells in &table {
        for (i, cell) in cells.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    table
        .iter()
        .map(|cells| {
            let mut line = String::new();
            for (i, cell) in cells.iter().enumerate() {
                if i > 0 {
                    line.push_str(COLUMN_GAP);
                }
                line.push_str(&cell.painted);
                if i + 1 < cells.len() {
                    line.push_str(&" ".repeat(widths[i] - cell.width()));
                }
            }
            line.trim_end().to_string()
        })
        .collect()
}

/// Print the report to stdout.
pub fn print_report(report: &Report, now: DateTime<Utc>) {
    for line in render_report(report, now) {
        println!("{}", line);
    }
}
