//! Output formatting utilities for CLI commands
//!
//! Provides consistent formatting for:
//! - Tables with column alignment
//! - Timestamps and durations
//! - Status colors

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use portal_coordinator::Warning;
use portal_db::{EventType, RunStatus};

/// Format a file size in human-readable form
///
/// Examples:
/// - 500 -> "500 B"
/// - 1024 -> "1.0 KB"
/// - 1536000 -> "1.5 MB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a stored UTC timestamp in local time
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_optional_timestamp(time: Option<&DateTime<Utc>>) -> String {
    time.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// Elapsed time between two instants, e.g. "4m 05s"
pub fn format_elapsed(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    let secs = (*end - *start).num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Get display color for a run status
pub fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Submitted => Color::Yellow,
        RunStatus::Queued => Color::Blue,
        RunStatus::Running => Color::Cyan,
        RunStatus::Succeeded => Color::Green,
        RunStatus::Failed => Color::Red,
    }
}

pub fn event_color(event_type: EventType) -> Option<Color> {
    match event_type {
        EventType::StatusChange => Some(Color::Cyan),
        EventType::Warning => Some(Color::Yellow),
        EventType::Error => Some(Color::Red),
        EventType::Log => None,
    }
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    // Add header row with styling
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    // Add data rows
    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Print a table with custom column colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| {
                let cell = Cell::new(text);
                if let Some(c) = color {
                    cell.fg(c)
                } else {
                    cell
                }
            })
            .collect();
        table.add_row(cells);
    }

    println!("{}", table);
}

/// Print best-effort warnings to stderr so stdout stays clean.
pub fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("WARNING: {}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_elapsed() {
        let start = Utc::now();
        assert_eq!(format_elapsed(&start, &(start + Duration::seconds(42))), "42s");
        assert_eq!(format_elapsed(&start, &(start + Duration::seconds(245))), "4m 05s");
        assert_eq!(format_elapsed(&start, &(start + Duration::seconds(7320))), "2h 02m");
        assert_eq!(format_elapsed(&start, &(start - Duration::seconds(5))), "0s");
    }

    #[test]
    fn test_optional_timestamp() {
        assert_eq!(format_optional_timestamp(None), "-");
    }
}
