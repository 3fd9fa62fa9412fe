use crate::log_entry::LogEntry;
use crossterm::style::Stylize;
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Render one entry, colored by level when `color` is set.
pub fn format_entry(entry: &LogEntry, color: bool) -> String {
    let line = entry.render();
    if !color {
        return line;
    }

    match entry.level.as_str() {
        "error" => line.red().to_string(),
        "warning" => line.yellow().to_string(),
        _ => line,
    }
}

/// Print entries to `out` in the order they arrive, one line each.
pub async fn print_entries<W: Write>(
    mut rx: mpsc::UnboundedReceiver<LogEntry>,
    mut out: W,
    color: bool,
) -> io::Result<()> {
    while let Some(entry) = rx.recv().await {
        writeln!(out, "{}", format_entry(&entry, color))?;
        out.flush()?;
    }
    Ok(())
}
