//! Output formatting utilities for CLI commands

use colored::Colorize;
use tally_shared::ClickRecord;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Render stats as an aligned table with a total line.
pub fn stats_table(records: &[ClickRecord]) -> String {
    let mut out = format!(
        "{:<22} {:>12} {:>10}\n",
        "BUCKET".bold(),
        "ENTITY".bold(),
        "CLICKS".bold()
    );
    for r in records {
        out.push_str(&format!(
            "{:<22} {:>12} {:>10}\n",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.entity_id,
            r.count.to_string().cyan()
        ));
    }
    let total: u64 = records.iter().map(|r| r.count).sum();
    out.push_str(&format!(
        "{} {} click(s) across {} bucket(s)",
        "Σ".bold(),
        total,
        records.len()
    ));
    out
}
