//! relstore - database file inspector
//!
//! Usage: relstore-dump <file> [--schema] [table ...]

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use relstore::storage::Row;
use relstore::ExecutionEngine;

fn get_env_filter() -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    } else {
        EnvFilter::new("relstore=warn")
    }
}

/// Print help message
fn print_help() {
    println!(
        r#"
Usage: relstore-dump <file> [--schema] [table ...]

Prints every table of a saved relstore database, or only the named tables.

Options:
  --schema    Print table definitions without rows
  --help      Show this help message
"#
    );
}

/// Format rows as a table
fn format_results(columns: &[String], rows: &[Row]) -> String {
    if columns.is_empty() && rows.is_empty() {
        return String::new();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, value) in row.values().iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(value.to_string().chars().count());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in rows {
        let line: String = row
            .values()
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }

    if !rows.is_empty() {
        output.push_str(&separator);
    }
    output.push_str(&format!("{} row(s)\n", rows.len()));

    output
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(get_env_filter())
        .with_writer(std::io::stderr)
        .init();

    let mut path = None;
    let mut schema_only = false;
    let mut tables = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--schema" => schema_only = true,
            _ if path.is_none() => path = Some(arg),
            _ => tables.push(arg),
        }
    }
    let Some(path) = path else {
        print_help();
        bail!("missing database file");
    };

    let engine = ExecutionEngine::load(&path)
        .with_context(|| format!("failed to load database from '{}'", path))?;

    if tables.is_empty() {
        tables = engine.list_tables();
    }

    for table in &tables {
        let info = engine
            .database()
            .catalog()
            .get_table_info(table)
            .with_context(|| format!("cannot describe '{}'", table))?;
        print!("{}", info);

        if !schema_only {
            let result = engine.select(table, None, vec![])?;
            print!("{}", format_results(&result.columns, &result.rows));
        }
        println!();
    }

    Ok(())
}
