//! JSON I/O handling for CLI
//!
//! - Input rows: JSON lines, each an array of values
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::expression::Val;

use super::errors::{CliError, CliResult};

/// Read and parse a JSON document from a file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let file = File::open(path)
        .map_err(|e| CliError::io_error(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Open a rows source; `-` is stdin.
pub fn open_rows(path: &Path) -> CliResult<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path)
        .map_err(|e| CliError::io_error(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Rows from JSON lines. Blank lines are skipped.
pub fn read_rows(reader: impl BufRead) -> impl Iterator<Item = CliResult<Vec<Val>>> {
    reader.lines().enumerate().filter_map(|(number, line)| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(CliError::from(e))),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(parse_row(&line).map_err(|e| CliError::invalid_input(format!("line {}: {}", number + 1, e.message()))))
    })
}

fn parse_row(line: &str) -> CliResult<Vec<Val>> {
    match serde_json::from_str::<Value>(line)? {
        Value::Array(values) => Ok(values.iter().map(Val::from).collect()),
        _ => Err(CliError::invalid_input("row must be a JSON array")),
    }
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
