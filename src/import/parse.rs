//! Parsing for uploaded compound tables and gene cluster files.

use super::types::{CandidateRecord, ImportError, ParsedTable};
use std::path::Path;

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Pick the column delimiter from the file extension.
pub fn delimiter_for(file_name: &str) -> Result<u8, ImportError> {
    match extension(file_name).as_deref() {
        Some("csv") => Ok(b','),
        Some("tsv") | Some("txt") => Ok(b'\t'),
        _ => Err(ImportError::Validation(format!(
            "Unsupported file type: {} (expected .csv, .tsv or .txt)",
            file_name
        ))),
    }
}

/// Whether a file name looks like a compound table rather than a gene cluster.
pub fn is_compound_table(file_name: &str) -> bool {
    delimiter_for(file_name).is_ok()
}

pub fn check_size(file_name: &str, len: u64, max_bytes: u64) -> Result<(), ImportError> {
    if len > max_bytes {
        return Err(ImportError::Validation(format!(
            "{} is too large ({} bytes, limit is {} bytes)",
            file_name, len, max_bytes
        )));
    }
    Ok(())
}

fn decode<'a>(file_name: &str, bytes: &'a [u8]) -> Result<&'a str, ImportError> {
    std::str::from_utf8(bytes)
        .map_err(|_| ImportError::Validation(format!("{} is not valid UTF-8 text", file_name)))
}

/// Parse a delimited table with `name` and `smiles` columns.
///
/// Cells may be quoted. Rows that can't be read or are missing either value
/// are skipped and counted; empty lines are ignored.
pub fn parse_compound_table(file_name: &str, bytes: &[u8]) -> Result<ParsedTable, ImportError> {
    let delimiter = delimiter_for(file_name)?;
    let text = decode(file_name, bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ImportError::Validation(format!("Could not read {}: {}", file_name, e)))?;
    let name_col = headers.iter().position(|c| c.eq_ignore_ascii_case("name"));
    let smiles_col = headers.iter().position(|c| c.eq_ignore_ascii_case("smiles"));

    let (Some(name_col), Some(smiles_col)) = (name_col, smiles_col) else {
        return Err(ImportError::Validation(format!(
            "{} must have 'name' and 'smiles' columns",
            file_name
        )));
    };

    let mut table = ParsedTable::default();

    for row in reader.records() {
        let record = match &row {
            Ok(row) => match (row.get(name_col), row.get(smiles_col)) {
                (Some(name), Some(smiles)) => CandidateRecord::compound(name, smiles).ok(),
                _ => None,
            },
            Err(e) => {
                tracing::debug!("Unreadable row in {}: {}", file_name, e);
                None
            }
        };

        match record {
            Some(record) => table.records.push(record),
            None => {
                let line = row
                    .as_ref()
                    .ok()
                    .and_then(|r| r.position())
                    .map(|p| p.line())
                    .unwrap_or_default();
                tracing::debug!("Skipping malformed row at line {} in {}", line, file_name);
                table.skipped_rows += 1;
            }
        }
    }

    if table.records.is_empty() {
        return Err(ImportError::Validation(format!(
            "No valid compounds found in {}",
            file_name
        )));
    }

    Ok(table)
}

/// Read a gene cluster file. The item takes its name from the file stem.
pub fn parse_gene_cluster(file_name: &str, bytes: &[u8]) -> Result<CandidateRecord, ImportError> {
    let content = decode(file_name, bytes)?;
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);

    CandidateRecord::gene_cluster(stem, content)
}
