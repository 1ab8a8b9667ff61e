//! Input table ingestion and validation.
//!
//! The table is a comma-separated file with a header row. Header names are
//! matched case- and whitespace-insensitively. The non-Dublin-Core columns
//! decide the upload mode; Dublin Core columns may repeat.
//!
//! Validation runs over the whole file before any tree node is built:
//! columns first, then folder names, file existence, repeated files, and file
//! names that shadow digital object names. Every check reports all offenders at once.

use crate::error::{read_error, DuplicatePath, EngineError, Result};
use crate::model::{DcField, DublinCore, UploadMode};
use csv::ReaderBuilder;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const FILEPATH: &str = "filepath";
pub const DIGITAL_OBJECT_NAME: &str = "digital object name";
pub const SECURITY_TAG: &str = "security tag";
pub const DIGITAL_SURROGATE: &str = "digital surrogate";
pub const ARCHIVAL_OBJECT_NUMBER: &str = "archival object number";
pub const COLLECTION_NAME: &str = "collection name";
pub const COLLECTION_NUMBER: &str = "collection number";

const COMMON_COLUMNS: [&str; 4] = [FILEPATH, DIGITAL_OBJECT_NAME, SECURITY_TAG, DIGITAL_SURROGATE];

/// Non-Dublin-Core columns that identify `mode`.
pub fn mode_columns(mode: UploadMode) -> Vec<&'static str> {
    let mut columns = COMMON_COLUMNS.to_vec();
    match mode {
        UploadMode::Linked => columns.push(ARCHIVAL_OBJECT_NUMBER),
        UploadMode::Manual => columns.extend([COLLECTION_NAME, COLLECTION_NUMBER]),
    }
    columns
}

/// Lower-case and trim a header name.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One data row, cells labelled by normalized column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// Line in the file where the row starts (header is line 1)
    pub line: usize,
    cells: Vec<(String, String)>,
    source_path: PathBuf,
}

impl TableRow {
    /// Value of the first cell under `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value under `column`, or empty if the row is short.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Canonical path of the file this row describes.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Non-blank Dublin Core cells grouped by field, repeats kept in column order.
    pub fn dublin_core(&self) -> Option<DublinCore> {
        let mut dc = DublinCore::new();
        for (column, value) in &self.cells {
            if let Some(field) = DcField::from_column(column) {
                if !value.is_empty() {
                    dc.push(field, value.as_str());
                }
            }
        }
        if dc.is_empty() {
            None
        } else {
            Some(dc)
        }
    }
}

/// A validated input table.
#[derive(Debug, Clone)]
pub struct Table {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub mode: UploadMode,
    pub rows: Vec<TableRow>,
}

/// Read and validate the table at `path`.
///
/// # Errors
/// - EngineError::TableNotFound / TableRead / MissingHeader if the file cannot be parsed
/// - EngineError::InvalidColumns / UnresolvedMode if the header is not a known layout
/// - EngineError::EmptyTable if there are no data rows
/// - EngineError::InvalidFolderNames / MissingFiles / DuplicateFilepaths / NameCollisions from the global checks
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.is_file() {
        return Err(EngineError::TableNotFound {
            path: path.to_path_buf(),
        });
    }
    let table_error = |source: csv::Error| EngineError::TableRead {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(table_error)?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(table_error)?
        .iter()
        .map(normalize_header)
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(EngineError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let mode = infer_mode(&columns)?;
    tracing::debug!(mode = %mode, columns = columns.len(), "upload mode inferred");

    let mut raw_rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(table_error)?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let cells = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.clone(), record.get(i).unwrap_or("").trim().to_string()))
            .collect();
        raw_rows.push((line, cells));
    }

    if raw_rows.is_empty() {
        return Err(EngineError::EmptyTable {
            path: path.to_path_buf(),
        });
    }

    let rows = validate_rows(mode, raw_rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), mode = %mode, "table validated");

    Ok(Table {
        path: path.to_path_buf(),
        columns,
        mode,
        rows,
    })
}

/// Determine the upload mode from the normalized header.
///
/// # Errors
/// Returns EngineError::InvalidColumns naming every unrecognized or repeated
/// non-Dublin-Core column, else EngineError::UnresolvedMode if the column
/// set matches neither mode
pub fn infer_mode(columns: &[String]) -> Result<UploadMode> {
    let linked = mode_columns(UploadMode::Linked);
    let manual = mode_columns(UploadMode::Manual);

    let mut seen = HashSet::new();
    let mut unknown: Vec<String> = Vec::new();
    let mut duplicate: Vec<String> = Vec::new();
    for column in columns {
        if DcField::from_column(column).is_some() {
            continue;
        }
        let known = linked.contains(&column.as_str()) || manual.contains(&column.as_str());
        if !known {
            if !unknown.contains(column) {
                unknown.push(column.clone());
            }
        } else if !seen.insert(column.as_str()) && !duplicate.contains(column) {
            duplicate.push(column.clone());
        }
    }

    if !unknown.is_empty() || !duplicate.is_empty() {
        return Err(EngineError::InvalidColumns { unknown, duplicate });
    }

    let found: BTreeSet<&str> = seen.into_iter().collect();
    let as_set = |cols: &[&'static str]| cols.iter().copied().collect::<BTreeSet<&str>>();
    if found == as_set(&linked) {
        Ok(UploadMode::Linked)
    } else if found == as_set(&manual) {
        Ok(UploadMode::Manual)
    } else {
        Err(EngineError::UnresolvedMode {
            found: found.iter().map(|c| c.to_string()).collect(),
            linked: linked.iter().map(|c| c.to_string()).collect(),
            manual: manual.iter().map(|c| c.to_string()).collect(),
        })
    }
}

fn cell<'a>(cells: &'a [(String, String)], column: &str) -> &'a str {
    cells
        .iter()
        .find(|(name, _)| name == column)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

/// Columns whose values become a single folder name.
fn folder_name_columns(mode: UploadMode) -> [&'static str; 2] {
    match mode {
        UploadMode::Linked => [ARCHIVAL_OBJECT_NUMBER, DIGITAL_OBJECT_NAME],
        UploadMode::Manual => [COLLECTION_NAME, DIGITAL_OBJECT_NAME],
    }
}

/// True if `name` is usable as exactly one path component.
pub fn is_valid_folder_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn validate_rows(mode: UploadMode, raw_rows: Vec<(usize, Vec<(String, String)>)>) -> Result<Vec<TableRow>> {
    let invalid_names: Vec<(usize, String)> = raw_rows
        .iter()
        .flat_map(|(line, cells)| {
            folder_name_columns(mode)
                .into_iter()
                .map(move |column| (*line, cell(cells, column)))
        })
        .filter(|(_, name)| !is_valid_folder_name(name))
        .map(|(line, name)| (line, name.to_string()))
        .collect();
    if !invalid_names.is_empty() {
        return Err(EngineError::InvalidFolderNames { names: invalid_names });
    }

    let missing: Vec<PathBuf> = raw_rows
        .iter()
        .map(|(_, cells)| PathBuf::from(cell(cells, FILEPATH)))
        .filter(|p| !p.is_file())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingFiles { paths: missing });
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (line, cells) in raw_rows {
        let given = PathBuf::from(cell(&cells, FILEPATH));
        let source_path = fs::canonicalize(&given).map_err(read_error(&given))?;
        rows.push(TableRow {
            line,
            cells,
            source_path,
        });
    }

    let mut first_seen: HashMap<&Path, usize> = HashMap::new();
    let mut duplicates: Vec<DuplicatePath> = Vec::new();
    for row in &rows {
        match first_seen.get(row.source_path.as_path()) {
            Some(&first_line) => match duplicates.iter_mut().find(|d| d.path == row.source_path) {
                Some(entry) => entry.lines.push(row.line),
                None => duplicates.push(DuplicatePath {
                    path: row.source_path.clone(),
                    lines: vec![first_line, row.line],
                }),
            },
            None => {
                first_seen.insert(row.source_path.as_path(), row.line);
            }
        }
    }
    if !duplicates.is_empty() {
        return Err(EngineError::DuplicateFilepaths { duplicates });
    }

    let digital_objects: HashSet<&str> = rows.iter().map(|r| r.value(DIGITAL_OBJECT_NAME)).collect();
    let collisions: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.source_path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| digital_objects.contains(n.as_str()))
        .collect();
    if !collisions.is_empty() {
        return Err(EngineError::NameCollisions {
            names: collisions.into_iter().collect(),
        });
    }

    Ok(rows)
}
