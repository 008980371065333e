//! Tabular sink: serializes uniformly-shaped rows to CSV files.
//!
//! One file per pipeline stage, header row first, overwriting any existing
//! file of the same name. The whole table is built in memory and written
//! in a single call, so a failed write leaves either the previous file or
//! a completed new one, and the stage reports failure before any dependent
//! stage runs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

/// A table could not be written.
#[derive(Debug, thiserror::Error)]
#[error("failed to write table '{table}' to {path}: {source}")]
pub struct SinkError {
    pub table: String,
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// Writes CSV tables into one output directory.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvSink { dir: dir.into() }
    }

    /// Path the given table is (or will be) written to.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    /// Serializes `header` + `rows` to `<dir>/<name>.csv`, overwriting.
    pub fn write_table<R>(&self, name: &str, header: &[&str], rows: R) -> Result<(), SinkError>
    where
        R: IntoIterator<Item = Vec<String>>,
    {
        let path = self.table_path(name);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!(error = ?e, path = %parent.display(), "failed to create output directory");
                    return Err(SinkError {
                        table: name.to_string(),
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }

        let mut out = String::new();
        push_row(&mut out, header.iter().map(|s| s.to_string()));
        let mut row_count = 0usize;
        for row in rows {
            push_row(&mut out, row.into_iter());
            row_count += 1;
        }

        match fs::write(&path, out) {
            Ok(()) => {
                info!(table = name, rows = row_count, path = %path.display(), "table written");
                Ok(())
            }
            Err(e) => {
                error!(error = ?e, table = name, path = %path.display(), "failed to write table");
                Err(SinkError {
                    table: name.to_string(),
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape(&cell));
    }
    out.push('\n');
}

/// RFC 4180 quoting: fields containing comma, quote or newline are wrapped
/// in quotes with inner quotes doubled.
fn escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
