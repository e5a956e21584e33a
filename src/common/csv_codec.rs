use crate::common::error::SyncError;
use crate::records::CsvRow;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;

/// Reads every row of `path`, matching columns by header name.
pub fn load_csv<T: CsvRow>(path: &Path) -> Result<Vec<T>, SyncError> {
    let file = File::open(path).map_err(|source| SyncError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = read_rows(file).map_err(|source| SyncError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_rows<T: CsvRow, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes the header followed by `rows`. The header is written even when
/// `rows` is empty.
pub fn write_rows<T: CsvRow, W: Write>(writer: W, rows: &[T]) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(T::HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `rows` to `path`, or to stdout when no path is given.
pub fn write_csv<T: CsvRow>(path: Option<&Path>, rows: &[T]) -> Result<(), SyncError> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(|source| SyncError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            write_rows(file, rows)?;
            debug!("Wrote {} rows to {}", rows.len(), path.display());
        }
        None => write_rows(io::stdout().lock(), rows)?,
    }
    Ok(())
}

pub fn write_header<T: CsvRow, W: Write>(writer: W) -> Result<(), csv::Error> {
    write_rows::<T, W>(writer, &[])
}
