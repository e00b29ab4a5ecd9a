use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::types::ResultRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupStats {
    pub before: usize,
    pub after: usize,
    pub output: PathBuf,
}

/// Append `records` to the CSV at `path`. A missing or empty file gets the
/// header row first.
pub fn append(records: &[ResultRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(needs_header).from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_all(path: &Path) -> Result<Vec<ResultRecord>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// `dir/new_<name>` next to `path`.
pub fn dedup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("new_{name}"))
}

/// Drop exact-duplicate rows from the CSV at `path` and write the result to
/// `new_<name>` beside it. The source file is left untouched.
pub fn deduplicate(path: &Path) -> Result<Option<DedupStats>> {
    if !path.exists() {
        warn!("File {} does not exist. No duplicates to remove.", path.display());
        return Ok(None);
    }
    let records = read_all(path)?;
    if records.is_empty() {
        warn!("File {} is empty. No duplicates to remove.", path.display());
        return Ok(None);
    }

    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<ResultRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect();
    let after = unique.len();

    let output = dedup_path(path);
    let mut wtr = csv::Writer::from_path(&output)?;
    for record in &unique {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    info!(
        "Removed duplicates from {}. Initial count: {before}, Final count: {after}",
        path.display()
    );
    info!("Clean data saved to {}", output.display());
    Ok(Some(DedupStats { before, after, output }))
}
