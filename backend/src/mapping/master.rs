//! Master (reference) dataset loading.
//!
//! The master CSV is fetched from the blob store once per mapping run and
//! indexed in memory by the normalized join-key tuple. After `load` returns
//! the dataset is never mutated, so it can be shared read-only across the
//! per-item mapping work of one order.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::Serialize;

use crate::error::{MappingError, Result};
use crate::mapping::normalize::{normalize, JoinKeyPolicy};
use crate::storage::BlobStore;

/// A fully indexed master dataset.
pub struct MasterDataset {
    pub headers: Vec<String>,
    /// Every data row, in file order. Duplicate-key rows stay here even
    /// though only the last one is reachable through the index.
    rows: Vec<BTreeMap<String, String>>,
    index: HashMap<Vec<String>, usize>,
    pub row_count: usize,
}

impl MasterDataset {
    pub fn lookup(&self, key: &[String]) -> Option<&BTreeMap<String, String>> {
        self.index.get(key).map(|i| &self.rows[*i])
    }

    pub fn indexed_keys(&self) -> usize {
        self.index.len()
    }
}

/// Headers and row count only, for admin previews. Produced without
/// building the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterPreview {
    pub headers: Vec<String>,
    pub row_count: usize,
}

fn open_reader(data: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().has_headers(true).from_reader(data)
}

/// Load and index the master CSV at `path`.
///
/// Duplicate join keys overwrite deterministically, last row wins, and are
/// logged rather than treated as fatal. A row that fails to parse fails the
/// whole load: a partially indexed master dataset is worse than none.
pub fn load(
    store: &dyn BlobStore,
    path: &str,
    join_keys: &[String],
    policy: &JoinKeyPolicy,
) -> Result<MasterDataset> {
    let data = store.get(path)?;
    let mut reader = open_reader(&data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| MappingError::Format(format!("{}: {}", path, err)))?
        .iter()
        .map(str::to_string)
        .collect();

    let missing: Vec<&String> = join_keys
        .iter()
        .filter(|key| !headers.iter().any(|h| h == *key))
        .collect();
    if !missing.is_empty() {
        return Err(MappingError::Format(format!(
            "{}: join key column(s) missing from master dataset: {}",
            path,
            missing
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let mut rows = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();

    for record in reader.records() {
        let record =
            record.map_err(|err| MappingError::Format(format!("{}: {}", path, err)))?;
        let row: BTreeMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();

        let key: Vec<String> = join_keys
            .iter()
            .map(|k| normalize(row.get(k).map(String::as_str).unwrap_or(""), k, policy))
            .collect();

        let position = rows.len();
        rows.push(row);

        if key.iter().all(String::is_empty) {
            debug!("{}: row {} has a blank join key, not indexed", path, position + 1);
            continue;
        }
        if index.insert(key.clone(), position).is_some() {
            warn!(
                "{}: duplicate join key {:?}, keeping row {}",
                path,
                key,
                position + 1
            );
        }
    }

    let row_count = rows.len();
    Ok(MasterDataset {
        headers,
        rows,
        index,
        row_count,
    })
}

/// Lightweight preview path: headers and row count, no index.
pub fn headers_only(store: &dyn BlobStore, path: &str) -> Result<MasterPreview> {
    let data = store.get(path)?;
    let mut reader = open_reader(&data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| MappingError::Format(format!("{}: {}", path, err)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut row_count = 0usize;
    let mut record = csv::ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => row_count += 1,
            Ok(false) => break,
            Err(err) => return Err(MappingError::Format(format!("{}: {}", path, err))),
        }
    }

    Ok(MasterPreview { headers, row_count })
}
