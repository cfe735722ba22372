use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The flat field map produced by the extraction service for one file.
///
/// Records are produced once, upstream, and consumed read-only by the
/// mapping engine; field iteration order is the sorted key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub fields: BTreeMap<String, String>,
}

impl ExtractedRecord {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

/// An extracted attachment record together with where its source file lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Blob-store location of the attachment file.
    pub storage_path: String,
    pub file_name: String,
    pub record: ExtractedRecord,
}
