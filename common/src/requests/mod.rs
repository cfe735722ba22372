use serde::{Deserialize, Serialize};

/// Request payload for the mapping start endpoint.
/// Contains the order whose items should be mapped.
#[derive(Serialize, Deserialize)]
pub struct StartMappingRequest {
    pub order_id: String,
}

/// Request payload for the master CSV preview endpoint.
#[derive(Serialize, Deserialize)]
pub struct PreviewMasterRequest {
    /// Blob-store path of the master CSV.
    pub path: String,
}

/// Metadata part accompanying a master CSV upload.
#[derive(Serialize, Deserialize)]
pub struct MasterUpload {
    /// Logical dataset name; the stored blob key is derived from it and the
    /// uploaded content hash.
    pub dataset_id: String,
}
