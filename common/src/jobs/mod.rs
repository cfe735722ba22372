use serde::{Deserialize, Serialize};

/// Status of a background job (CSV preview, mapping run), keyed by job id in
/// the shared job state and polled over the status endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    /// Percentage of completed work, 0-100.
    InProgress(u32),
    Completed(String),
    Failed(String),
}
