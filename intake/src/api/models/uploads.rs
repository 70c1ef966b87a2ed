use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::StoredFile;

/// Successful upload response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Sanitized filename the upload was stored under
    pub filename: String,
    /// Stored size in megabytes, rounded to 2 decimal places
    pub size: f64,
}

impl UploadResponse {
    /// Convert from the store's descriptor
    pub fn from_stored(stored: &StoredFile) -> Self {
        Self {
            filename: stored.filename.clone(),
            size: stored.size_mb(),
        }
    }
}

/// Error payload attached to every non-2xx response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    pub detail: String,
}
