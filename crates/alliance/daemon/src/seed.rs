//! Initial alliance state loaded at startup.

use std::path::Path;

use alliance_types::Alliance;

use crate::error::{DaemonError, DaemonResult};

/// Read a JSON array of alliances.
pub async fn load_alliances(path: &Path) -> DaemonResult<Vec<Alliance>> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| DaemonError::Seed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
