// retention/export.rs — Subject-access data export.
//
// One JSON artifact per request: the user document plus every record in the
// five export subcollections. The artifact is written once to the object
// store at a path namespaced by user and timestamp, and never overwritten.
// Any partial read aborts the whole export — a partial artifact is worse
// than no artifact.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{RetentionEngine, EXPORT_COLLECTIONS};
use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    /// Object-store path of the artifact.
    pub path: String,
    /// Long-lived retrieval reference.
    pub reference: String,
    pub exported_at: String,
}

impl RetentionEngine {
    pub async fn export_user_data(&self, user_id: &str) -> Result<ExportArtifact, ApiError> {
        let user = self
            .storage()
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        let mut collections = serde_json::Map::new();
        for name in EXPORT_COLLECTIONS {
            // Propagates on failure: a missing subcollection read means no export.
            let docs = self.storage().list_user_documents(user_id, name).await?;
            collections.insert(name.to_string(), json!(docs));
        }

        let exported_at = Utc::now();
        let body = json!({
            "user": user,
            "collections": collections,
            "exportedAt": exported_at.to_rfc3339(),
            "purpose": "GDPR data export",
        });
        let bytes = serde_json::to_vec_pretty(&body).map_err(anyhow::Error::from)?;

        let path = format!("exports/{user_id}/{}_export.json", exported_at.timestamp_millis());
        self.blobs().put(&path, &bytes).await?;

        info!(user_id = %user_id, path = %path, bytes = bytes.len(), "user data exported");
        Ok(ExportArtifact {
            reference: self.blobs().read_reference(&path),
            path,
            exported_at: exported_at.to_rfc3339(),
        })
    }
}
