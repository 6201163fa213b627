// retention/erasure.rs — Subject-request anonymization and account deletion.

use tracing::{info, warn};

use super::{RetentionEngine, PURGE_COLLECTIONS};
use crate::errors::ApiError;

/// Object-store prefixes holding user-owned files, removed on account deletion.
const FILE_PREFIXES: [&str; 2] = ["profile-pictures", "user-uploads"];

impl RetentionEngine {
    /// Replace the user's personal-data fields with fixed placeholders.
    ///
    /// Idempotent: anonymizing an already-anonymized user changes nothing.
    /// Returns `true` if this call performed the anonymization.
    pub async fn anonymize_user(&self, user_id: &str) -> Result<bool, ApiError> {
        if self.storage().get_user(user_id).await?.is_none() {
            return Err(ApiError::NotFound("User".to_string()));
        }

        let changed = self.storage().anonymize_user(user_id).await?;
        if changed {
            info!(user_id = %user_id, "user anonymized");
        }
        Ok(changed)
    }

    /// GDPR account deletion.
    ///
    /// The subcollection purge and the main-document anonymization commit as
    /// one transaction — that write is what establishes "user considered
    /// deleted". Object-store cleanup afterwards is best-effort: a failure
    /// there is logged and can be retried without affecting the deletion
    /// invariant.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<(), ApiError> {
        let user = self
            .storage()
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;
        if user.deleted_at.is_some() {
            return Err(ApiError::Conflict("Account already deleted".to_string()));
        }

        self.storage()
            .delete_user_account(user_id, &PURGE_COLLECTIONS)
            .await?;
        info!(user_id = %user_id, "account deleted and anonymized");

        for prefix in FILE_PREFIXES {
            let full = format!("{prefix}/{user_id}/");
            match self.blobs().delete_prefix(&full).await {
                Ok(n) if n > 0 => info!(user_id = %user_id, prefix = %prefix, deleted = n, "user files removed"),
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id = %user_id, prefix = %prefix, err = %e, "file cleanup failed — retry later")
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::BlobStore;
    use crate::retention::RetentionEngine;
    use crate::store::{Storage, UserRow, DELETED_EMAIL};
    use std::sync::Arc;

    async fn engine() -> (RetentionEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
        let blobs = Arc::new(BlobStore::new(dir.path()).await.unwrap());
        (RetentionEngine::new(storage, blobs), dir)
    }

    fn user(id: &str) -> UserRow {
        UserRow {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            display_name: id.to_string(),
            photo_url: None,
            name: Some("Someone".to_string()),
            phone: Some("+1 555 0100".to_string()),
            address: None,
            date_of_birth: None,
            is_anonymized: false,
            last_activity: chrono::Utc::now().timestamp(),
            anonymized_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn anonymize_twice_changes_nothing_the_second_time() {
        let (engine, _dir) = engine().await;
        engine.storage().put_user(&user("u1")).await.unwrap();

        assert!(engine.anonymize_user("u1").await.unwrap());
        let after_first = engine.storage().get_user("u1").await.unwrap().unwrap();

        assert!(!engine.anonymize_user("u1").await.unwrap());
        let after_second = engine.storage().get_user("u1").await.unwrap().unwrap();

        assert_eq!(after_first.anonymized_at, after_second.anonymized_at);
        assert_eq!(after_first.name, after_second.name);
    }

    #[tokio::test]
    async fn anonymize_missing_user_is_not_found() {
        let (engine, _dir) = engine().await;
        assert!(matches!(
            engine.anonymize_user("ghost").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_purges_documents_placeholders_and_files() {
        let (engine, _dir) = engine().await;
        engine.storage().put_user(&user("u2")).await.unwrap();
        for c in PURGE_COLLECTIONS {
            engine
                .storage()
                .put_user_document("u2", c, "d1", &serde_json::json!({"x": 1}))
                .await
                .unwrap();
        }
        engine
            .blobs()
            .put("profile-pictures/u2/avatar.png", b"png")
            .await
            .unwrap();
        engine
            .blobs()
            .put("user-uploads/u2/notes.txt", b"notes")
            .await
            .unwrap();

        engine.delete_user_data("u2").await.unwrap();

        let row = engine.storage().get_user("u2").await.unwrap().unwrap();
        assert_eq!(row.email, DELETED_EMAIL);
        assert!(row.is_anonymized);
        assert!(row.deleted_at.is_some());
        for c in PURGE_COLLECTIONS {
            assert_eq!(
                engine.storage().count_user_documents("u2", c).await.unwrap(),
                0
            );
        }
        assert!(!engine
            .blobs()
            .exists("profile-pictures/u2/avatar.png")
            .await
            .unwrap());
        assert!(!engine.blobs().exists("user-uploads/u2/notes.txt").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_twice_is_a_conflict() {
        let (engine, _dir) = engine().await;
        engine.storage().put_user(&user("u3")).await.unwrap();
        engine.delete_user_data("u3").await.unwrap();
        assert!(matches!(
            engine.delete_user_data("u3").await.unwrap_err(),
            ApiError::Conflict(_)
        ));
    }
}
