// certificates/issue.rs — The issuance trigger.
//
// Preconditions before any write: a completion record for (user, course) and
// both referenced documents present. The pending record is persisted
// synchronously — the caller gets an id it can poll immediately — and the
// generation task is dispatched to the worker queue.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CertificateStatus, GenerationTask};
use crate::auth::Principal;
use crate::errors::ApiError;
use crate::store::CertificateRow;
use crate::AppContext;

/// Allocate a unique certificate id. Timestamp plus a random suffix keeps
/// ids sortable by issuance time; collision probability is negligible.
fn new_certificate_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("cert-{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
}

/// Render the completion timestamp the way it appears on the certificate.
fn format_completion_date(completed_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(completed_at)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| completed_at.to_string())
}

pub async fn request_certificate(
    ctx: &AppContext,
    principal: &Principal,
    course_id: &str,
) -> Result<String, ApiError> {
    let user_id = &principal.user_id;

    let completion = ctx
        .storage
        .get_completion(user_id, course_id)
        .await?
        .ok_or_else(|| ApiError::Conflict("Course not completed".to_string()))?;

    let user = ctx
        .storage
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;
    let course = ctx
        .storage
        .get_course(course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course".to_string()))?;

    let student_name = if user.display_name.is_empty() {
        user.email.clone()
    } else {
        user.display_name.clone()
    };

    let certificate_id = new_certificate_id();
    let cert = CertificateRow {
        id: certificate_id.clone(),
        student_id: user_id.clone(),
        course_id: course_id.to_string(),
        student_name,
        course_name: course.title.clone(),
        completion_date: format_completion_date(&completion.completed_at),
        status: CertificateStatus::Pending.as_str().to_string(),
        pdf_url: None,
        error: None,
        created_at: Utc::now().to_rfc3339(),
        generated_at: None,
    };
    ctx.storage.insert_certificate(&cert).await?;
    info!(
        certificate_id = %certificate_id,
        user_id = %user_id,
        course_id = %course_id,
        "certificate issued as pending"
    );

    // Dispatch generation. If the worker is gone the record stays pending and
    // the recovery sweep handles it after restart.
    if ctx
        .cert_queue
        .send(GenerationTask {
            certificate_id: certificate_id.clone(),
        })
        .is_err()
    {
        warn!(certificate_id = %certificate_id, "generation queue closed — deferred to recovery sweep");
    }

    Ok(certificate_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::testctx;
    use crate::store::{CourseRow, UserRow};

    async fn seed(ctx: &AppContext) {
        ctx.storage
            .put_user(&UserRow {
                id: "u1".into(),
                email: "u1@example.com".into(),
                display_name: "Ada Lovelace".into(),
                photo_url: None,
                name: Some("Ada Lovelace".into()),
                phone: None,
                address: None,
                date_of_birth: None,
                is_anonymized: false,
                last_activity: Utc::now().timestamp(),
                anonymized_at: None,
                deleted_at: None,
            })
            .await
            .unwrap();
        ctx.storage
            .put_course(&CourseRow {
                id: "c1".into(),
                title: "Analytical Engines".into(),
                price: 0.0,
                status: "published".into(),
                content: None,
                created_by: None,
                created_at: Utc::now().to_rfc3339(),
                metadata: None,
            })
            .await
            .unwrap();
    }

    fn principal() -> Principal {
        Principal {
            user_id: "u1".into(),
            email: Some("u1@example.com".into()),
        }
    }

    #[tokio::test]
    async fn issuance_writes_pending_and_enqueues() {
        let (ctx, mut rx, _dir) = testctx::app_context().await;
        seed(&ctx).await;
        ctx.storage
            .put_completion("u1", "c1", "2024-01-01T10:30:00Z")
            .await
            .unwrap();

        let id = request_certificate(&ctx, &principal(), "c1").await.unwrap();
        assert!(id.starts_with("cert-"));

        let row = ctx.storage.get_certificate(&id).await.unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.student_id, "u1");
        assert_eq!(row.course_id, "c1");
        assert_eq!(row.student_name, "Ada Lovelace");
        assert_eq!(row.course_name, "Analytical Engines");
        assert_eq!(row.completion_date, "2024-01-01");

        let task = rx.recv().await.unwrap();
        assert_eq!(task.certificate_id, id);
    }

    #[tokio::test]
    async fn issuance_without_completion_is_a_precondition_failure() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed(&ctx).await;
        assert!(matches!(
            request_certificate(&ctx, &principal(), "c1").await.unwrap_err(),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn issuance_with_missing_course_is_not_found() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed(&ctx).await;
        ctx.storage
            .put_completion("u1", "c-gone", "2024-01-01T10:30:00Z")
            .await
            .unwrap();
        assert!(matches!(
            request_certificate(&ctx, &principal(), "c-gone").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_requests_mint_distinct_certificates() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed(&ctx).await;
        ctx.storage
            .put_completion("u1", "c1", "2024-01-01T10:30:00Z")
            .await
            .unwrap();

        let first = request_certificate(&ctx, &principal(), "c1").await.unwrap();
        let second = request_certificate(&ctx, &principal(), "c1").await.unwrap();
        assert_ne!(first, second);
    }
}
