// certificates/verify.rs — Public certificate verification.
//
// Strictly read-only: a verification never mutates the certificate or any
// referenced document. An invalid outcome carries exactly one reason string;
// a valid outcome carries the presentable certificate fields.

use serde::Serialize;
use tracing::debug;

use super::CertificateStatus;
use crate::errors::ApiError;
use crate::AppContext;

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedCertificate {
    pub id: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "courseName")]
    pub course_name: String,
    #[serde(rename = "completionDate")]
    pub completion_date: String,
    #[serde(rename = "pdfUrl")]
    pub pdf_url: Option<String>,
    #[serde(rename = "issuedAt")]
    pub issued_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<VerifiedCertificate>,
}

impl Verification {
    fn invalid(reason: &str) -> Self {
        Verification {
            valid: false,
            reason: Some(reason.to_string()),
            certificate: None,
        }
    }
}

pub async fn verify_certificate(
    ctx: &AppContext,
    certificate_id: &str,
) -> Result<Verification, ApiError> {
    let cert = match ctx.storage.get_certificate(certificate_id).await? {
        Some(c) => c,
        None => return Ok(Verification::invalid("Certificate not found")),
    };

    match cert.status.parse::<CertificateStatus>() {
        Ok(CertificateStatus::Failed) => {
            return Ok(Verification::invalid("Certificate generation failed"))
        }
        Ok(CertificateStatus::Pending) => {
            return Ok(Verification::invalid("Certificate not yet generated"))
        }
        Ok(CertificateStatus::Generated) => {}
        Err(e) => return Err(ApiError::External(e)),
    }

    // The certificate must still point at live documents.
    let user = ctx.storage.get_user(&cert.student_id).await?;
    let course = ctx.storage.get_course(&cert.course_id).await?;
    if user.is_none() || course.is_none() {
        debug!(certificate_id = %certificate_id, "verification failed reference check");
        return Ok(Verification::invalid("Invalid user or course reference"));
    }

    Ok(Verification {
        valid: true,
        reason: None,
        certificate: Some(VerifiedCertificate {
            id: cert.id,
            student_name: cert.student_name,
            course_name: cert.course_name,
            completion_date: cert.completion_date,
            pdf_url: cert.pdf_url,
            issued_at: cert.generated_at,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::testctx;
    use crate::store::{CertificateRow, CourseRow, UserRow};
    use chrono::Utc;

    async fn seed_refs(ctx: &AppContext) {
        ctx.storage
            .put_user(&UserRow {
                id: "u1".into(),
                email: "u1@example.com".into(),
                display_name: "Ada Lovelace".into(),
                photo_url: None,
                name: None,
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

    async fn seed_cert(ctx: &AppContext, id: &str, status: &str) {
        ctx.storage
            .insert_certificate(&CertificateRow {
                id: id.to_string(),
                student_id: "u1".into(),
                course_id: "c1".into(),
                student_name: "Ada Lovelace".into(),
                course_name: "Analytical Engines".into(),
                completion_date: "2024-01-01".into(),
                status: status.to_string(),
                pdf_url: None,
                error: None,
                created_at: Utc::now().to_rfc3339(),
                generated_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn verifying_a_generated_certificate_succeeds() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed_refs(&ctx).await;
        seed_cert(&ctx, "cert-1-aaa", "pending").await;
        assert!(ctx
            .storage
            .mark_certificate_generated("cert-1-aaa", "file:///certs/cert-1-aaa.svg")
            .await
            .unwrap());

        let v = verify_certificate(&ctx, "cert-1-aaa").await.unwrap();
        assert!(v.valid);
        assert!(v.reason.is_none());
        let cert = v.certificate.unwrap();
        assert_eq!(cert.student_name, "Ada Lovelace");
        assert_eq!(cert.completion_date, "2024-01-01");
        assert_eq!(cert.pdf_url.as_deref(), Some("file:///certs/cert-1-aaa.svg"));
        assert!(cert.issued_at.is_some());
    }

    #[tokio::test]
    async fn missing_certificate_reports_not_found() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        let v = verify_certificate(&ctx, "cert-gone").await.unwrap();
        assert!(!v.valid);
        assert_eq!(v.reason.as_deref(), Some("Certificate not found"));
        assert!(v.certificate.is_none());
    }

    #[tokio::test]
    async fn pending_and_failed_report_their_reasons() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed_refs(&ctx).await;
        seed_cert(&ctx, "cert-1-bbb", "pending").await;
        seed_cert(&ctx, "cert-1-ccc", "pending").await;
        assert!(ctx
            .storage
            .mark_certificate_failed("cert-1-ccc", "render error")
            .await
            .unwrap());

        let pending = verify_certificate(&ctx, "cert-1-bbb").await.unwrap();
        assert_eq!(pending.reason.as_deref(), Some("Certificate not yet generated"));

        let failed = verify_certificate(&ctx, "cert-1-ccc").await.unwrap();
        assert_eq!(failed.reason.as_deref(), Some("Certificate generation failed"));
    }

    #[tokio::test]
    async fn dangling_references_invalidate_the_certificate() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed_refs(&ctx).await;
        seed_cert(&ctx, "cert-1-ddd", "pending").await;
        ctx.storage
            .mark_certificate_generated("cert-1-ddd", "file:///x.svg")
            .await
            .unwrap();

        // Certificate for a course that no longer exists.
        ctx.storage
            .insert_certificate(&CertificateRow {
                id: "cert-1-eee".into(),
                student_id: "u1".into(),
                course_id: "c-gone".into(),
                student_name: "Ada Lovelace".into(),
                course_name: "Vanished".into(),
                completion_date: "2024-01-01".into(),
                status: "pending".into(),
                pdf_url: None,
                error: None,
                created_at: Utc::now().to_rfc3339(),
                generated_at: None,
            })
            .await
            .unwrap();
        ctx.storage
            .mark_certificate_generated("cert-1-eee", "file:///y.svg")
            .await
            .unwrap();

        let ok = verify_certificate(&ctx, "cert-1-ddd").await.unwrap();
        assert!(ok.valid);

        let bad = verify_certificate(&ctx, "cert-1-eee").await.unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.reason.as_deref(), Some("Invalid user or course reference"));
    }

    #[tokio::test]
    async fn verification_never_writes() {
        let (ctx, _rx, _dir) = testctx::app_context().await;
        seed_refs(&ctx).await;
        seed_cert(&ctx, "cert-1-fff", "pending").await;

        let before = ctx.storage.get_certificate("cert-1-fff").await.unwrap().unwrap();
        verify_certificate(&ctx, "cert-1-fff").await.unwrap();
        let after = ctx.storage.get_certificate("cert-1-fff").await.unwrap().unwrap();
        assert_eq!(before.status, after.status);
        assert_eq!(before.created_at, after.created_at);
    }
}
