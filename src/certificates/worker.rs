// certificates/worker.rs — The generation worker.
//
// Single consumer of the generation queue. Every task it accepts ends in a
// terminal status: on any generation error the record is marked `failed`
// with the error string, so no certificate is left pending by a fault in
// the pipeline itself. A startup recovery sweep re-enqueues certificates a
// previous process left pending.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{render::render_certificate, CertificateStatus, GenerationTask};
use crate::store::CertificateRow;
use crate::AppContext;

pub fn spawn(ctx: Arc<AppContext>, rx: UnboundedReceiver<GenerationTask>) -> JoinHandle<()> {
    tokio::spawn(run(ctx, rx))
}

async fn run(ctx: Arc<AppContext>, mut rx: UnboundedReceiver<GenerationTask>) {
    recover_pending(&ctx).await;
    while let Some(task) = rx.recv().await {
        generate(&ctx, &task.certificate_id).await;
    }
    info!("certificate worker stopped");
}

/// Re-drive certificates left pending by an earlier process.
async fn recover_pending(ctx: &AppContext) {
    match ctx.storage.pending_certificate_ids().await {
        Ok(ids) => {
            if !ids.is_empty() {
                info!(count = ids.len(), "recovering pending certificates");
            }
            for id in ids {
                generate(ctx, &id).await;
            }
        }
        Err(e) => error!(err = %e, "pending-certificate recovery sweep failed"),
    }
}

/// Drive one certificate to a terminal state.
pub async fn generate(ctx: &AppContext, certificate_id: &str) {
    let cert = match ctx.storage.get_certificate(certificate_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!(certificate_id = %certificate_id, "generation task for unknown certificate");
            return;
        }
        Err(e) => {
            error!(certificate_id = %certificate_id, err = %e, "certificate lookup failed");
            return;
        }
    };
    if cert.status != CertificateStatus::Pending.as_str() {
        // Already terminal; nothing to do.
        return;
    }

    match generate_inner(ctx, &cert).await {
        Ok(pdf_url) => {
            info!(certificate_id = %certificate_id, url = %pdf_url, "certificate generated");
            mirror_to_user(ctx, &cert, &pdf_url).await;
        }
        Err(e) => {
            error!(certificate_id = %certificate_id, err = %e, "certificate generation failed");
            match ctx
                .storage
                .mark_certificate_failed(certificate_id, &e.to_string())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(certificate_id = %certificate_id, "failure not recorded — status already terminal")
                }
                Err(e) => {
                    error!(certificate_id = %certificate_id, err = %e, "could not record generation failure")
                }
            }
        }
    }
}

async fn generate_inner(ctx: &AppContext, cert: &CertificateRow) -> anyhow::Result<String> {
    let bytes = render_certificate(cert);
    let path = format!("certificates/{}.svg", cert.id);
    ctx.blobs
        .put(&path, &bytes)
        .await
        .context("storing certificate artifact")?;
    let url = ctx.blobs.read_reference(&path);

    let transitioned = ctx
        .storage
        .mark_certificate_generated(&cert.id, &url)
        .await?;
    anyhow::ensure!(transitioned, "certificate no longer pending");
    Ok(url)
}

/// Copy the generated certificate into the owner's certificates collection
/// so exports and profile views see it. The status is already terminal, so
/// a failure here only warns.
async fn mirror_to_user(ctx: &AppContext, cert: &CertificateRow, pdf_url: &str) {
    let doc = serde_json::json!({
        "certificateId": cert.id,
        "courseId": cert.course_id,
        "courseName": cert.course_name,
        "completionDate": cert.completion_date,
        "pdfUrl": pdf_url,
    });
    if let Err(e) = ctx
        .storage
        .put_user_document(&cert.student_id, "certificates", &cert.id, &doc)
        .await
    {
        warn!(certificate_id = %cert.id, user_id = %cert.student_id, err = %e, "certificate mirror write failed");
    }
}
