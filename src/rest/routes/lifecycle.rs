// rest/routes/lifecycle.rs — GDPR data-lifecycle actions and the manual
// retention trigger. Both are gated on the dedicated service credential;
// end-user tokens never pass.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::auth::authorize_gdpr;
use crate::errors::ApiError;
use crate::validate::{validate_lifecycle_request, LifecycleAction};
use crate::AppContext;

pub async fn data_lifecycle(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    handle_lifecycle(&ctx, &headers, &body)
        .await
        .map_err(|e| e.response(ctx.config.dev_mode))
}

async fn handle_lifecycle(
    ctx: &AppContext,
    headers: &HeaderMap,
    body: &Value,
) -> Result<Json<Value>, ApiError> {
    authorize_gdpr(headers, &ctx.config.gdpr_api_key)?;
    let request = validate_lifecycle_request(body)?;
    info!(action = request.action.as_str(), user_id = %request.user_id, "data-lifecycle request");

    match request.action {
        LifecycleAction::ExportData => {
            let artifact = ctx.retention.export_user_data(&request.user_id).await?;
            Ok(Json(json!({
                "success": true,
                "action": request.action.as_str(),
                "userId": request.user_id,
                "export": artifact,
            })))
        }
        LifecycleAction::DeleteAccount => {
            ctx.retention.delete_user_data(&request.user_id).await?;
            Ok(Json(json!({
                "success": true,
                "action": request.action.as_str(),
                "userId": request.user_id,
                "message": "Account deleted successfully",
            })))
        }
        LifecycleAction::AnonymizeData => {
            let changed = ctx.retention.anonymize_user(&request.user_id).await?;
            Ok(Json(json!({
                "success": true,
                "action": request.action.as_str(),
                "userId": request.user_id,
                "alreadyAnonymized": !changed,
            })))
        }
    }
}

/// Manual trigger for the scheduled cleanup pass, using the current
/// (possibly hot-reloaded) retention periods.
pub async fn run_retention(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let run = async {
        authorize_gdpr(&headers, &ctx.config.gdpr_api_key)?;
        let periods = ctx.hot.read().await.retention.clone();
        let report = ctx
            .retention
            .run_scheduled_cleanup(&periods, Utc::now())
            .await?;
        Ok::<_, ApiError>(Json(json!({
            "success": true,
            "eventsDeleted": report.events_deleted,
            "usersAnonymized": report.users_anonymized,
            "usersFailed": report.users_failed,
        })))
    };
    run.await.map_err(|e| e.response(ctx.config.dev_mode))
}
