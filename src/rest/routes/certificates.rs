// rest/routes/certificates.rs — Certificate issuance (authenticated) and
// public verification.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::authenticate;
use crate::certificates;
use crate::errors::ApiError;
use crate::validate::validate_certificate_request;
use crate::AppContext;

pub async fn request_certificate(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let run = async {
        let principal = authenticate(&headers, &ctx.config.jwt_secret)?;
        let course_id = validate_certificate_request(&body)?;
        let certificate_id =
            certificates::request_certificate(&ctx, &principal, &course_id).await?;
        Ok::<_, ApiError>((
            StatusCode::ACCEPTED,
            Json(json!({
                "certificateId": certificate_id,
                "status": "pending",
            })),
        ))
    };
    run.await.map_err(|e| e.response(ctx.config.dev_mode))
}

/// Public endpoint: anyone holding a certificate id may check it.
pub async fn verify_certificate(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match certificates::verify_certificate(&ctx, &id).await {
        Ok(verification) => Ok(Json(json!(verification))),
        Err(e) => Err(e.response(ctx.config.dev_mode)),
    }
}
