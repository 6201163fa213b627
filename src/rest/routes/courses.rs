// rest/routes/courses.rs — AI-assisted course generation.
//
// Validates the request, calls the model provider, and persists the result
// as a draft course owned by the caller. Every successful generation also
// records an analytics event for the retention pipeline.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::ai::CourseGenerator;
use crate::auth::authenticate;
use crate::errors::ApiError;
use crate::store::CourseRow;
use crate::validate::validate_course_request;
use crate::AppContext;

pub async fn generate_course(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    handle_generate(&ctx, &headers, &body)
        .await
        .map_err(|e| e.response(ctx.config.dev_mode))
}

async fn handle_generate(
    ctx: &AppContext,
    headers: &HeaderMap,
    body: &Value,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = authenticate(headers, &ctx.config.jwt_secret)?;
    let request = validate_course_request(body)?;

    let generator = CourseGenerator::new(ctx.config.ai.clone())?;
    let generated = generator.generate(&request).await?;

    let now = Utc::now();
    let course_id = format!("course-{}", now.timestamp_millis());
    let metadata = json!({
        "gradeLevel": request.grade_level,
        "track": request.track,
        "duration": request.duration,
        "language": request.language,
        "model": ctx.config.ai.model,
        "tokensUsed": generated.tokens_used,
    });
    ctx.storage
        .put_course(&CourseRow {
            id: course_id.clone(),
            title: request.course_topic.clone(),
            price: 0.0,
            status: "draft".to_string(),
            content: Some(generated.content.clone()),
            created_by: Some(principal.user_id.clone()),
            created_at: now.to_rfc3339(),
            metadata: Some(metadata.to_string()),
        })
        .await?;

    // Analytics is advisory; a failed event write never fails the request.
    if let Err(e) = ctx
        .storage
        .insert_event(
            "course_generated",
            Some(&principal.user_id),
            now.timestamp(),
            Some(&json!({ "courseId": course_id, "track": request.track })),
        )
        .await
    {
        warn!(course_id = %course_id, err = %e, "analytics event write failed");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "courseId": course_id,
            "status": "draft",
            "content": generated.content,
            "tokensUsed": generated.tokens_used,
        })),
    ))
}
