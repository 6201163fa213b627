// validate/mod.rs — Per-operation payload validation.
//
// Validators take the raw JSON body and aggregate *all* violations into one
// `ApiError::Validation` so the caller can fix every field in a single round
// trip. They return typed, sanitized payloads — nothing downstream touches
// the raw body again.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::{ApiError, FieldErrors};

pub const VALID_GRADE_LEVELS: [&str; 6] = ["7", "8", "9", "10", "11", "12"];
pub const VALID_TRACKS: [&str; 4] = [
    "STEM",
    "Humanities",
    "Creative Arts",
    "Sustainable Development",
];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

// ─── Course generation ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ValidCourseRequest {
    pub course_topic: String,
    pub grade_level: String,
    pub track: String,
    /// Duration in weeks, 1..=52.
    pub duration: Option<u32>,
    pub language: Option<String>,
}

pub fn validate_course_request(data: &Value) -> Result<ValidCourseRequest, ApiError> {
    let mut errors = FieldErrors::new();

    let course_topic = match str_field(data, "courseTopic") {
        None => {
            errors.insert(
                "courseTopic".into(),
                "Course topic is required and must be a string".into(),
            );
            String::new()
        }
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.len() < 5 {
                errors.insert(
                    "courseTopic".into(),
                    "Course topic must be at least 5 characters long".into(),
                );
            } else if trimmed.len() > 200 {
                errors.insert(
                    "courseTopic".into(),
                    "Course topic must not exceed 200 characters".into(),
                );
            }
            trimmed.to_string()
        }
    };

    // Grade level may arrive as a string or a number.
    let grade_level = match data.get("gradeLevel") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if !VALID_GRADE_LEVELS.contains(&grade_level.as_str()) {
        errors.insert(
            "gradeLevel".into(),
            format!("Grade level must be one of: {}", VALID_GRADE_LEVELS.join(", ")),
        );
    }

    let track = str_field(data, "track").unwrap_or_default().to_string();
    if !VALID_TRACKS.contains(&track.as_str()) {
        errors.insert(
            "track".into(),
            format!("Track must be one of: {}", VALID_TRACKS.join(", ")),
        );
    }

    let duration = match data.get("duration") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(d @ 1..=52) => Some(d as u32),
            _ => {
                errors.insert(
                    "duration".into(),
                    "Duration must be between 1 and 52 weeks".into(),
                );
                None
            }
        },
    };

    let language = match data.get("language") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.insert("language".into(), "Language must be a string".into());
            None
        }
    };

    if !errors.is_empty() {
        return Err(ApiError::Validation { details: errors });
    }

    Ok(ValidCourseRequest {
        course_topic,
        grade_level,
        track,
        duration,
        language,
    })
}

// ─── Payments ────────────────────────────────────────────────────────────────

/// Checkout itself is delegated to the payment processor; this validates the
/// shape shared by every payment-adjacent request.
#[derive(Debug, Clone)]
pub struct ValidPaymentRequest {
    pub course_id: String,
    pub user_id: String,
    pub amount: Option<f64>,
}

pub fn validate_payment_request(data: &Value) -> Result<ValidPaymentRequest, ApiError> {
    let mut errors = FieldErrors::new();

    let course_id = str_field(data, "courseId").unwrap_or_default().to_string();
    if course_id.is_empty() {
        errors.insert("courseId".into(), "Course ID is required".into());
    }

    let user_id = str_field(data, "userId").unwrap_or_default().to_string();
    if user_id.is_empty() {
        errors.insert("userId".into(), "User ID is required".into());
    }

    let amount = match data.get("amount") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_f64() {
            Some(a) if a >= 0.0 => Some(a),
            _ => {
                errors.insert("amount".into(), "Amount must be a positive number".into());
                None
            }
        },
    };

    if !errors.is_empty() {
        return Err(ApiError::Validation { details: errors });
    }

    Ok(ValidPaymentRequest {
        course_id,
        user_id,
        amount,
    })
}

// ─── Data lifecycle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    ExportData,
    DeleteAccount,
    AnonymizeData,
}

impl LifecycleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::ExportData => "export-data",
            LifecycleAction::DeleteAccount => "delete-account",
            LifecycleAction::AnonymizeData => "anonymize-data",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidLifecycleRequest {
    pub action: LifecycleAction,
    pub user_id: String,
}

pub fn validate_lifecycle_request(data: &Value) -> Result<ValidLifecycleRequest, ApiError> {
    let mut errors = FieldErrors::new();

    let action = match str_field(data, "action") {
        Some("export-data") => Some(LifecycleAction::ExportData),
        Some("delete-account") => Some(LifecycleAction::DeleteAccount),
        Some("anonymize-data") => Some(LifecycleAction::AnonymizeData),
        _ => {
            errors.insert(
                "action".into(),
                "Action must be one of: export-data, delete-account, anonymize-data".into(),
            );
            None
        }
    };

    let user_id = str_field(data, "userId").unwrap_or_default().to_string();
    if user_id.is_empty() {
        errors.insert("userId".into(), "User ID is required".into());
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation { details: errors });
    }

    Ok(ValidLifecycleRequest {
        // The match above recorded an error for None, so this is unreachable
        // when errors is empty.
        action: action.unwrap(),
        user_id,
    })
}

// ─── Certificates ────────────────────────────────────────────────────────────

pub fn validate_certificate_request(data: &Value) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();

    let course_id = str_field(data, "courseId").unwrap_or_default().to_string();
    if course_id.is_empty() {
        errors.insert("courseId".into(), "Course ID is required".into());
    } else if course_id.len() > 128 {
        errors.insert("courseId".into(), "Course ID must not exceed 128 characters".into());
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation { details: errors });
    }
    Ok(course_id)
}
