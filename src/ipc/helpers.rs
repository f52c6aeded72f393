use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::approval::{ApprovalError, ApprovalKey, LockKey};

/// Trimmed, non-empty string parameter.
pub fn str_param(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn require_str(params: &Value, key: &str) -> Result<String, ApprovalError> {
    str_param(params, key).ok_or_else(|| ApprovalError::Validation(format!("missing {key}")))
}

/// Absent or null reads as false.
pub fn bool_param(params: &Value, key: &str) -> Result<bool, ApprovalError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| ApprovalError::Validation(format!("{key} must be boolean"))),
    }
}

/// Picks the guard input from request params.
///
/// `classLevelId` + `academicTermId` wins when both are present; otherwise
/// `studentId` + `termId` is used. Anything else is rejected before any lookup.
pub fn lock_key_from_params(params: &Value) -> Result<LockKey, ApprovalError> {
    if let (Some(class_level_id), Some(academic_term_id)) = (
        str_param(params, "classLevelId"),
        str_param(params, "academicTermId"),
    ) {
        return Ok(LockKey::ClassTerm(ApprovalKey::new(
            class_level_id,
            academic_term_id,
        )));
    }
    if let (Some(student_id), Some(term_id)) =
        (str_param(params, "studentId"), str_param(params, "termId"))
    {
        return Ok(LockKey::StudentTerm {
            student_id,
            term_id,
        });
    }
    Err(ApprovalError::Validation(
        "expected classLevelId and academicTermId, or studentId and termId".to_string(),
    ))
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
