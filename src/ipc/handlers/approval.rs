use rusqlite::Connection;
use serde_json::json;

use crate::approval::model::{Actor, ActorRole, ApprovalAction};
use crate::approval::repository::{key_for_class_level, resolve_key, SqliteGradeRepository};
use crate::approval::scanner::scan;
use crate::approval::store::{ApprovalStateStore, SqliteApprovalStore};
use crate::approval::workflow::{request_approval_locked, ApprovalOutcome, ApprovalRequest};
use crate::approval::{ApprovalError, ApprovalKey};
use crate::ipc::error::{approval_err, err, ok};
use crate::ipc::handlers::setup::workflow_settings;
use crate::ipc::helpers::{bool_param, now_timestamp, require_str, str_param};
use crate::ipc::types::{AppState, Request};

/// `classLevelId` plus an optional `academicTermId` (current term when omitted).
///
/// Only builds the key; callers resolve it where they read or write.
fn key_from_params(conn: &Connection, params: &serde_json::Value) -> Result<ApprovalKey, ApprovalError> {
    let class_level_id = require_str(params, "classLevelId")?;
    let term_id = str_param(params, "academicTermId");
    key_for_class_level(
        &SqliteGradeRepository::new(conn),
        &class_level_id,
        term_id.as_deref(),
    )
}

fn parse_actor(params: &serde_json::Value) -> Result<Actor, ApprovalError> {
    let Some(actor) = params.get("actor").filter(|v| v.is_object()) else {
        return Err(ApprovalError::Validation("missing actor".to_string()));
    };
    let role_raw = str_param(actor, "role")
        .ok_or_else(|| ApprovalError::Validation("missing actor.role".to_string()))?;
    let role = ActorRole::parse(&role_raw).ok_or_else(|| {
        ApprovalError::Validation("actor.role must be one of: teacher, schoolAdmin".to_string())
    })?;
    let id = str_param(actor, "id")
        .ok_or_else(|| ApprovalError::Validation("missing actor.id".to_string()))?;
    Ok(Actor { role, id })
}

fn parse_action(params: &serde_json::Value) -> Result<ApprovalAction, ApprovalError> {
    let raw = require_str(params, "action")?;
    ApprovalAction::parse(&raw).ok_or_else(|| {
        ApprovalError::Validation("action must be one of: approve, unapprove".to_string())
    })
}

struct RequestShape {
    actor: Actor,
    action: ApprovalAction,
    force_approve: bool,
    keep_teacher_approval: bool,
}

fn parse_request_shape(params: &serde_json::Value) -> Result<RequestShape, ApprovalError> {
    let actor = parse_actor(params)?;
    let action = parse_action(params)?;
    let force_approve = bool_param(params, "forceApprove")?;
    let keep_teacher_approval = bool_param(params, "keepTeacherApproval")?;
    require_str(params, "classLevelId")?;
    Ok(RequestShape {
        actor,
        action,
        force_approve,
        keep_teacher_approval,
    })
}

fn handle_approval_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = key_from_params(conn, &req.params).and_then(|key| {
        resolve_key(&SqliteGradeRepository::new(conn), &key)?;
        let record = SqliteApprovalStore::new(conn).get(&key)?;
        Ok(json!({
            "state": record.state().as_str(),
            "record": record,
        }))
    });
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => approval_err(&req.id, &e),
    }
}

fn handle_approval_missing_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let settings = match workflow_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let result = key_from_params(conn, &req.params).and_then(|key| {
        let report = scan(&SqliteGradeRepository::new(conn), &key, settings.scan)?;
        Ok(json!({
            "classLevelId": key.class_level_id,
            "academicTermId": key.academic_term_id,
            "complete": report.is_empty(),
            "missingGrades": report,
        }))
    });
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => approval_err(&req.id, &e),
    }
}

fn handle_approval_request(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Request shape is checked before touching any table.
    let shape = match parse_request_shape(&req.params) {
        Ok(v) => v,
        Err(e) => return approval_err(&req.id, &e),
    };

    let settings = match workflow_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let key = match key_from_params(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return approval_err(&req.id, &e),
    };

    let request = ApprovalRequest {
        actor: shape.actor,
        key,
        action: shape.action,
        force_approve: shape.force_approve,
        keep_teacher_approval: shape.keep_teacher_approval,
    };
    match request_approval_locked(conn, &settings, &request, &now_timestamp()) {
        Ok(ApprovalOutcome::Updated {
            record,
            missing_grades,
        }) => ok(
            &req.id,
            json!({
                "state": record.state().as_str(),
                "record": record,
                "missingGrades": missing_grades,
            }),
        ),
        Ok(ApprovalOutcome::MissingGrades(report)) => err(
            &req.id,
            "missing_grades",
            format!(
                "{} grade(s) missing; complete them or approve with forceApprove",
                report.missing_count()
            ),
            Some(json!({ "missingGrades": report })),
        ),
        Err(e) => approval_err(&req.id, &e),
    }
}

fn handle_approval_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = key_from_params(conn, &req.params).and_then(|key| {
        resolve_key(&SqliteGradeRepository::new(conn), &key)?;
        let events = SqliteApprovalStore::new(conn).history(&key)?;
        Ok(json!({
            "classLevelId": key.class_level_id,
            "academicTermId": key.academic_term_id,
            "events": events,
        }))
    });
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => approval_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "approval.status" => Some(handle_approval_status(state, req)),
        "approval.missingGrades" => Some(handle_approval_missing_grades(state, req)),
        "approval.request" => Some(handle_approval_request(state, req)),
        "approval.history" => Some(handle_approval_history(state, req)),
        _ => None,
    }
}
