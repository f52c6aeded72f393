use serde_json::json;

use crate::approval::guard::{check, GuardDecision};
use crate::approval::model::LockTier;
use crate::approval::repository::SqliteGradeRepository;
use crate::approval::store::SqliteApprovalStore;
use crate::ipc::error::{approval_err, err, ok};
use crate::ipc::helpers::lock_key_from_params;
use crate::ipc::types::{AppState, Request};

/// Lets the grading subsystem ask before it writes.
fn handle_guard_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lock_key = match lock_key_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return approval_err(&req.id, &e),
    };

    let decision = check(
        &SqliteGradeRepository::new(conn),
        &SqliteApprovalStore::new(conn),
        &lock_key,
    );
    match decision {
        Ok(GuardDecision::Allow(key)) => ok(
            &req.id,
            json!({
                "allowed": true,
                "classLevelId": key.class_level_id,
                "academicTermId": key.academic_term_id,
            }),
        ),
        Ok(GuardDecision::Reject { key, reason }) => ok(
            &req.id,
            json!({
                "allowed": false,
                "classLevelId": key.as_ref().map(|k| k.class_level_id.as_str()),
                "academicTermId": key.as_ref().map(|k| k.academic_term_id.as_str()),
                "lockTier": reason.lock_tier().map(LockTier::as_str),
                "message": reason.message(),
            }),
        ),
        Err(e) => approval_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "guard.check" => Some(handle_guard_check(state, req)),
        _ => None,
    }
}
