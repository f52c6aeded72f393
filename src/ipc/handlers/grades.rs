use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;

use crate::approval::guard::can_mutate;
use crate::approval::model::StudentGrade;
use crate::approval::repository::{GradeRepository, SqliteGradeRepository};
use crate::approval::store::SqliteApprovalStore;
use crate::approval::{ApprovalError, ApprovalKey, LockKey};
use crate::ipc::error::{approval_err, err, ok};
use crate::ipc::helpers::{lock_key_from_params, now_timestamp, require_str};
use crate::ipc::types::{AppState, Request};

fn ensure_gradable(
    repo: &SqliteGradeRepository<'_>,
    key: &ApprovalKey,
    student_id: &str,
    subject_id: &str,
) -> Result<(), ApprovalError> {
    let enrolled = repo.find_enrollment(student_id, &key.academic_term_id)?;
    if enrolled.as_deref() != Some(key.class_level_id.as_str()) {
        return Err(ApprovalError::not_found("enrollment", student_id));
    }
    if !repo.is_subject_assigned(key, subject_id)? {
        return Err(ApprovalError::not_found("subject assignment", subject_id));
    }
    Ok(())
}

/// A grade already recorded under another class level stays governed by that class
/// level's lock, and is only ever rewritten through it.
fn ensure_owned_by_key(
    repo: &SqliteGradeRepository<'_>,
    store: &SqliteApprovalStore<'_>,
    key: &ApprovalKey,
    student_id: &str,
    subject_id: &str,
) -> Result<(), ApprovalError> {
    let Some(existing) = repo.find_grade(student_id, subject_id, &key.academic_term_id)? else {
        return Ok(());
    };
    if existing.class_level_id == key.class_level_id {
        return Ok(());
    }
    let owner = ApprovalKey::new(existing.class_level_id, existing.academic_term_id);
    can_mutate(repo, store, &LockKey::ClassTerm(owner.clone()))?;
    Err(ApprovalError::Conflict(format!(
        "grade is recorded under class level {}; change it there",
        owner.class_level_id
    )))
}

fn set_grade(conn: &mut Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApprovalError> {
    let lock_key = lock_key_from_params(params)?;
    let student_id = require_str(params, "studentId")?;
    let subject_id = require_str(params, "subjectId")?;
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ApprovalError::Validation("score must be a number".to_string()))?;
    if !score.is_finite() || score < 0.0 {
        return Err(ApprovalError::Validation("score must be >= 0".to_string()));
    }

    // Guard and write share the write lock, so an approval cannot commit in between.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (key, created) = {
        let repo = SqliteGradeRepository::new(&tx);
        let store = SqliteApprovalStore::new(&tx);
        let key = can_mutate(&repo, &store, &lock_key)?;
        ensure_gradable(&repo, &key, &student_id, &subject_id)?;
        ensure_owned_by_key(&repo, &store, &key, &student_id, &subject_id)?;
        let grade = StudentGrade {
            student_id: student_id.clone(),
            subject_id: subject_id.clone(),
            class_level_id: key.class_level_id.clone(),
            academic_term_id: key.academic_term_id.clone(),
            score,
        };
        let created = repo.upsert_grade(&grade, &now_timestamp())?;
        (key, created)
    };
    tx.commit()?;

    Ok(json!({
        "classLevelId": key.class_level_id,
        "academicTermId": key.academic_term_id,
        "studentId": student_id,
        "subjectId": subject_id,
        "created": created,
    }))
}

fn delete_grade(conn: &mut Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApprovalError> {
    let lock_key = lock_key_from_params(params)?;
    let student_id = require_str(params, "studentId")?;
    let subject_id = require_str(params, "subjectId")?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deleted = {
        let repo = SqliteGradeRepository::new(&tx);
        let key = can_mutate(&repo, &SqliteApprovalStore::new(&tx), &lock_key)?;
        repo.delete_grade(&key, &student_id, &subject_id)?
    };
    tx.commit()?;

    Ok(json!({ "deleted": deleted }))
}

fn handle_grades_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match set_grade(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => approval_err(&req.id, &e),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match delete_grade(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => approval_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.set" => Some(handle_grades_set(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        _ => None,
    }
}
