use rusqlite::{Connection, TransactionBehavior};

use super::error::{ApprovalError, ForbiddenReason};
use super::model::{
    Actor, ActorRole, ApprovalAction, ApprovalKey, ApprovalRecord, ApprovalState,
    MissingGradesReport,
};
use super::repository::{resolve_key, GradeRepository, SqliteGradeRepository};
use super::scanner::{scan, ScanLimits};
use super::store::{ApprovalPatch, ApprovalStateStore, AuditStamp, SqliteApprovalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub scan: ScanLimits,
    pub allow_force_approve: bool,
    pub attach_report_on_admin_approve: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            scan: ScanLimits::default(),
            allow_force_approve: true,
            attach_report_on_admin_approve: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub actor: Actor,
    pub key: ApprovalKey,
    pub action: ApprovalAction,
    pub force_approve: bool,
    /// Administrator unapprove only: lift the admin tier but leave a teacher approval standing.
    pub keep_teacher_approval: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Updated {
        record: ApprovalRecord,
        /// Grades still missing at the time of the transition, for display.
        missing_grades: Option<MissingGradesReport>,
    },
    /// Teacher approve refused because grades are missing; nothing was written.
    MissingGrades(MissingGradesReport),
}

pub fn request_approval<R, S>(
    repo: &R,
    store: &S,
    settings: &WorkflowSettings,
    req: &ApprovalRequest,
    now: &str,
) -> Result<ApprovalOutcome, ApprovalError>
where
    R: GradeRepository + ?Sized,
    S: ApprovalStateStore + ?Sized,
{
    resolve_key(repo, &req.key)?;
    let current = store.get(&req.key)?;

    let outcome = match req.actor.role {
        ActorRole::Teacher => teacher_transition(repo, store, settings, req, &current, now)?,
        ActorRole::SchoolAdmin => admin_transition(repo, store, settings, req, now)?,
    };

    match &outcome {
        ApprovalOutcome::Updated { record, .. } => tracing::info!(
            class_level_id = %req.key.class_level_id,
            academic_term_id = %req.key.academic_term_id,
            actor_role = req.actor.role.as_str(),
            actor_id = %req.actor.id,
            action = req.action.as_str(),
            from = current.state().as_str(),
            to = record.state().as_str(),
            "approval transition"
        ),
        ApprovalOutcome::MissingGrades(report) => tracing::info!(
            class_level_id = %req.key.class_level_id,
            academic_term_id = %req.key.academic_term_id,
            actor_id = %req.actor.id,
            missing = report.missing_count(),
            "approve blocked by missing grades"
        ),
    }
    Ok(outcome)
}

fn teacher_transition<R, S>(
    repo: &R,
    store: &S,
    settings: &WorkflowSettings,
    req: &ApprovalRequest,
    current: &ApprovalRecord,
    now: &str,
) -> Result<ApprovalOutcome, ApprovalError>
where
    R: GradeRepository + ?Sized,
    S: ApprovalStateStore + ?Sized,
{
    match (req.action, current.state()) {
        (ApprovalAction::Approve, ApprovalState::Open) => {
            let report = scan(repo, &req.key, settings.scan)?;
            let forced = !report.is_empty();
            if forced {
                if !req.force_approve {
                    return Ok(ApprovalOutcome::MissingGrades(report));
                }
                if !settings.allow_force_approve {
                    return Err(ApprovalError::Forbidden(
                        ForbiddenReason::ForceApproveDisabled,
                    ));
                }
            }
            let record = store.upsert(
                &req.key,
                ApprovalPatch::teacher(true),
                stamp(req, forced, now),
            )?;
            Ok(ApprovalOutcome::Updated {
                record,
                missing_grades: forced.then_some(report),
            })
        }
        (ApprovalAction::Approve, _) => Err(ApprovalError::Conflict(
            "results are already approved".to_string(),
        )),
        (ApprovalAction::Unapprove, ApprovalState::TeacherApproved) => {
            let record = store.upsert(
                &req.key,
                ApprovalPatch::teacher(false),
                stamp(req, false, now),
            )?;
            Ok(ApprovalOutcome::Updated {
                record,
                missing_grades: None,
            })
        }
        (ApprovalAction::Unapprove, ApprovalState::AdminApproved) => {
            Err(ApprovalError::Forbidden(ForbiddenReason::AdminLockHeld))
        }
        (ApprovalAction::Unapprove, ApprovalState::Open) => Err(ApprovalError::Conflict(
            "results are not approved".to_string(),
        )),
    }
}

fn admin_transition<R, S>(
    repo: &R,
    store: &S,
    settings: &WorkflowSettings,
    req: &ApprovalRequest,
    now: &str,
) -> Result<ApprovalOutcome, ApprovalError>
where
    R: GradeRepository + ?Sized,
    S: ApprovalStateStore + ?Sized,
{
    match req.action {
        ApprovalAction::Approve => {
            // Administrators may lock an incomplete class on purpose; the report is informational.
            let missing_grades = if settings.attach_report_on_admin_approve {
                match scan(repo, &req.key, settings.scan) {
                    Ok(report) => Some(report),
                    Err(ApprovalError::ResourceExceeded { cells, limit }) => {
                        tracing::warn!(cells, limit, "skipping missing-grade report on admin approve");
                        None
                    }
                    Err(e) => return Err(e),
                }
            } else {
                None
            };
            let record = store.upsert(
                &req.key,
                ApprovalPatch::school_admin(true),
                stamp(req, false, now),
            )?;
            Ok(ApprovalOutcome::Updated {
                record,
                missing_grades,
            })
        }
        ApprovalAction::Unapprove => {
            let patch = ApprovalPatch {
                teacher_approved: (!req.keep_teacher_approval).then_some(false),
                school_admin_approved: Some(false),
            };
            let record = store.upsert(&req.key, patch, stamp(req, false, now))?;
            Ok(ApprovalOutcome::Updated {
                record,
                missing_grades: None,
            })
        }
    }
}

fn stamp<'a>(req: &'a ApprovalRequest, forced: bool, now: &'a str) -> AuditStamp<'a> {
    AuditStamp {
        actor: &req.actor,
        action: req.action,
        forced,
        at: now,
    }
}

/// Runs the whole transition (state read, scan, write) under the database write lock,
/// so no grade write can land between the completeness check and the approval.
pub fn request_approval_locked(
    conn: &mut Connection,
    settings: &WorkflowSettings,
    req: &ApprovalRequest,
    now: &str,
) -> Result<ApprovalOutcome, ApprovalError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = {
        let repo = SqliteGradeRepository::new(&tx);
        let store = SqliteApprovalStore::new(&tx);
        request_approval(&repo, &store, settings, req, now)?
    };
    tx.commit()?;
    Ok(outcome)
}
