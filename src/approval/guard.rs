use super::error::{ApprovalError, ForbiddenReason};
use super::model::{ApprovalKey, LockKey, LockTier};
use super::repository::GradeRepository;
use super::store::ApprovalStateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow(ApprovalKey),
    Reject {
        /// Absent when the class level could not be resolved.
        key: Option<ApprovalKey>,
        reason: ForbiddenReason,
    },
}

/// Resolves the governing approval key and reports whether grades under it may change.
pub fn check<R, S>(repo: &R, store: &S, lock_key: &LockKey) -> Result<GuardDecision, ApprovalError>
where
    R: GradeRepository + ?Sized,
    S: ApprovalStateStore + ?Sized,
{
    let key = match lock_key {
        LockKey::ClassTerm(key) => key.clone(),
        LockKey::StudentTerm {
            student_id,
            term_id,
        } => match repo.find_enrollment(student_id, term_id)? {
            Some(class_level_id) => ApprovalKey::new(class_level_id, term_id.as_str()),
            None => {
                return Ok(GuardDecision::Reject {
                    key: None,
                    reason: ForbiddenReason::UnresolvedClassLevel,
                })
            }
        },
    };

    let record = store.get(&key)?;
    let decision = match record.lock_tier() {
        None => GuardDecision::Allow(key),
        Some(LockTier::SchoolAdmin) => GuardDecision::Reject {
            key: Some(key),
            reason: ForbiddenReason::AdminLocked,
        },
        Some(LockTier::Teacher) => GuardDecision::Reject {
            key: Some(key),
            reason: ForbiddenReason::TeacherLocked,
        },
    };
    Ok(decision)
}

/// Gate for grade-mutating calls. Errors, including storage failures, mean "do not write".
pub fn can_mutate<R, S>(repo: &R, store: &S, lock_key: &LockKey) -> Result<ApprovalKey, ApprovalError>
where
    R: GradeRepository + ?Sized,
    S: ApprovalStateStore + ?Sized,
{
    match check(repo, store, lock_key)? {
        GuardDecision::Allow(key) => Ok(key),
        GuardDecision::Reject { key, reason } => {
            tracing::warn!(
                class_level_id = key.as_ref().map(|k| k.class_level_id.as_str()),
                academic_term_id = key.as_ref().map(|k| k.academic_term_id.as_str()),
                reason = %reason,
                "grade mutation rejected"
            );
            Err(ApprovalError::Forbidden(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::model::{Actor, ActorRole, ApprovalAction};
    use crate::approval::scanner::tests::FakeRepo;
    use crate::approval::store::{ApprovalPatch, AuditStamp, SqliteApprovalStore};
    use crate::db;
    use rusqlite::Connection;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO class_levels(id, school_id, name) VALUES('c1', 'sch1', 'JSS 1');
             INSERT INTO academic_terms(id, school_id, academic_year, ordinal, name)
               VALUES('t1', 'sch1', '2025/2026', 1, 'First Term');",
        )
        .expect("seed");
        conn
    }

    fn set_flags(conn: &Connection, teacher: bool, admin: bool) {
        let actor = Actor {
            role: ActorRole::SchoolAdmin,
            id: "admin-1".into(),
        };
        let patch = ApprovalPatch {
            teacher_approved: Some(teacher),
            school_admin_approved: Some(admin),
        };
        SqliteApprovalStore::new(conn)
            .upsert(
                &ApprovalKey::new("c1", "t1"),
                patch,
                AuditStamp {
                    actor: &actor,
                    action: ApprovalAction::Approve,
                    forced: false,
                    at: "2026-01-01T00:00:00Z",
                },
            )
            .expect("upsert");
    }

    fn class_term() -> LockKey {
        LockKey::ClassTerm(ApprovalKey::new("c1", "t1"))
    }

    #[test]
    fn allows_only_when_both_flags_are_clear() {
        let conn = memory_db();
        let repo = FakeRepo::default();
        let store = SqliteApprovalStore::new(&conn);

        let cases = [
            (false, false, None),
            (true, false, Some(ForbiddenReason::TeacherLocked)),
            (false, true, Some(ForbiddenReason::AdminLocked)),
            (true, true, Some(ForbiddenReason::AdminLocked)),
        ];
        for (teacher, admin, expected) in cases {
            set_flags(&conn, teacher, admin);
            let decision = check(&repo, &store, &class_term()).expect("check");
            match expected {
                None => assert_eq!(
                    decision,
                    GuardDecision::Allow(ApprovalKey::new("c1", "t1"))
                ),
                Some(reason) => {
                    assert!(
                        matches!(decision, GuardDecision::Reject { reason: r, .. } if r == reason),
                        "teacher={teacher} admin={admin}: {decision:?}"
                    );
                    let err = can_mutate(&repo, &store, &class_term()).unwrap_err();
                    assert!(matches!(err, ApprovalError::Forbidden(r) if r == reason));
                }
            }
        }
    }

    #[test]
    fn unresolved_student_fails_closed() {
        let conn = memory_db();
        let repo = FakeRepo::default();
        let store = SqliteApprovalStore::new(&conn);
        let key = LockKey::StudentTerm {
            student_id: "ghost".into(),
            term_id: "t1".into(),
        };
        let decision = check(&repo, &store, &key).expect("check");
        assert_eq!(
            decision,
            GuardDecision::Reject {
                key: None,
                reason: ForbiddenReason::UnresolvedClassLevel
            }
        );
        assert!(can_mutate(&repo, &store, &key).is_err());
    }

    #[test]
    fn student_term_resolves_through_enrollment() {
        let conn = memory_db();
        let repo = FakeRepo {
            enrollments: vec![("S1".into(), "t1".into(), "c1".into())],
            ..Default::default()
        };
        let store = SqliteApprovalStore::new(&conn);
        let key = LockKey::StudentTerm {
            student_id: "S1".into(),
            term_id: "t1".into(),
        };
        assert_eq!(
            can_mutate(&repo, &store, &key).expect("open"),
            ApprovalKey::new("c1", "t1")
        );

        set_flags(&conn, true, false);
        assert!(matches!(
            can_mutate(&repo, &store, &key).unwrap_err(),
            ApprovalError::Forbidden(ForbiddenReason::TeacherLocked)
        ));
    }

    #[test]
    fn storage_failure_rejects() {
        let conn = Connection::open_in_memory().expect("open");
        // No schema: every read fails.
        let repo = FakeRepo::default();
        let store = SqliteApprovalStore::new(&conn);
        let err = can_mutate(&repo, &store, &class_term()).unwrap_err();
        assert!(matches!(err, ApprovalError::Storage(_)));
    }
}
