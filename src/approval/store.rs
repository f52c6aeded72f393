use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::error::ApprovalError;
use super::model::{Actor, ApprovalAction, ApprovalEvent, ApprovalKey, ApprovalRecord};

/// Flags to overwrite; `None` leaves the stored value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApprovalPatch {
    pub teacher_approved: Option<bool>,
    pub school_admin_approved: Option<bool>,
}

impl ApprovalPatch {
    pub fn teacher(v: bool) -> Self {
        Self {
            teacher_approved: Some(v),
            school_admin_approved: None,
        }
    }

    pub fn school_admin(v: bool) -> Self {
        Self {
            teacher_approved: None,
            school_admin_approved: Some(v),
        }
    }
}

/// Who changed the record, and when.
#[derive(Debug, Clone, Copy)]
pub struct AuditStamp<'a> {
    pub actor: &'a Actor,
    pub action: ApprovalAction,
    pub forced: bool,
    pub at: &'a str,
}

pub trait ApprovalStateStore {
    /// Never fails on absence: a key without a row is Open.
    fn get(&self, key: &ApprovalKey) -> Result<ApprovalRecord, ApprovalError>;

    fn upsert(
        &self,
        key: &ApprovalKey,
        patch: ApprovalPatch,
        stamp: AuditStamp<'_>,
    ) -> Result<ApprovalRecord, ApprovalError>;

    /// Audit events for the key, oldest first.
    fn history(&self, key: &ApprovalKey) -> Result<Vec<ApprovalEvent>, ApprovalError>;
}

pub struct SqliteApprovalStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteApprovalStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn write_record_and_event(
        &self,
        key: &ApprovalKey,
        patch: ApprovalPatch,
        stamp: AuditStamp<'_>,
    ) -> Result<ApprovalRecord, ApprovalError> {
        // Single statement read-modify-write: fields not in the patch keep their stored value,
        // so a teacher write and an admin write on the same key never clobber each other.
        let record = self.conn.query_row(
            "INSERT INTO result_approvals(
               class_level_id, academic_term_id, teacher_approved, school_admin_approved,
               approved_at, approved_by, updated_at)
             VALUES(?1, ?2, COALESCE(?3, 0), COALESCE(?4, 0), ?5, ?6, ?5)
             ON CONFLICT(class_level_id, academic_term_id) DO UPDATE SET
               teacher_approved = COALESCE(?3, teacher_approved),
               school_admin_approved = COALESCE(?4, school_admin_approved),
               approved_at = excluded.approved_at,
               approved_by = excluded.approved_by,
               updated_at = excluded.updated_at
             RETURNING class_level_id, academic_term_id, teacher_approved,
               school_admin_approved, approved_at, approved_by, updated_at",
            (
                &key.class_level_id,
                &key.academic_term_id,
                patch.teacher_approved,
                patch.school_admin_approved,
                stamp.at,
                &stamp.actor.id,
            ),
            record_from_row,
        )?;

        let event_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO result_approval_events(
               id, seq, class_level_id, academic_term_id, actor_role, actor_id, action,
               forced, teacher_approved, school_admin_approved, occurred_at)
             VALUES(?1,
               (SELECT COALESCE(MAX(seq), 0) + 1 FROM result_approval_events
                WHERE class_level_id = ?2 AND academic_term_id = ?3),
               ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            (
                &event_id,
                &key.class_level_id,
                &key.academic_term_id,
                stamp.actor.role.as_str(),
                &stamp.actor.id,
                stamp.action.as_str(),
                stamp.forced,
                record.teacher_approved,
                record.school_admin_approved,
                stamp.at,
            ),
        )?;

        Ok(record)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ApprovalRecord> {
    Ok(ApprovalRecord {
        class_level_id: row.get(0)?,
        academic_term_id: row.get(1)?,
        teacher_approved: row.get::<_, i64>(2)? != 0,
        school_admin_approved: row.get::<_, i64>(3)? != 0,
        approved_at: row.get(4)?,
        approved_by: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl ApprovalStateStore for SqliteApprovalStore<'_> {
    fn get(&self, key: &ApprovalKey) -> Result<ApprovalRecord, ApprovalError> {
        let stored = self
            .conn
            .query_row(
                "SELECT class_level_id, academic_term_id, teacher_approved,
                   school_admin_approved, approved_at, approved_by, updated_at
                 FROM result_approvals
                 WHERE class_level_id = ? AND academic_term_id = ?",
                (&key.class_level_id, &key.academic_term_id),
                record_from_row,
            )
            .optional()?;
        Ok(stored.unwrap_or_else(|| ApprovalRecord::open(key)))
    }

    fn upsert(
        &self,
        key: &ApprovalKey,
        patch: ApprovalPatch,
        stamp: AuditStamp<'_>,
    ) -> Result<ApprovalRecord, ApprovalError> {
        // The record and its audit event always land together. Outside a caller's transaction
        // take the write lock up front so concurrent writers queue on the busy timeout.
        let own_tx = self.conn.is_autocommit();
        let (begin, commit, rollback) = if own_tx {
            ("BEGIN IMMEDIATE", "COMMIT", "ROLLBACK")
        } else {
            (
                "SAVEPOINT approval_upsert",
                "RELEASE approval_upsert",
                "ROLLBACK TO approval_upsert; RELEASE approval_upsert",
            )
        };
        self.conn.execute_batch(begin)?;
        match self.write_record_and_event(key, patch, stamp) {
            Ok(record) => {
                self.conn.execute_batch(commit)?;
                Ok(record)
            }
            Err(e) => {
                let _ = self.conn.execute_batch(rollback);
                Err(e)
            }
        }
    }

    fn history(&self, key: &ApprovalKey) -> Result<Vec<ApprovalEvent>, ApprovalError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_role, actor_id, action, forced, teacher_approved,
               school_admin_approved, occurred_at
             FROM result_approval_events
             WHERE class_level_id = ? AND academic_term_id = ?
             ORDER BY seq",
        )?;
        let rows = stmt
            .query_map((&key.class_level_id, &key.academic_term_id), |r| {
                Ok(ApprovalEvent {
                    id: r.get(0)?,
                    actor_role: r.get(1)?,
                    actor_id: r.get(2)?,
                    action: r.get(3)?,
                    forced: r.get::<_, i64>(4)? != 0,
                    teacher_approved: r.get::<_, i64>(5)? != 0,
                    school_admin_approved: r.get::<_, i64>(6)? != 0,
                    occurred_at: r.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
