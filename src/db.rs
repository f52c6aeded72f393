use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "resultlockd.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    // Concurrent writers on the same workspace wait for the write lock instead of failing.
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Collaborator tables. Rows are written by the surrounding school system;
    // this crate only reads them, apart from student_grades.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_levels(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_terms(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            name TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_academic_terms_school ON academic_terms(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_assignments(
            class_level_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            teacher_id TEXT,
            PRIMARY KEY(class_level_id, academic_term_id, subject_id),
            FOREIGN KEY(class_level_id) REFERENCES class_levels(id),
            FOREIGN KEY(academic_term_id) REFERENCES academic_terms(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            student_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            class_level_id TEXT NOT NULL,
            PRIMARY KEY(student_id, academic_term_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(academic_term_id) REFERENCES academic_terms(id),
            FOREIGN KEY(class_level_id) REFERENCES class_levels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class_term ON enrollments(class_level_id, academic_term_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_level_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_level_id) REFERENCES class_levels(id),
            FOREIGN KEY(academic_term_id) REFERENCES academic_terms(id),
            UNIQUE(student_id, subject_id, academic_term_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_grades_class_term ON student_grades(class_level_id, academic_term_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_approvals(
            class_level_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            teacher_approved INTEGER NOT NULL DEFAULT 0,
            school_admin_approved INTEGER NOT NULL DEFAULT 0,
            approved_at TEXT,
            approved_by TEXT,
            updated_at TEXT,
            PRIMARY KEY(class_level_id, academic_term_id),
            FOREIGN KEY(class_level_id) REFERENCES class_levels(id),
            FOREIGN KEY(academic_term_id) REFERENCES academic_terms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_approval_events(
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            class_level_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            actor_role TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            action TEXT NOT NULL,
            forced INTEGER NOT NULL DEFAULT 0,
            teacher_approved INTEGER NOT NULL,
            school_admin_approved INTEGER NOT NULL,
            occurred_at TEXT NOT NULL,
            FOREIGN KEY(class_level_id, academic_term_id)
              REFERENCES result_approvals(class_level_id, academic_term_id),
            UNIQUE(class_level_id, academic_term_id, seq)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, &text),
    )?;
    Ok(())
}
