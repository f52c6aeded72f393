#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultlockd");
    let mut child = Command::new(exe)
        .env_remove("RESULTLOCKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultlockd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

/// Two students, two subjects in JSS 1 / First Term; only Obi has a Mathematics grade.
pub fn seed_school(workspace: &Path) {
    let conn = rusqlite::Connection::open(workspace.join("resultlockd.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO class_levels(id, school_id, name) VALUES
           ('c1', 'sch1', 'JSS 1'),
           ('c2', 'sch1', 'JSS 2'),
           ('cx', 'sch2', 'Year 7');
         INSERT INTO academic_terms(id, school_id, academic_year, ordinal, name, is_current) VALUES
           ('t1', 'sch1', '2025/2026', 1, 'First Term', 1),
           ('tx', 'sch2', '2025/2026', 1, 'Autumn', 1);
         INSERT INTO students(id, first_name, last_name) VALUES
           ('s1', 'Chidi', 'Obi'),
           ('s2', 'Bola', 'Ade'),
           ('s3', 'Kemi', 'Eze');
         INSERT INTO teachers(id, first_name, last_name) VALUES ('tr1', 'Funmi', 'Lawal');
         INSERT INTO subject_assignments(class_level_id, academic_term_id, subject_id, subject_name, teacher_id) VALUES
           ('c1', 't1', 'math', 'Mathematics', 'tr1'),
           ('c1', 't1', 'eng', 'English', NULL);
         INSERT INTO enrollments(student_id, academic_term_id, class_level_id) VALUES
           ('s1', 't1', 'c1'),
           ('s2', 't1', 'c1');
         INSERT INTO student_grades(id, student_id, subject_id, class_level_id, academic_term_id, score) VALUES
           ('g1', 's1', 'math', 'c1', 't1', 71.5);",
    )
    .expect("seed school");
}

pub fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&workspace);
    workspace
}

pub fn teacher() -> serde_json::Value {
    json!({ "role": "teacher", "id": "tr1" })
}

pub fn admin() -> serde_json::Value {
    json!({ "role": "schoolAdmin", "id": "adm1" })
}
