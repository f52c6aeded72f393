mod common;

use common::{open_workspace, request, spawn_sidecar, teacher};
use serde_json::json;
use std::io::{BufRead, Write};

#[test]
fn methods_need_a_workspace_first() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health.pointer("/result/workspacePath").map_or(false, |v| v.is_null()));

    let status = request(
        &mut stdin,
        &mut reader,
        "2",
        "approval.status",
        json!({ "classLevelId": "c1", "academicTermId": "t1" }),
    );
    assert_eq!(status.pointer("/error/code"), Some(&json!("no_workspace")));

    let unknown = request(&mut stdin, &mut reader, "3", "grades.publish", json!({}));
    assert_eq!(unknown.pointer("/error/code"), Some(&json!("not_implemented")));
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value["ok"], false);
    assert_eq!(value.pointer("/error/code"), Some(&json!("bad_json")));

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "resultlockd-router-smoke");

    let key = json!({ "classLevelId": "c1", "academicTermId": "t1" });
    let calls = [
        ("setup.get", json!({})),
        (
            "setup.update",
            json!({ "section": "approval", "patch": { "scanMaxCells": 100 } }),
        ),
        ("approval.status", key.clone()),
        ("approval.missingGrades", key.clone()),
        (
            "approval.request",
            json!({
                "classLevelId": "c1",
                "academicTermId": "t1",
                "actor": teacher(),
                "action": "approve",
                "forceApprove": true
            }),
        ),
        ("approval.history", key.clone()),
        ("guard.check", key.clone()),
        (
            "grades.set",
            json!({ "studentId": "s3", "termId": "t1", "subjectId": "eng", "score": 1 }),
        ),
        (
            "grades.delete",
            json!({ "studentId": "s3", "termId": "t1", "subjectId": "eng" }),
        ),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("m{}", i), method, params);
        let code = value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
    }
}
