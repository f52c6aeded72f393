use crate::approval::scanner::{ScanLimits, DEFAULT_SCAN_MAX_CELLS};
use crate::approval::workflow::WorkflowSettings;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

const SCAN_MAX_CELLS_CEILING: i64 = 1_000_000;

#[derive(Clone, Copy)]
enum SetupSection {
    Approval,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "approval" => Some(Self::Approval),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Approval => "setup.approval",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Approval => json!({
            "scanMaxCells": DEFAULT_SCAN_MAX_CELLS,
            "allowForceApprove": true,
            "attachReportOnAdminApprove": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Approval => match k.as_str() {
                "scanMaxCells" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, SCAN_MAX_CELLS_CEILING)?),
                    );
                }
                "allowForceApprove" | "attachReportOnAdminApprove" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown approval field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed stored value must not lock anyone out.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), error = %e, "ignoring stored setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Workflow knobs for the open workspace.
pub fn workflow_settings(conn: &rusqlite::Connection) -> anyhow::Result<WorkflowSettings> {
    let section = load_section(conn, SetupSection::Approval)?;
    let defaults = WorkflowSettings::default();
    let max_cells = section
        .get("scanMaxCells")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(defaults.scan.max_cells);
    Ok(WorkflowSettings {
        scan: ScanLimits { max_cells },
        allow_force_approve: section
            .get("allowForceApprove")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.allow_force_approve),
        attach_report_on_admin_approve: section
            .get("attachReportOnAdminApprove")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.attach_report_on_admin_approve),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let approval = match load_section(conn, SetupSection::Approval) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "approval": approval }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
