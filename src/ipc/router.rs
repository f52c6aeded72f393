use std::time::Instant;

use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::approval::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::guard::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let started = Instant::now();
    let resp = dispatch(state, &req);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let succeeded = resp.get("ok").and_then(|v| v.as_bool()) == Some(true);
    if succeeded {
        tracing::debug!(id = %req.id, method = %req.method, elapsed_ms, "request handled");
    } else {
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::info!(id = %req.id, method = %req.method, code, elapsed_ms, "request failed");
    }
    resp
}
