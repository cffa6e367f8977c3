use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let resp = dispatch(state, &req);
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::warn!(id = %req.id, method = %req.method, code, "request failed");
    } else {
        tracing::debug!(id = %req.id, method = %req.method, "request ok");
    }
    resp
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::entities::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::enrollment::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
