use super::handlers;
use super::types::{AppState, Request};
use crate::guard::{self, Access};
use crate::ipc::error::err;
use crate::model::Role;
use serde_json::json;

/// Role that owns a method namespace (`admin.*`, `teacher.*`, ...).
fn gated_role(method: &str) -> Option<Role> {
    let (ns, _) = method.split_once('.')?;
    Role::parse(ns)
}

fn denied(id: &str, access: Access) -> serde_json::Value {
    match access {
        Access::Placeholder => err(id, "session_loading", "session check not finished", None),
        Access::RedirectLogin => err(
            id,
            "unauthenticated",
            "sign in first",
            Some(json!({ "redirect": "/login" })),
        ),
        _ => err(
            id,
            "unauthorized",
            "You don't have permission to access this page.",
            access.redirect().map(|r| json!({ "redirect": r })),
        ),
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(request = %req.id, method = %req.method, "dispatch");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::shell::try_handle(state, &req) {
        return resp;
    }

    if let Some(role) = gated_role(&req.method) {
        let access = guard::check(&[role], state.session.current());
        if access != Access::Render {
            return denied(&req.id, access);
        }
    }

    if let Some(resp) = handlers::admin::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teacher::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::student::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::parent::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
