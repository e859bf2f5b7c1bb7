use crate::ipc::error::{err, ok};
use crate::ipc::helpers::get_optional_str;
use crate::ipc::types::{AppState, Request};
use crate::nav;
use serde_json::json;

fn handle_nav_items(state: &mut AppState, req: &Request) -> serde_json::Value {
    let items = nav::items(state.session.current().role());
    ok(&req.id, json!({ "items": items }))
}

fn handle_nav_shell(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!(nav::shell(state.session.current())))
}

fn handle_nav_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = get_optional_str(&req.params, "path") else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    ok(&req.id, json!(nav::resolve(&path, state.session.current())))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "nav.items" => Some(handle_nav_items(state, req)),
        "nav.shell" => Some(handle_nav_shell(state, req)),
        "nav.resolve" => Some(handle_nav_resolve(state, req)),
        _ => None,
    }
}
