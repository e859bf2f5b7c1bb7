use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::get_optional_str;
use crate::ipc::types::{AppState, Request};
use crate::session;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "sessionLoading": state.session.current().loading,
        }),
    )
}

/// Opens (or creates) the store under `path` and finishes the initial
/// session check, optionally restoring a persisted token.
pub fn select_workspace(
    state: &mut AppState,
    path: &Path,
    session_token: Option<&str>,
) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    state.session.init(&conn, session_token);
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    tracing::info!(workspace = %path.display(), "workspace opened");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = get_optional_str(&req.params, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let token = get_optional_str(&req.params, "sessionToken");

    match select_workspace(state, &path, token.as_deref()) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "session": state.session.current(),
            }),
        ),
        Err(e) => {
            tracing::error!(workspace = %path.display(), error = ?e, "failed to open workspace");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_bootstrap_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(email), Some(password)) = (
        get_optional_str(&req.params, "email"),
        req.params.get("password").and_then(|v| v.as_str()),
    ) else {
        return err(&req.id, "bad_params", "missing email or password", None);
    };
    let full_name =
        get_optional_str(&req.params, "fullName").unwrap_or_else(|| "Administrator".to_string());

    match session::bootstrap_admin(conn, &email, password, &full_name) {
        Ok(identity) => ok(&req.id, json!({ "identity": identity })),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "setup.bootstrapAdmin" => Some(handle_bootstrap_admin(state, req)),
        _ => None,
    }
}
