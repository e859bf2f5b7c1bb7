use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_date, get_optional_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Gender, Level, Role};
use crate::session::{Registration, RoleFields};
use serde_json::json;

fn required_field(
    params: &serde_json::Value,
    key: &str,
    label: &str,
) -> Result<String, HandlerErr> {
    get_optional_str(params, key)
        .ok_or_else(|| HandlerErr::new("validation", format!("{} is required", label)))
}

/// Builds the sign-up form. Only the chosen role's fields are read; anything
/// sent for another role is ignored.
fn parse_registration(params: &serde_json::Value) -> Result<Registration, HandlerErr> {
    let role_raw = get_optional_str(params, "role").unwrap_or_else(|| "student".to_string());
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::new("validation", format!("unknown role: {}", role_raw)))?;

    let fields = match role {
        Role::Student => {
            let date_of_birth = get_optional_date(params, "dateOfBirth")
                .map_err(|e| HandlerErr::new("validation", e.message))?
                .ok_or_else(|| HandlerErr::new("validation", "Date of birth is required"))?;
            let gender = required_field(params, "gender", "Gender")?;
            let gender = Gender::parse(&gender)
                .ok_or_else(|| HandlerErr::new("validation", "Gender must be male or female"))?;
            let level = get_optional_str(params, "level").unwrap_or_else(|| "Qaida".to_string());
            let level = Level::parse(&level)
                .ok_or_else(|| HandlerErr::new("validation", format!("unknown level: {}", level)))?;
            RoleFields::Student {
                date_of_birth,
                gender,
                level,
            }
        }
        Role::Teacher => {
            let qualification = required_field(params, "qualification", "Qualification")?;
            let specialization = params
                .get("specialization")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            RoleFields::Teacher {
                qualification,
                specialization,
            }
        }
        Role::Parent => RoleFields::Parent,
        Role::Admin => {
            return Err(HandlerErr::new(
                "validation",
                "admin accounts cannot be self-registered",
            ))
        }
    };

    let text = |key: &str| {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    Ok(Registration {
        full_name: text("fullName"),
        email: text("email"),
        phone: get_optional_str(params, "phone"),
        password: text("password"),
        confirm_password: text("confirmPassword"),
        fields,
    })
}

fn handle_sign_up(state: &mut AppState, req: &Request) -> serde_json::Value {
    let reg = match parse_registration(&req.params) {
        Ok(r) => r,
        Err(e) => return e.response(&req.id),
    };
    // Password rules are checked before the store is even required.
    if let Err(e) = reg.validate() {
        return err(&req.id, e.code(), e.to_string(), None);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match state.session.sign_up(conn, &reg) {
        Ok(signed) => ok(&req.id, json!(signed)),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let email = req.params.get("email").and_then(|v| v.as_str()).unwrap_or("");
    let password = req.params.get("password").and_then(|v| v.as_str()).unwrap_or("");
    match state.session.sign_in(conn, email, password) {
        Ok(signed) => ok(&req.id, json!(signed)),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.sign_out(state.db.as_ref()) {
        Ok(()) => ok(&req.id, json!({ "redirect": "/login" })),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(token) = get_optional_str(&req.params, "token") else {
        return err(&req.id, "bad_params", "missing token", None);
    };
    match state.session.restore(conn, &token) {
        Ok(signed) => ok(&req.id, json!(signed)),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!(state.session.current()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signIn" => Some(handle_sign_in(state, req)),
        "auth.signUp" => Some(handle_sign_up(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.restore" => Some(handle_restore(state, req)),
        "auth.session" => Some(handle_session(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_of_an_unselected_role_are_dropped() {
        let reg = parse_registration(&json!({
            "role": "parent",
            "fullName": "Omar",
            "email": "omar@example.com",
            "password": "secret1",
            "confirmPassword": "secret1",
            "qualification": "Ijazah",
            "gender": "male"
        }))
        .expect("parse");
        assert_eq!(reg.fields, RoleFields::Parent);
    }

    #[test]
    fn student_needs_date_of_birth() {
        let e = parse_registration(&json!({
            "role": "student",
            "gender": "female",
            "level": "Hifz"
        }))
        .expect_err("no dob");
        assert_eq!(e.code, "validation");
        assert_eq!(e.message, "Date of birth is required");
    }

    #[test]
    fn admin_is_not_a_sign_up_role() {
        let e = parse_registration(&json!({ "role": "admin" })).expect_err("admin");
        assert_eq!(e.code, "validation");
    }
}
