use super::error::{err, ok, HandlerErr};
use super::types::{AppState, Request};
use crate::model::AttendanceStatus;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Params};
use serde_json::json;

/// What a role view gets to work with: the open store and the signed-in
/// identity it filters by.
pub struct View<'a> {
    pub conn: &'a Connection,
    pub user_id: &'a str,
}

pub type ViewFn = fn(&View, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

pub fn run_view(state: &AppState, req: &Request, f: ViewFn) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(user_id) = state.session.current().user_id() else {
        return err(
            &req.id,
            "unauthenticated",
            "sign in first",
            Some(json!({ "redirect": "/login" })),
        );
    };
    match f(&View { conn, user_id }, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; blank counts as absent.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Numbers may arrive as JSON numbers or as form strings.
pub fn get_optional_f64(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<f64>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let not_a_number = || HandlerErr::bad_params(format!("{} must be a number", key));
    let n = match (v.as_f64(), v.as_str().map(str::trim)) {
        (Some(n), _) => n,
        (None, Some("")) => return Ok(None),
        (None, Some(s)) => s.parse::<f64>().map_err(|_| not_a_number())?,
        (None, None) => return Err(not_a_number()),
    };
    if !n.is_finite() {
        return Err(not_a_number());
    }
    Ok(Some(n))
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    get_optional_f64(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_i64(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<i64>, HandlerErr> {
    match get_optional_f64(params, key)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 => Ok(Some(n as i64)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a whole number", key))),
    }
}

pub fn get_optional_bool(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// `YYYY-MM-DD` date param, normalised.
pub fn get_optional_date(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = get_optional_str(params, key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(|d| Some(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_optional_date(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn percent_param(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match get_optional_f64(params, key)? {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(HandlerErr::bad_params(format!(
            "{} must be between 0 and 100",
            key
        ))),
        other => Ok(other),
    }
}

pub fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<i64, HandlerErr> {
    Ok(conn.query_row(sql, params, |r| r.get(0))?)
}

pub fn strings<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn exists<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row(sql, params, |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

/// The teachers row behind a signed-in identity, if any.
pub fn teacher_id_for(conn: &Connection, user_id: &str) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row("SELECT id FROM teachers WHERE user_id = ?", [user_id], |r| {
            r.get(0)
        })
        .optional()?)
}

/// The students row behind a signed-in identity, if any.
pub fn student_id_for(conn: &Connection, user_id: &str) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row("SELECT id FROM students WHERE user_id = ?", [user_id], |r| {
            r.get(0)
        })
        .optional()?)
}

pub fn children_of(conn: &Connection, parent_id: &str) -> Result<Vec<String>, HandlerErr> {
    strings(
        conn,
        "SELECT student_id FROM parent_student_relation WHERE parent_id = ? ORDER BY created_at",
        [parent_id],
    )
}

pub fn parse_specialization(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!([]))
}

pub fn floats<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<f64>, HandlerErr> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Collects `(date, status)` pairs, dropping rows whose status tag is not
/// an attendance status.
pub fn attendance_rows<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<(String, AttendanceStatus)>, HandlerErr> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(date, status)| AttendanceStatus::parse(&status).map(|s| (date, s)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_may_arrive_as_strings() {
        let p = json!({ "a": 12.5, "b": " 40 ", "c": "", "d": null });
        assert_eq!(get_optional_f64(&p, "a").expect("a"), Some(12.5));
        assert_eq!(get_optional_f64(&p, "b").expect("b"), Some(40.0));
        assert_eq!(get_optional_f64(&p, "c").expect("c"), None);
        assert_eq!(get_optional_f64(&p, "d").expect("d"), None);
        assert_eq!(get_optional_f64(&p, "missing").expect("missing"), None);
    }

    #[test]
    fn non_finite_numbers_are_bad_params() {
        for raw in ["inf", "-inf", "NaN", "infinity"] {
            let e = get_optional_f64(&json!({ "amount": raw }), "amount").expect_err(raw);
            assert_eq!(e.code, "bad_params");
            assert_eq!(e.message, "amount must be a number");
        }
    }
}
