use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{attendance_rows, children_of, count, floats, run_view, View, ViewFn};
use crate::ipc::rows;
use crate::ipc::types::{AppState, Request};
use rusqlite::params;
use serde_json::json;
use std::collections::HashMap;

const REPORTS_PER_CHILD: i64 = 3;

const CHILD_IDS: &str =
    "SELECT student_id FROM parent_student_relation WHERE parent_id = ?";

/// Children linked to this parent, each with the classes they are actively
/// enrolled in.
fn children_with_classes(v: &View) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut children = rows::students(
        v.conn,
        &format!("WHERE s.id IN ({}) ORDER BY sp.full_name, s.rowid", CHILD_IDS),
        [v.user_id],
    )?;

    let mut stmt = v.conn.prepare(&format!(
        "SELECT e.student_id, e.id, c.id, c.class_name, c.schedule_day, c.schedule_time
         FROM enrollments e
         JOIN classes c ON c.id = e.class_id
         WHERE e.student_id IN ({}) AND e.status = 'active'
         ORDER BY c.class_name",
        CHILD_IDS
    ))?;
    let enrolled = stmt
        .query_map([v.user_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                json!({
                    "enrollmentId": r.get::<_, String>(1)?,
                    "classId": r.get::<_, String>(2)?,
                    "className": r.get::<_, String>(3)?,
                    "scheduleDay": r.get::<_, Option<String>>(4)?,
                    "scheduleTime": r.get::<_, Option<String>>(5)?,
                }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut by_student: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for (student_id, class) in enrolled {
        by_student.entry(student_id).or_default().push(class);
    }
    for child in children.iter_mut() {
        let id = child["id"].as_str().unwrap_or_default().to_string();
        child["classes"] = json!(by_student.remove(&id).unwrap_or_default());
    }
    Ok(children)
}

fn dashboard(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let children = children_with_classes(v)?;
    let active_enrollments = count(
        v.conn,
        &format!(
            "SELECT COUNT(*) FROM enrollments WHERE student_id IN ({}) AND status = 'active'",
            CHILD_IDS
        ),
        [v.user_id],
    )?;
    let attendance = attendance_rows(
        v.conn,
        &format!(
            "SELECT date, status FROM attendance WHERE student_id IN ({})",
            CHILD_IDS
        ),
        [v.user_id],
    )?;
    let average_attendance = calc::attendance_rate(attendance.into_iter().map(|(_, s)| s));
    let pending_fees = calc::sum_amounts(floats(
        v.conn,
        &format!(
            "SELECT amount FROM fee_records WHERE student_id IN ({}) AND status = 'pending'",
            CHILD_IDS
        ),
        [v.user_id],
    )?);

    Ok(json!({
        "stats": {
            "totalChildren": children.len(),
            "activeEnrollments": active_enrollments,
            "averageAttendance": calc::round_1(average_attendance),
            "pendingFees": pending_fees,
        },
        "children": children,
    }))
}

fn children(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "children": children_with_classes(v)? }))
}

fn fees(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let fee_records = rows::fee_records(
        v.conn,
        &format!(
            "WHERE f.student_id IN ({}) ORDER BY f.due_date DESC, f.rowid DESC",
            CHILD_IDS
        ),
        [v.user_id],
    )?;
    let payments = rows::payments(
        v.conn,
        &format!(
            "WHERE p.student_id IN ({}) ORDER BY p.payment_date DESC, p.rowid DESC",
            CHILD_IDS
        ),
        [v.user_id],
    )?;

    let total_pending = calc::sum_amounts(
        fee_records
            .iter()
            .filter(|f| f["status"] == "pending")
            .filter_map(|f| f["amount"].as_f64()),
    );
    let total_paid = calc::sum_amounts(payments.iter().filter_map(|p| p["amount"].as_f64()));

    Ok(json!({
        "feeRecords": fee_records,
        "payments": payments,
        "totalPending": total_pending,
        "totalPaid": total_paid,
    }))
}

fn progress(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut out = Vec::new();
    for student_id in children_of(v.conn, v.user_id)? {
        let student = rows::students(v.conn, "WHERE s.id = ?", [&student_id])?
            .into_iter()
            .next();
        let reports = rows::progress_reports(
            v.conn,
            "WHERE pr.student_id = ? ORDER BY pr.report_date DESC, pr.rowid DESC LIMIT ?",
            params![student_id, REPORTS_PER_CHILD],
        )?;
        let attendance = attendance_rows(
            v.conn,
            "SELECT date, status FROM attendance WHERE student_id = ?",
            [&student_id],
        )?;
        let rate = calc::attendance_rate(attendance.into_iter().map(|(_, s)| s));
        out.push(json!({
            "student": student,
            "reports": reports,
            "attendanceRate": calc::round_1(rate),
        }));
    }
    Ok(json!({ "children": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: ViewFn = match req.method.as_str() {
        "parent.dashboard" => dashboard,
        "parent.children" => children,
        "parent.fees" => fees,
        "parent.progress" => progress,
        _ => return None,
    };
    Some(run_view(state, req, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO identities VALUES ('p-user', 'p@x.com', 'h', '2024-01-01');
             INSERT INTO profiles VALUES ('p-user', 'Khadija', 'p@x.com', NULL, 'parent', '2024-01-01');
             INSERT INTO identities VALUES ('s-user', 's@x.com', 'h', '2024-01-01');
             INSERT INTO profiles VALUES ('s-user', 'Amina', 's@x.com', NULL, 'student', '2024-01-01');
             INSERT INTO students(id, user_id, level, created_at) VALUES ('s1', 's-user', 'Qaida', '2024-01-01');
             INSERT INTO identities VALUES ('o-user', 'o@x.com', 'h', '2024-01-01');
             INSERT INTO profiles VALUES ('o-user', 'Other', 'o@x.com', NULL, 'student', '2024-01-01');
             INSERT INTO students(id, user_id, level, created_at) VALUES ('s2', 'o-user', 'Qaida', '2024-01-01');
             INSERT INTO parent_student_relation VALUES ('p-user', 's1', '2024-01-01');
             INSERT INTO fee_records(id, student_id, amount, due_date, status, created_at)
                VALUES ('f1', 's1', 40, '2024-01-01', 'paid', '2024-01-01');
             INSERT INTO fee_records(id, student_id, amount, due_date, created_at)
                VALUES ('f2', 's1', 40, '2024-02-01', '2024-01-01');
             INSERT INTO fee_records(id, student_id, amount, due_date, created_at)
                VALUES ('f3', 's2', 99, '2024-02-01', '2024-01-01');
             INSERT INTO payments(id, student_id, fee_record_id, amount, payment_date)
                VALUES ('pay1', 's1', 'f1', 40, '2024-01-03');",
        )
        .expect("seed");
        conn
    }

    fn view(conn: &Connection) -> View<'_> {
        View {
            conn,
            user_id: "p-user",
        }
    }

    #[test]
    fn fees_only_cover_linked_children() {
        let conn = store();
        let out = fees(&view(&conn), &json!({})).expect("fees");
        assert_eq!(out["feeRecords"].as_array().map(Vec::len), Some(2));
        assert_eq!(out["feeRecords"][0]["id"], "f2");
        assert_eq!(out["totalPending"], 40.0);
        assert_eq!(out["totalPaid"], 40.0);
    }

    #[test]
    fn parent_without_children_sees_zeros() {
        let conn = store();
        let v = View {
            conn: &conn,
            user_id: "nobody",
        };
        let out = dashboard(&v, &json!({})).expect("dashboard");
        assert_eq!(out["stats"]["totalChildren"], 0);
        assert_eq!(out["stats"]["averageAttendance"], 0.0);
        assert_eq!(out["stats"]["pendingFees"], 0.0);
    }
}
