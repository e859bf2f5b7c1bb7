use super::teacher::lesson_rows;
use crate::calc;
use crate::db::{now_stamp, placeholders};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    attendance_rows, count, exists, get_required_str, run_view, strings, student_id_for, View,
    ViewFn,
};
use crate::ipc::rows;
use crate::ipc::types::{AppState, Request};
use crate::model::SubmissionStatus;
use rusqlite::{params, params_from_iter};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

const UPCOMING_LIMIT: i64 = 3;
const CHART_REPORTS: usize = 5;
const ATTENDANCE_HISTORY: i64 = 30;

fn active_class_ids(
    conn: &rusqlite::Connection,
    student_id: &str,
) -> Result<Vec<String>, HandlerErr> {
    strings(
        conn,
        "SELECT class_id FROM enrollments WHERE student_id = ? AND status = 'active'",
        [student_id],
    )
}

fn dashboard(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(student_id) = student_id_for(v.conn, v.user_id)? else {
        return Ok(json!({
            "stats": { "enrolledClasses": 0, "pendingHomework": 0, "attendanceRate": 0.0 },
            "upcomingClasses": [],
            "latestReport": null,
        }));
    };
    let conn = v.conn;
    let enrolled = count(
        conn,
        "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND status = 'active'",
        [&student_id],
    )?;
    let upcoming = rows::classes(
        conn,
        "WHERE c.id IN (SELECT class_id FROM enrollments WHERE student_id = ? AND status = 'active')
         ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?",
        params![student_id, UPCOMING_LIMIT],
    )?;
    let pending = count(
        conn,
        "SELECT COUNT(*) FROM homework_submissions WHERE student_id = ? AND status = 'pending'",
        [&student_id],
    )?;
    let attendance = attendance_rows(
        conn,
        "SELECT date, status FROM attendance WHERE student_id = ?",
        [&student_id],
    )?;
    let rate = calc::attendance_rate(attendance.into_iter().map(|(_, s)| s));
    let latest = rows::progress_reports(
        conn,
        "WHERE pr.student_id = ? ORDER BY pr.report_date DESC, pr.rowid DESC LIMIT 1",
        [&student_id],
    )?;

    Ok(json!({
        "stats": {
            "enrolledClasses": enrolled,
            "pendingHomework": pending,
            "attendanceRate": calc::round_1(rate),
        },
        "upcomingClasses": upcoming,
        "latestReport": latest.into_iter().next(),
    }))
}

/// Enrolled classes, each with its recorded lessons newest first.
fn classes(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(student_id) = student_id_for(v.conn, v.user_id)? else {
        return Ok(json!({ "classes": [] }));
    };
    let mut classes = rows::classes(
        v.conn,
        "WHERE c.id IN (SELECT class_id FROM enrollments WHERE student_id = ? AND status = 'active')
         ORDER BY c.class_name, c.rowid",
        [&student_id],
    )?;
    let class_ids = active_class_ids(v.conn, &student_id)?;

    let mut lessons: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    for lesson in lesson_rows(v.conn, &class_ids)? {
        let class_id = lesson["classId"].as_str().unwrap_or_default().to_string();
        lessons.entry(class_id).or_default().push(lesson);
    }
    for class in classes.iter_mut() {
        let id = class["id"].as_str().unwrap_or_default().to_string();
        class["recordedLessons"] = json!(lessons.remove(&id).unwrap_or_default());
    }
    Ok(json!({ "classes": classes }))
}

/// Homework of enrolled classes by due date, split on whether this student
/// has submitted it.
fn homework(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let empty = json!({ "homework": [], "submissions": {}, "pending": [], "submitted": [] });
    let Some(student_id) = student_id_for(v.conn, v.user_id)? else {
        return Ok(empty);
    };
    let class_ids = active_class_ids(v.conn, &student_id)?;
    if class_ids.is_empty() {
        return Ok(empty);
    }

    let sql = format!(
        "SELECT h.id, h.class_id, c.class_name, h.title, h.description, h.assigned_date,
                h.due_date, h.max_score
         FROM homework h
         JOIN classes c ON c.id = h.class_id
         WHERE h.class_id IN ({})
         ORDER BY h.due_date ASC, h.rowid ASC",
        placeholders(class_ids.len())
    );
    let mut stmt = v.conn.prepare(&sql)?;
    let homework = stmt
        .query_map(params_from_iter(class_ids.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "className": r.get::<_, String>(2)?,
                "title": r.get::<_, String>(3)?,
                "description": r.get::<_, Option<String>>(4)?,
                "assignedDate": r.get::<_, String>(5)?,
                "dueDate": r.get::<_, String>(6)?,
                "maxScore": r.get::<_, f64>(7)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = v.conn.prepare(
        "SELECT id, homework_id, submission_text, submitted_at, status, score, feedback
         FROM homework_submissions
         WHERE student_id = ?
         ORDER BY submitted_at ASC, rowid ASC",
    )?;
    let submissions = stmt
        .query_map([&student_id], |r| {
            Ok((
                r.get::<_, String>(1)?,
                json!({
                    "id": r.get::<_, String>(0)?,
                    "submissionText": r.get::<_, String>(2)?,
                    "submittedAt": r.get::<_, String>(3)?,
                    "status": r.get::<_, String>(4)?,
                    "score": r.get::<_, Option<f64>>(5)?,
                    "feedback": r.get::<_, Option<String>>(6)?,
                }),
            ))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let submitted_ids: HashSet<String> = submissions.keys().cloned().collect();
    let (pending, submitted) = calc::split_homework(
        homework.iter().filter_map(|h| h["id"].as_str()),
        &submitted_ids,
    );

    Ok(json!({
        "homework": homework,
        "submissions": submissions,
        "pending": pending,
        "submitted": submitted,
    }))
}

/// New submissions always start out pending; grading happens teacher-side.
fn submit(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = student_id_for(v.conn, v.user_id)?
        .ok_or_else(|| HandlerErr::not_found("no student profile for this account"))?;
    let homework_id = get_required_str(params, "homeworkId")?;
    let text = get_required_str(params, "submissionText")?;
    if !exists(
        v.conn,
        "SELECT 1 FROM homework h
         JOIN enrollments e ON e.class_id = h.class_id
         WHERE h.id = ? AND e.student_id = ? AND e.status = 'active'",
        [&homework_id, &student_id],
    )? {
        return Err(HandlerErr::not_found("homework not found"));
    }
    if exists(
        v.conn,
        "SELECT 1 FROM homework_submissions WHERE homework_id = ? AND student_id = ?",
        [&homework_id, &student_id],
    )? {
        return Err(HandlerErr::new("already_submitted", "homework already submitted"));
    }

    let submission_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO homework_submissions(
                id, homework_id, student_id, submission_text, submitted_at, status
             ) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                submission_id,
                homework_id,
                student_id,
                text,
                now_stamp(),
                SubmissionStatus::Pending.as_str(),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "homework_submissions"))?;
    tracing::info!(submission = %submission_id, homework = %homework_id, "homework submitted");

    let mut view = homework(v, params)?;
    view["submissionId"] = json!(submission_id);
    Ok(view)
}

fn progress(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(student_id) = student_id_for(v.conn, v.user_id)? else {
        return Ok(json!({
            "reports": [],
            "chart": [],
            "attendance": [],
            "attendanceStats": calc::AttendanceTally::default(),
        }));
    };
    let reports = rows::progress_reports(
        v.conn,
        "WHERE pr.student_id = ? ORDER BY pr.report_date DESC, pr.rowid DESC",
        [&student_id],
    )?;
    // Newest five, plotted oldest first.
    let chart: Vec<_> = reports
        .iter()
        .take(CHART_REPORTS)
        .rev()
        .map(|r| {
            json!({
                "date": r["reportDate"],
                "memorization": r["quranMemorization"],
                "tajweed": r["tajweedScore"],
                "attendance": r["attendancePercentage"],
            })
        })
        .collect();

    let history = attendance_rows(
        v.conn,
        "SELECT date, status FROM attendance WHERE student_id = ?
         ORDER BY date DESC, rowid DESC LIMIT ?",
        params![student_id, ATTENDANCE_HISTORY],
    )?;
    let stats = calc::tally(history.iter().map(|(_, s)| *s));
    let attendance: Vec<_> = history
        .iter()
        .map(|(date, status)| json!({ "date": date, "status": status }))
        .collect();

    Ok(json!({
        "reports": reports,
        "chart": chart,
        "attendance": attendance,
        "attendanceStats": stats,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: ViewFn = match req.method.as_str() {
        "student.dashboard" => dashboard,
        "student.classes.list" => classes,
        "student.homework.list" => homework,
        "student.homework.submit" => submit,
        "student.progress" => progress,
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
            "INSERT INTO identities VALUES ('s-user', 's@x.com', 'h', '2024-01-01');
             INSERT INTO profiles VALUES ('s-user', 'Amina', 's@x.com', NULL, 'student', '2024-01-01');
             INSERT INTO students(id, user_id, level, created_at) VALUES ('s1', 's-user', 'Hifz', '2024-01-01');
             INSERT INTO identities VALUES ('t-user', 't@x.com', 'h', '2024-01-01');
             INSERT INTO profiles VALUES ('t-user', 'Ustadh Ali', 't@x.com', NULL, 'teacher', '2024-01-01');
             INSERT INTO teachers(id, user_id, created_at) VALUES ('t1', 't-user', '2024-01-01');
             INSERT INTO classes(id, teacher_id, class_name, created_at) VALUES ('c1', 't1', 'Hifz A', '2024-01-01');
             INSERT INTO enrollments(id, student_id, class_id, enrollment_date, created_at)
                VALUES ('e1', 's1', 'c1', '2024-01-02', '2024-01-02');
             INSERT INTO homework(id, class_id, teacher_id, title, assigned_date, due_date)
                VALUES ('h-old', 'c1', 't1', 'Past due', '2020-01-01', '2020-01-08');
             INSERT INTO homework(id, class_id, teacher_id, title, assigned_date, due_date)
                VALUES ('h-new', 'c1', 't1', 'Upcoming', '2024-01-01', '2099-01-08');",
        )
        .expect("seed");
        conn
    }

    fn view(conn: &Connection) -> View<'_> {
        View {
            conn,
            user_id: "s-user",
        }
    }

    #[test]
    fn past_due_homework_without_submission_is_still_pending() {
        let conn = store();
        let out = homework(&view(&conn), &json!({})).expect("list");
        assert_eq!(out["pending"], json!(["h-old", "h-new"]));
        assert_eq!(out["submitted"], json!([]));
    }

    #[test]
    fn submission_moves_homework_to_submitted_as_pending() {
        let conn = store();
        let out = submit(
            &view(&conn),
            &json!({ "homeworkId": "h-new", "submissionText": "Recited Surah Mulk" }),
        )
        .expect("submit");
        assert_eq!(out["submitted"], json!(["h-new"]));
        assert_eq!(out["submissions"]["h-new"]["status"], "pending");

        let again = submit(
            &view(&conn),
            &json!({ "homeworkId": "h-new", "submissionText": "again" }),
        )
        .expect_err("duplicate");
        assert_eq!(again.code, "already_submitted");
    }

    #[test]
    fn progress_chart_is_oldest_first() {
        let conn = store();
        for (i, date) in ["2024-01-01", "2024-02-01", "2024-03-01"].iter().enumerate() {
            conn.execute(
                "INSERT INTO progress_reports(
                    id, student_id, teacher_id, report_date, quran_memorization, tajweed_score,
                    attendance_percentage
                 ) VALUES (?, 's1', 't1', ?, ?, 70, 90)",
                params![format!("r{}", i), date, 60.0 + i as f64],
            )
            .expect("report");
        }
        let out = progress(&view(&conn), &json!({})).expect("progress");
        assert_eq!(out["reports"][0]["reportDate"], "2024-03-01");
        assert_eq!(out["chart"][0]["date"], "2024-01-01");
        assert_eq!(out["chart"][2]["memorization"], 62.0);
    }
}
