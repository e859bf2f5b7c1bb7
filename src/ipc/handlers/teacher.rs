use crate::calc;
use crate::db::{placeholders, today};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    attendance_rows, count, exists, get_optional_date, get_optional_f64, get_optional_i64,
    get_optional_str, get_required_date, get_required_f64, get_required_str, percent_param,
    run_view, strings, teacher_id_for, View, ViewFn,
};
use crate::ipc::rows;
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceStatus, SubmissionStatus};
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const UPCOMING_LIMIT: i64 = 3;
const RECENT_LIMIT: i64 = 5;

fn require_teacher(v: &View) -> Result<String, HandlerErr> {
    teacher_id_for(v.conn, v.user_id)?
        .ok_or_else(|| HandlerErr::not_found("no teacher profile for this account"))
}

fn require_own_class(v: &View, teacher_id: &str, class_id: &str) -> Result<(), HandlerErr> {
    if exists(
        v.conn,
        "SELECT 1 FROM classes WHERE id = ? AND teacher_id = ?",
        [class_id, teacher_id],
    )? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("class not found"))
    }
}

fn dashboard(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(teacher_id) = teacher_id_for(v.conn, v.user_id)? else {
        return Ok(json!({
            "stats": { "activeClasses": 0, "totalStudents": 0, "pendingSubmissions": 0 },
            "upcomingClasses": [],
            "recentHomework": [],
        }));
    };
    let conn = v.conn;
    let active_classes = count(
        conn,
        "SELECT COUNT(*) FROM classes WHERE teacher_id = ? AND is_active = 1",
        [&teacher_id],
    )?;
    let enrolled = strings(
        conn,
        "SELECT e.student_id FROM enrollments e
         JOIN classes c ON c.id = e.class_id
         WHERE c.teacher_id = ? AND e.status = 'active'",
        [&teacher_id],
    )?;
    let pending = count(
        conn,
        "SELECT COUNT(*) FROM homework_submissions hs
         JOIN homework h ON h.id = hs.homework_id
         WHERE h.teacher_id = ? AND hs.status = 'pending'",
        [&teacher_id],
    )?;
    let upcoming = rows::classes(
        conn,
        "WHERE c.teacher_id = ? AND c.is_active = 1
         ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?",
        params![teacher_id, UPCOMING_LIMIT],
    )?;
    let recent = homework_rows(conn, &teacher_id, Some(RECENT_LIMIT))?;

    Ok(json!({
        "stats": {
            "activeClasses": active_classes,
            "totalStudents": calc::distinct_count(enrolled),
            "pendingSubmissions": pending,
        },
        "upcomingClasses": upcoming,
        "recentHomework": recent,
    }))
}

fn classes(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(teacher_id) = teacher_id_for(v.conn, v.user_id)? else {
        return Ok(json!({ "classes": [] }));
    };
    let mut classes = rows::classes(
        v.conn,
        "WHERE c.teacher_id = ? ORDER BY c.created_at DESC, c.rowid DESC",
        [&teacher_id],
    )?;

    let mut stmt = v.conn.prepare(
        "SELECT e.class_id, s.id, sp.full_name FROM enrollments e
         JOIN classes c ON c.id = e.class_id
         JOIN students s ON s.id = e.student_id
         JOIN profiles sp ON sp.id = s.user_id
         WHERE c.teacher_id = ? AND e.status = 'active'
         ORDER BY sp.full_name",
    )?;
    let mut by_class: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    let enrolled = stmt
        .query_map([&teacher_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                json!({ "id": r.get::<_, String>(1)?, "fullName": r.get::<_, String>(2)? }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (class_id, student) in enrolled {
        by_class.entry(class_id).or_default().push(student);
    }
    for class in classes.iter_mut() {
        let id = class["id"].as_str().unwrap_or_default().to_string();
        class["students"] = json!(by_class.remove(&id).unwrap_or_default());
    }
    Ok(json!({ "classes": classes }))
}

fn students(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(teacher_id) = teacher_id_for(v.conn, v.user_id)? else {
        return Ok(json!({ "enrollments": [] }));
    };
    let mut stmt = v.conn.prepare(
        "SELECT e.id, e.enrollment_date, c.id, c.class_name,
                s.id, sp.full_name, sp.email, sp.phone, s.level, s.gender
         FROM enrollments e
         JOIN classes c ON c.id = e.class_id
         JOIN students s ON s.id = e.student_id
         JOIN profiles sp ON sp.id = s.user_id
         WHERE c.teacher_id = ? AND e.status = 'active'
         ORDER BY sp.full_name, c.class_name",
    )?;
    let enrollments = stmt
        .query_map([&teacher_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "enrollmentDate": r.get::<_, String>(1)?,
                "classId": r.get::<_, String>(2)?,
                "className": r.get::<_, String>(3)?,
                "student": {
                    "id": r.get::<_, String>(4)?,
                    "fullName": r.get::<_, String>(5)?,
                    "email": r.get::<_, String>(6)?,
                    "phone": r.get::<_, Option<String>>(7)?,
                    "level": r.get::<_, String>(8)?,
                    "gender": r.get::<_, Option<String>>(9)?,
                },
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "enrollments": enrollments }))
}

/// Own homework, newest first, with submission counts.
fn homework_rows(
    conn: &rusqlite::Connection,
    teacher_id: &str,
    limit: Option<i64>,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT h.id, h.class_id, c.class_name, h.title, h.description, h.assigned_date,
                h.due_date, h.max_score,
                (SELECT COUNT(*) FROM homework_submissions hs WHERE hs.homework_id = h.id),
                (SELECT COUNT(*) FROM homework_submissions hs
                  WHERE hs.homework_id = h.id AND hs.status = 'graded')
         FROM homework h
         JOIN classes c ON c.id = h.class_id
         WHERE h.teacher_id = ?
         ORDER BY h.assigned_date DESC, h.rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map(params![teacher_id, limit.unwrap_or(-1)], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "className": r.get::<_, String>(2)?,
                "title": r.get::<_, String>(3)?,
                "description": r.get::<_, Option<String>>(4)?,
                "assignedDate": r.get::<_, String>(5)?,
                "dueDate": r.get::<_, String>(6)?,
                "maxScore": r.get::<_, f64>(7)?,
                "submissionCount": r.get::<_, i64>(8)?,
                "gradedCount": r.get::<_, i64>(9)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn homework_view(
    conn: &rusqlite::Connection,
    teacher_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let homework = homework_rows(conn, teacher_id, None)?;
    let classes = rows::classes(
        conn,
        "WHERE c.teacher_id = ? AND c.is_active = 1 ORDER BY c.class_name",
        [teacher_id],
    )?;
    Ok(json!({ "homework": homework, "classes": classes }))
}

fn homework(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    match teacher_id_for(v.conn, v.user_id)? {
        Some(teacher_id) => homework_view(v.conn, &teacher_id),
        None => Ok(json!({ "homework": [], "classes": [] })),
    }
}

fn create_homework(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let class_id = get_required_str(params, "classId")?;
    require_own_class(v, &teacher_id, &class_id)?;
    let title = get_required_str(params, "title")?;
    let due_date = get_required_date(params, "dueDate")?;
    let assigned_date = get_optional_date(params, "assignedDate")?.unwrap_or_else(today);
    let max_score = match get_optional_f64(params, "maxScore")? {
        Some(m) if m <= 0.0 => return Err(HandlerErr::bad_params("maxScore must be positive")),
        Some(m) => m,
        None => 100.0,
    };

    let homework_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO homework(
                id, class_id, teacher_id, title, description, assigned_date, due_date, max_score
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                homework_id,
                class_id,
                teacher_id,
                title,
                get_optional_str(params, "description"),
                assigned_date,
                due_date,
                max_score,
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "homework"))?;
    tracing::info!(homework = %homework_id, class = %class_id, "homework assigned");

    let mut view = homework_view(v.conn, &teacher_id)?;
    view["homeworkId"] = json!(homework_id);
    Ok(view)
}

fn submission_rows(
    conn: &rusqlite::Connection,
    homework_id: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT hs.id, hs.student_id, sp.full_name, hs.submission_text, hs.submitted_at,
                hs.status, hs.score, hs.feedback
         FROM homework_submissions hs
         JOIN students s ON s.id = hs.student_id
         JOIN profiles sp ON sp.id = s.user_id
         WHERE hs.homework_id = ?
         ORDER BY hs.submitted_at DESC, hs.rowid DESC",
    )?;
    let rows = stmt
        .query_map([homework_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "submissionText": r.get::<_, String>(3)?,
                "submittedAt": r.get::<_, String>(4)?,
                "status": r.get::<_, String>(5)?,
                "score": r.get::<_, Option<f64>>(6)?,
                "feedback": r.get::<_, Option<String>>(7)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn submissions(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let homework_id = get_required_str(params, "homeworkId")?;
    if !exists(
        v.conn,
        "SELECT 1 FROM homework WHERE id = ? AND teacher_id = ?",
        [&homework_id, &teacher_id],
    )? {
        return Err(HandlerErr::not_found("homework not found"));
    }
    Ok(json!({ "submissions": submission_rows(v.conn, &homework_id)? }))
}

/// Scores a submission on the teacher's own homework. The score may not
/// exceed the homework's max score.
fn grade(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let submission_id = get_required_str(params, "submissionId")?;
    let score = get_required_f64(params, "score")?;
    let found: Option<(String, f64)> = v
        .conn
        .query_row(
            "SELECT h.id, h.max_score FROM homework_submissions hs
             JOIN homework h ON h.id = hs.homework_id
             WHERE hs.id = ? AND h.teacher_id = ?",
            [&submission_id, &teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((homework_id, max_score)) = found else {
        return Err(HandlerErr::not_found("submission not found"));
    };
    if !(0.0..=max_score).contains(&score) {
        return Err(HandlerErr::bad_params(format!(
            "score must be between 0 and {}",
            max_score
        ))
        .with_details(json!({ "maxScore": max_score })));
    }

    v.conn
        .execute(
            "UPDATE homework_submissions SET status = ?, score = ?, feedback = ? WHERE id = ?",
            params![
                SubmissionStatus::Graded.as_str(),
                score,
                get_optional_str(params, "feedback"),
                submission_id,
            ],
        )
        .map_err(HandlerErr::write_failed("db_update_failed", "homework_submissions"))?;
    tracing::info!(submission = %submission_id, score, "submission graded");

    Ok(json!({
        "homeworkId": homework_id,
        "submissions": submission_rows(v.conn, &homework_id)?,
    }))
}

/// The marking sheet for one class on one day.
fn attendance_sheet(
    conn: &rusqlite::Connection,
    teacher_id: &str,
    class_id: Option<String>,
    date: String,
) -> Result<serde_json::Value, HandlerErr> {
    let classes = rows::classes(
        conn,
        "WHERE c.teacher_id = ? AND c.is_active = 1 ORDER BY c.class_name, c.rowid",
        [teacher_id],
    )?;
    let selected = class_id.or_else(|| {
        classes
            .first()
            .and_then(|c| c["id"].as_str())
            .map(str::to_string)
    });
    let Some(selected) = selected else {
        return Ok(json!({
            "classes": classes,
            "selectedClassId": null,
            "date": date,
            "students": [],
            "statuses": {},
        }));
    };

    let mut stmt = conn.prepare(
        "SELECT s.id, sp.full_name FROM enrollments e
         JOIN students s ON s.id = e.student_id
         JOIN profiles sp ON sp.id = s.user_id
         WHERE e.class_id = ? AND e.status = 'active'
         ORDER BY sp.full_name",
    )?;
    let students = stmt
        .query_map([&selected], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "fullName": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT student_id, status FROM attendance WHERE class_id = ? AND date = ?",
    )?;
    let statuses = stmt
        .query_map([&selected, &date], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(json!({
        "classes": classes,
        "selectedClassId": selected,
        "date": date,
        "students": students,
        "statuses": statuses,
    }))
}

fn open_attendance(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_optional_date(params, "date")?.unwrap_or_else(today);
    let Some(teacher_id) = teacher_id_for(v.conn, v.user_id)? else {
        return Ok(json!({
            "classes": [],
            "selectedClassId": null,
            "date": date,
            "students": [],
            "statuses": {},
        }));
    };
    let class_id = get_optional_str(params, "classId");
    if let Some(id) = &class_id {
        require_own_class(v, &teacher_id, id)?;
    }
    attendance_sheet(v.conn, &teacher_id, class_id, date)
}

/// One row per (class, student, date); marking again overwrites the status.
fn mark_attendance(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let class_id = get_required_str(params, "classId")?;
    require_own_class(v, &teacher_id, &class_id)?;
    let student_id = get_required_str(params, "studentId")?;
    let date = get_optional_date(params, "date")?.unwrap_or_else(today);
    let raw_status = get_required_str(params, "status")?;
    let status = AttendanceStatus::parse(&raw_status).ok_or_else(|| {
        HandlerErr::bad_params(format!("unknown attendance status: {}", raw_status))
    })?;
    if !exists(
        v.conn,
        "SELECT 1 FROM enrollments WHERE class_id = ? AND student_id = ? AND status = 'active'",
        [&class_id, &student_id],
    )? {
        return Err(HandlerErr::not_found("student is not enrolled in this class"));
    }

    v.conn
        .execute(
            "INSERT INTO attendance(id, class_id, student_id, date, status)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(class_id, student_id, date) DO UPDATE SET
                status = excluded.status",
            params![
                Uuid::new_v4().to_string(),
                class_id,
                student_id,
                date,
                status.as_str(),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "attendance"))?;
    tracing::debug!(class = %class_id, student = %student_id, %date, %status, "attendance marked");

    attendance_sheet(v.conn, &teacher_id, Some(class_id), date)
}

/// Writes a progress report for a student enrolled in one of the teacher's
/// classes. Attendance percentage defaults to the student's recorded rate.
fn create_progress(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let student_id = get_required_str(params, "studentId")?;
    if !exists(
        v.conn,
        "SELECT 1 FROM enrollments e JOIN classes c ON c.id = e.class_id
         WHERE e.student_id = ? AND c.teacher_id = ? AND e.status = 'active'",
        [&student_id, &teacher_id],
    )? {
        return Err(HandlerErr::not_found("student is not in any of your classes"));
    }
    let memorization = percent_param(params, "quranMemorization")?
        .ok_or_else(|| HandlerErr::bad_params("missing quranMemorization"))?;
    let tajweed = percent_param(params, "tajweedScore")?
        .ok_or_else(|| HandlerErr::bad_params("missing tajweedScore"))?;
    let attendance = match percent_param(params, "attendancePercentage")? {
        Some(a) => a,
        None => {
            let records = attendance_rows(
                v.conn,
                "SELECT date, status FROM attendance WHERE student_id = ?",
                [&student_id],
            )?;
            calc::round_1(calc::attendance_rate(records.into_iter().map(|(_, s)| s)))
        }
    };
    let report_date = get_optional_date(params, "reportDate")?.unwrap_or_else(today);

    let report_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO progress_reports(
                id, student_id, teacher_id, report_date, quran_memorization, tajweed_score,
                attendance_percentage, overall_performance, comments
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                report_id,
                student_id,
                teacher_id,
                report_date,
                memorization,
                tajweed,
                attendance,
                get_optional_str(params, "overallPerformance"),
                get_optional_str(params, "comments"),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "progress_reports"))?;
    tracing::info!(report = %report_id, student = %student_id, "progress report written");

    let reports = rows::progress_reports(
        v.conn,
        "WHERE pr.student_id = ? ORDER BY pr.report_date DESC, pr.rowid DESC",
        [&student_id],
    )?;
    Ok(json!({ "reportId": report_id, "reports": reports }))
}

fn add_lesson(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = require_teacher(v)?;
    let class_id = get_required_str(params, "classId")?;
    require_own_class(v, &teacher_id, &class_id)?;
    let title = get_required_str(params, "title")?;
    let video_url = get_required_str(params, "videoUrl")?;
    let recorded_date = get_optional_date(params, "recordedDate")?.unwrap_or_else(today);
    let duration = get_optional_i64(params, "durationMinutes")?;
    if matches!(duration, Some(d) if d <= 0) {
        return Err(HandlerErr::bad_params("durationMinutes must be positive"));
    }

    let lesson_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO recorded_lessons(id, class_id, title, video_url, recorded_date, duration_minutes)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![lesson_id, class_id, title, video_url, recorded_date, duration],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "recorded_lessons"))?;

    let ids = [class_id];
    let lessons = lesson_rows(v.conn, &ids)?;
    Ok(json!({ "lessonId": lesson_id, "lessons": lessons }))
}

/// Recorded lessons of the given classes, newest first.
pub(crate) fn lesson_rows(
    conn: &rusqlite::Connection,
    class_ids: &[String],
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    if class_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, class_id, title, video_url, recorded_date, duration_minutes
         FROM recorded_lessons
         WHERE class_id IN ({})
         ORDER BY recorded_date DESC, rowid DESC",
        placeholders(class_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(class_ids.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "videoUrl": r.get::<_, String>(3)?,
                "recordedDate": r.get::<_, String>(4)?,
                "durationMinutes": r.get::<_, Option<i64>>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: ViewFn = match req.method.as_str() {
        "teacher.dashboard" => dashboard,
        "teacher.classes.list" => classes,
        "teacher.students.list" => students,
        "teacher.homework.list" => homework,
        "teacher.homework.create" => create_homework,
        "teacher.homework.submissions" => submissions,
        "teacher.homework.grade" => grade,
        "teacher.attendance.open" => open_attendance,
        "teacher.attendance.mark" => mark_attendance,
        "teacher.progress.create" => create_progress,
        "teacher.lessons.add" => add_lesson,
        _ => return None,
    };
    Some(run_view(state, req, f))
}
