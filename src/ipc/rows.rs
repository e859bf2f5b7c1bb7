//! Row shapes several portals render the same way.

use super::error::HandlerErr;
use rusqlite::{Params, Row};
use serde_json::json;

const CLASS_SELECT: &str = "SELECT c.id, c.class_name, c.schedule_day, c.schedule_time,
        c.duration_minutes, c.max_students, c.meeting_link, c.is_active,
        c.course_id, co.name, co.level, c.teacher_id, tp.full_name,
        (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id AND e.status = 'active')
 FROM classes c
 LEFT JOIN courses co ON co.id = c.course_id
 LEFT JOIN teachers t ON t.id = c.teacher_id
 LEFT JOIN profiles tp ON tp.id = t.user_id";

fn class_from_row(r: &Row) -> rusqlite::Result<serde_json::Value> {
    let course_id: Option<String> = r.get(8)?;
    let teacher_id: Option<String> = r.get(11)?;
    let course = match course_id {
        Some(id) => json!({
            "id": id,
            "name": r.get::<_, Option<String>>(9)?,
            "level": r.get::<_, Option<String>>(10)?,
        }),
        None => serde_json::Value::Null,
    };
    let teacher = match teacher_id {
        Some(id) => json!({
            "id": id,
            "fullName": r.get::<_, Option<String>>(12)?,
        }),
        None => serde_json::Value::Null,
    };
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "className": r.get::<_, String>(1)?,
        "scheduleDay": r.get::<_, Option<String>>(2)?,
        "scheduleTime": r.get::<_, Option<String>>(3)?,
        "durationMinutes": r.get::<_, i64>(4)?,
        "maxStudents": r.get::<_, i64>(5)?,
        "meetingLink": r.get::<_, Option<String>>(6)?,
        "isActive": r.get::<_, i64>(7)? != 0,
        "course": course,
        "teacher": teacher,
        "enrolledCount": r.get::<_, i64>(13)?,
    }))
}

/// Classes joined with course, teacher name and active enrollment count.
/// `tail` carries the WHERE/ORDER/LIMIT clauses over alias `c`.
pub fn classes<P: Params>(
    conn: &rusqlite::Connection,
    tail: &str,
    params: P,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!("{} {}", CLASS_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fee records with the student's name. `tail` works over alias `f`.
pub fn fee_records<P: Params>(
    conn: &rusqlite::Connection,
    tail: &str,
    params: P,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT f.id, f.student_id, sp.full_name, f.amount, f.frequency, f.due_date, f.status
         FROM fee_records f
         JOIN students s ON s.id = f.student_id
         JOIN profiles sp ON sp.id = s.user_id
         {}",
        tail
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "amount": r.get::<_, f64>(3)?,
                "frequency": r.get::<_, String>(4)?,
                "dueDate": r.get::<_, String>(5)?,
                "status": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Payments with the student's name. `tail` works over alias `p`.
pub fn payments<P: Params>(
    conn: &rusqlite::Connection,
    tail: &str,
    params: P,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT p.id, p.student_id, sp.full_name, p.fee_record_id, p.amount,
                p.payment_method, p.transaction_id, p.notes, p.payment_date
         FROM payments p
         JOIN students s ON s.id = p.student_id
         JOIN profiles sp ON sp.id = s.user_id
         {}",
        tail
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "feeRecordId": r.get::<_, Option<String>>(3)?,
                "amount": r.get::<_, f64>(4)?,
                "paymentMethod": r.get::<_, String>(5)?,
                "transactionId": r.get::<_, Option<String>>(6)?,
                "notes": r.get::<_, Option<String>>(7)?,
                "paymentDate": r.get::<_, String>(8)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Progress reports with the reporting teacher's name. `tail` works over
/// alias `pr`.
pub fn progress_reports<P: Params>(
    conn: &rusqlite::Connection,
    tail: &str,
    params: P,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT pr.id, pr.student_id, pr.teacher_id, tp.full_name, pr.report_date,
                pr.quran_memorization, pr.tajweed_score, pr.attendance_percentage,
                pr.overall_performance, pr.comments
         FROM progress_reports pr
         LEFT JOIN teachers t ON t.id = pr.teacher_id
         LEFT JOIN profiles tp ON tp.id = t.user_id
         {}",
        tail
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "teacherId": r.get::<_, String>(2)?,
                "teacherName": r.get::<_, Option<String>>(3)?,
                "reportDate": r.get::<_, String>(4)?,
                "quranMemorization": r.get::<_, f64>(5)?,
                "tajweedScore": r.get::<_, f64>(6)?,
                "attendancePercentage": r.get::<_, f64>(7)?,
                "overallPerformance": r.get::<_, Option<String>>(8)?,
                "comments": r.get::<_, Option<String>>(9)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Students joined with their profile. `tail` works over alias `s`.
pub fn students<P: Params>(
    conn: &rusqlite::Connection,
    tail: &str,
    params: P,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT s.id, s.user_id, sp.full_name, sp.email, sp.phone, s.level, s.gender,
                s.date_of_birth, s.is_active, s.created_at
         FROM students s
         JOIN profiles sp ON sp.id = s.user_id
         {}",
        tail
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "userId": r.get::<_, String>(1)?,
                "fullName": r.get::<_, String>(2)?,
                "email": r.get::<_, String>(3)?,
                "phone": r.get::<_, Option<String>>(4)?,
                "level": r.get::<_, String>(5)?,
                "gender": r.get::<_, Option<String>>(6)?,
                "dateOfBirth": r.get::<_, Option<String>>(7)?,
                "isActive": r.get::<_, i64>(8)? != 0,
                "createdAt": r.get::<_, String>(9)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
