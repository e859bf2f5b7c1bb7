use crate::calc;
use crate::db::{now_stamp, today};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    attendance_rows, count, exists, floats, get_optional_bool, get_optional_date,
    get_optional_f64, get_optional_i64, get_optional_str, get_required_date, get_required_f64,
    get_required_str, parse_specialization, run_view, strings, View, ViewFn,
};
use crate::ipc::rows;
use crate::ipc::types::{AppState, Request};
use crate::model::{EnrollmentStatus, FeeStatus, Level};
use rusqlite::params;
use serde_json::json;
use uuid::Uuid;

const RECENT_LIMIT: i64 = 5;

fn dashboard(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = v.conn;
    let total_students = count(conn, "SELECT COUNT(*) FROM students", [])?;
    let active_students = count(conn, "SELECT COUNT(*) FROM students WHERE is_active = 1", [])?;
    let total_teachers = count(conn, "SELECT COUNT(*) FROM teachers", [])?;
    let active_classes = count(conn, "SELECT COUNT(*) FROM classes WHERE is_active = 1", [])?;
    let total_revenue = calc::sum_amounts(floats(conn, "SELECT amount FROM payments", [])?);
    let pending_fees = calc::sum_amounts(floats(
        conn,
        "SELECT amount FROM fee_records WHERE status = 'pending'",
        [],
    )?);
    let levels = strings(conn, "SELECT level FROM students", [])?;
    let level_distribution =
        calc::level_distribution(levels.iter().filter_map(|l| Level::parse(l)));

    let mut stmt = conn.prepare(
        "SELECT e.id, e.enrollment_date, e.status, sp.full_name, c.class_name
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         JOIN profiles sp ON sp.id = s.user_id
         JOIN classes c ON c.id = e.class_id
         ORDER BY e.created_at DESC, e.rowid DESC
         LIMIT ?",
    )?;
    let recent_enrollments = stmt
        .query_map([RECENT_LIMIT], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "enrollmentDate": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
                "studentName": r.get::<_, String>(3)?,
                "className": r.get::<_, String>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let upcoming_classes = rows::classes(
        conn,
        "WHERE c.is_active = 1 ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?",
        [RECENT_LIMIT],
    )?;

    Ok(json!({
        "stats": {
            "totalStudents": total_students,
            "activeStudents": active_students,
            "totalTeachers": total_teachers,
            "activeClasses": active_classes,
            "totalRevenue": total_revenue,
            "pendingFees": pending_fees,
        },
        "levelDistribution": level_distribution,
        "recentEnrollments": recent_enrollments,
        "upcomingClasses": upcoming_classes,
    }))
}

fn list_teachers(conn: &rusqlite::Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, tp.full_name, tp.email, tp.phone, t.qualification,
                t.specialization, t.experience_years, t.hourly_rate, t.is_active, t.created_at,
                (SELECT COUNT(*) FROM classes c WHERE c.teacher_id = t.id AND c.is_active = 1)
         FROM teachers t
         JOIN profiles tp ON tp.id = t.user_id
         ORDER BY t.created_at DESC, t.rowid DESC",
    )?;
    let teachers = stmt
        .query_map([], |r| {
            let specialization: String = r.get(6)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "userId": r.get::<_, String>(1)?,
                "fullName": r.get::<_, String>(2)?,
                "email": r.get::<_, String>(3)?,
                "phone": r.get::<_, Option<String>>(4)?,
                "qualification": r.get::<_, Option<String>>(5)?,
                "specialization": parse_specialization(&specialization),
                "experienceYears": r.get::<_, i64>(7)?,
                "hourlyRate": r.get::<_, f64>(8)?,
                "isActive": r.get::<_, i64>(9)? != 0,
                "createdAt": r.get::<_, String>(10)?,
                "activeClasses": r.get::<_, i64>(11)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(teachers)
}

fn teachers(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "teachers": list_teachers(v.conn)? }))
}

/// Sets `is_active` when `active` is given, flips it otherwise.
fn set_teacher_active(
    v: &View,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let changed = match get_optional_bool(params, "active")? {
        Some(active) => v.conn.execute(
            "UPDATE teachers SET is_active = ? WHERE id = ?",
            params![active as i64, teacher_id],
        ),
        None => v.conn.execute(
            "UPDATE teachers SET is_active = 1 - is_active WHERE id = ?",
            [&teacher_id],
        ),
    }
    .map_err(HandlerErr::write_failed("db_update_failed", "teachers"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    tracing::info!(teacher = %teacher_id, "teacher active flag changed");
    Ok(json!({ "teachers": list_teachers(v.conn)? }))
}

fn update_teacher(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    if !exists(v.conn, "SELECT 1 FROM teachers WHERE id = ?", [&teacher_id])? {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    let experience = get_optional_i64(params, "experienceYears")?;
    if matches!(experience, Some(n) if n < 0) {
        return Err(HandlerErr::bad_params("experienceYears must not be negative"));
    }
    let rate = get_optional_f64(params, "hourlyRate")?;
    if matches!(rate, Some(r) if r < 0.0) {
        return Err(HandlerErr::bad_params("hourlyRate must not be negative"));
    }
    let qualification = get_optional_str(params, "qualification");

    v.conn
        .execute(
            "UPDATE teachers SET
                experience_years = COALESCE(?, experience_years),
                hourly_rate = COALESCE(?, hourly_rate),
                qualification = COALESCE(?, qualification)
             WHERE id = ?",
            params![experience, rate, qualification, teacher_id],
        )
        .map_err(HandlerErr::write_failed("db_update_failed", "teachers"))?;
    Ok(json!({ "teachers": list_teachers(v.conn)? }))
}

fn students(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let search = get_optional_str(params, "search").map(|s| s.to_lowercase());
    let level = match get_optional_str(params, "level") {
        Some(raw) => Some(
            Level::parse(&raw)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown level: {}", raw)))?,
        ),
        None => None,
    };

    let all = rows::students(v.conn, "ORDER BY s.created_at DESC, s.rowid DESC", [])?;
    let keep = |s: &serde_json::Value| {
        let field = |k: &str| s[k].as_str().unwrap_or("").to_lowercase();
        let hit_search = search
            .as_deref()
            .map_or(true, |q| field("fullName").contains(q) || field("email").contains(q));
        let hit_level = level.map_or(true, |l| s["level"].as_str() == Some(l.as_str()));
        hit_search && hit_level
    };
    let students: Vec<_> = all.into_iter().filter(|s| keep(s)).collect();
    Ok(json!({ "students": students }))
}

fn class_view(conn: &rusqlite::Connection) -> Result<serde_json::Value, HandlerErr> {
    let classes = rows::classes(conn, "ORDER BY c.created_at DESC, c.rowid DESC", [])?;

    let mut stmt = conn.prepare(
        "SELECT t.id, tp.full_name FROM teachers t
         JOIN profiles tp ON tp.id = t.user_id
         WHERE t.is_active = 1
         ORDER BY tp.full_name",
    )?;
    let teacher_options = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "fullName": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, name, level, description FROM courses ORDER BY name, rowid",
    )?;
    let courses = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "level": r.get::<_, String>(2)?,
                "description": r.get::<_, Option<String>>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "classes": classes,
        "teachers": teacher_options,
        "courses": courses,
    }))
}

fn classes(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    class_view(v.conn)
}

fn positive_or(params: &serde_json::Value, key: &str, default: i64) -> Result<i64, HandlerErr> {
    match get_optional_i64(params, key)? {
        Some(n) if n <= 0 => Err(HandlerErr::bad_params(format!("{} must be positive", key))),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

fn create_class(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let course_id = get_optional_str(params, "courseId");
    let teacher_id = get_optional_str(params, "teacherId");
    if let Some(id) = &course_id {
        if !exists(v.conn, "SELECT 1 FROM courses WHERE id = ?", [id])? {
            return Err(HandlerErr::not_found("course not found"));
        }
    }
    if let Some(id) = &teacher_id {
        if !exists(v.conn, "SELECT 1 FROM teachers WHERE id = ?", [id])? {
            return Err(HandlerErr::not_found("teacher not found"));
        }
    }
    let duration = positive_or(params, "durationMinutes", 60)?;
    let max_students = positive_or(params, "maxStudents", 10)?;

    let class_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO classes(
                id, course_id, teacher_id, class_name, schedule_day, schedule_time,
                duration_minutes, max_students, meeting_link, is_active, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
            params![
                class_id,
                course_id,
                teacher_id,
                class_name,
                get_optional_str(params, "scheduleDay"),
                get_optional_str(params, "scheduleTime"),
                duration,
                max_students,
                get_optional_str(params, "meetingLink"),
                now_stamp(),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "classes"))?;
    tracing::info!(class = %class_id, "class created");

    let mut view = class_view(v.conn)?;
    view["classId"] = json!(class_id);
    Ok(view)
}

fn create_course(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let raw_level = get_required_str(params, "level")?;
    let level = Level::parse(&raw_level)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown level: {}", raw_level)))?;
    let course_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO courses(id, name, level, description, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                course_id,
                name,
                level.as_str(),
                get_optional_str(params, "description"),
                now_stamp(),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "courses"))?;

    let mut view = class_view(v.conn)?;
    view["courseId"] = json!(course_id);
    Ok(view)
}

/// Enrolling an already enrolled student reactivates the existing row.
fn create_enrollment(
    v: &View,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    if !exists(v.conn, "SELECT 1 FROM students WHERE id = ?", [&student_id])? {
        return Err(HandlerErr::not_found("student not found"));
    }
    if !exists(v.conn, "SELECT 1 FROM classes WHERE id = ?", [&class_id])? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let date = get_optional_date(params, "enrollmentDate")?.unwrap_or_else(today);

    v.conn
        .execute(
            "INSERT INTO enrollments(id, student_id, class_id, status, enrollment_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, class_id) DO UPDATE SET
                status = excluded.status,
                enrollment_date = excluded.enrollment_date",
            params![
                Uuid::new_v4().to_string(),
                student_id,
                class_id,
                EnrollmentStatus::Active.as_str(),
                date,
                now_stamp(),
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "enrollments"))?;
    let enrollment_id: String = v.conn.query_row(
        "SELECT id FROM enrollments WHERE student_id = ? AND class_id = ?",
        [&student_id, &class_id],
        |r| r.get(0),
    )?;
    tracing::info!(student = %student_id, class = %class_id, "student enrolled");

    let class = rows::classes(v.conn, "WHERE c.id = ?", [&class_id])?;
    Ok(json!({
        "enrollmentId": enrollment_id,
        "class": class.into_iter().next(),
    }))
}

fn link_parent(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = get_required_str(params, "parentId")?;
    let student_id = get_required_str(params, "studentId")?;
    if !exists(
        v.conn,
        "SELECT 1 FROM profiles WHERE id = ? AND role = 'parent'",
        [&parent_id],
    )? {
        return Err(HandlerErr::not_found("parent not found"));
    }
    if !exists(v.conn, "SELECT 1 FROM students WHERE id = ?", [&student_id])? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let inserted = v
        .conn
        .execute(
            "INSERT INTO parent_student_relation(parent_id, student_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(parent_id, student_id) DO NOTHING",
            params![parent_id, student_id, now_stamp()],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "parent_student_relation"))?;
    Ok(json!({ "linked": inserted == 1 }))
}

fn fee_view(conn: &rusqlite::Connection) -> Result<serde_json::Value, HandlerErr> {
    let fee_records = rows::fee_records(conn, "ORDER BY f.due_date ASC, f.rowid ASC", [])?;
    let payments = rows::payments(conn, "ORDER BY p.payment_date DESC, p.rowid DESC", [])?;
    let students = rows::students(
        conn,
        "WHERE s.is_active = 1 ORDER BY sp.full_name, s.rowid",
        [],
    )?;
    Ok(json!({
        "feeRecords": fee_records,
        "payments": payments,
        "students": students,
    }))
}

fn fees(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    fee_view(v.conn)
}

fn create_fee(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !exists(v.conn, "SELECT 1 FROM students WHERE id = ?", [&student_id])? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let amount = get_required_f64(params, "amount")?;
    if amount <= 0.0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let due_date = get_required_date(params, "dueDate")?;
    let frequency = get_optional_str(params, "frequency").unwrap_or_else(|| "monthly".to_string());
    let status = match get_optional_str(params, "status") {
        Some(raw) => FeeStatus::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown fee status: {}", raw)))?,
        None => FeeStatus::Pending,
    };

    let fee_id = Uuid::new_v4().to_string();
    v.conn
        .execute(
            "INSERT INTO fee_records(id, student_id, amount, frequency, due_date, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                fee_id,
                student_id,
                amount,
                frequency,
                due_date,
                status.as_str(),
                now_stamp()
            ],
        )
        .map_err(HandlerErr::write_failed("db_insert_failed", "fee_records"))?;

    let mut view = fee_view(v.conn)?;
    view["feeRecordId"] = json!(fee_id);
    Ok(view)
}

/// Inserts the payment and, when it settles a fee record, marks that record
/// paid. Both writes commit together or not at all.
fn record_payment(v: &View, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let amount = get_required_f64(params, "amount")?;
    if amount <= 0.0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let fee_record_id = get_optional_str(params, "feeRecordId");
    let method = get_optional_str(params, "paymentMethod").unwrap_or_else(|| "cash".to_string());
    let payment_date = get_optional_date(params, "paymentDate")?.unwrap_or_else(today);

    if !exists(v.conn, "SELECT 1 FROM students WHERE id = ?", [&student_id])? {
        return Err(HandlerErr::not_found("student not found"));
    }
    if let Some(fee_id) = &fee_record_id {
        if !exists(
            v.conn,
            "SELECT 1 FROM fee_records WHERE id = ? AND student_id = ?",
            [fee_id, &student_id],
        )? {
            return Err(HandlerErr::not_found("fee record not found for student"));
        }
    }

    let tx = v
        .conn
        .unchecked_transaction()
        .map_err(HandlerErr::write_failed("db_tx_failed", "payments"))?;
    let payment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO payments(
            id, student_id, fee_record_id, amount, payment_method, transaction_id, notes, payment_date
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            payment_id,
            student_id,
            fee_record_id,
            amount,
            method,
            get_optional_str(params, "transactionId"),
            get_optional_str(params, "notes"),
            payment_date,
        ],
    )
    .map_err(HandlerErr::write_failed("db_insert_failed", "payments"))?;

    let mut writes = 1;
    if let Some(fee_id) = &fee_record_id {
        tx.execute(
            "UPDATE fee_records SET status = ? WHERE id = ?",
            params![FeeStatus::Paid.as_str(), fee_id],
        )
        .map_err(HandlerErr::write_failed("db_update_failed", "fee_records"))?;
        writes += 1;
    }
    tx.commit()
        .map_err(HandlerErr::write_failed("db_tx_failed", "payments"))?;
    tracing::info!(payment = %payment_id, writes, "payment recorded");

    let mut view = fee_view(v.conn)?;
    view["paymentId"] = json!(payment_id);
    view["writes"] = json!(writes);
    view["feeRecordUpdated"] = json!(fee_record_id.is_some());
    Ok(view)
}

fn reports(v: &View, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = v.conn;
    let attendance = attendance_rows(conn, "SELECT date, status FROM attendance", [])?;
    let attendance_by_month =
        calc::attendance_by_month(attendance.iter().map(|(d, s)| (d.as_str(), *s)));

    let mut stmt = conn.prepare("SELECT enrollment_date, status FROM enrollments")?;
    let enrollments = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let enrollments: Vec<(String, EnrollmentStatus)> = enrollments
        .into_iter()
        .filter_map(|(d, s)| EnrollmentStatus::parse(&s).map(|s| (d, s)))
        .collect();
    let enrollments_by_month =
        calc::enrollments_by_month(enrollments.iter().map(|(d, s)| (d.as_str(), *s)));

    let mut stmt = conn.prepare(
        "SELECT quran_memorization, tajweed_score, attendance_percentage FROM progress_reports",
    )?;
    let reports = stmt
        .query_map([], |r| Ok((r.get::<_, f64>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let averages = calc::performance_averages(reports.iter().copied());

    Ok(json!({
        "attendanceByMonth": attendance_by_month,
        "enrollmentsByMonth": enrollments_by_month,
        "performance": averages,
        "reportCount": reports.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: ViewFn = match req.method.as_str() {
        "admin.dashboard" => dashboard,
        "admin.teachers.list" => teachers,
        "admin.teachers.setActive" => set_teacher_active,
        "admin.teachers.update" => update_teacher,
        "admin.students.list" => students,
        "admin.classes.list" => classes,
        "admin.classes.create" => create_class,
        "admin.courses.create" => create_course,
        "admin.enrollments.create" => create_enrollment,
        "admin.parents.link" => link_parent,
        "admin.fees.list" => fees,
        "admin.fees.create" => create_fee,
        "admin.fees.recordPayment" => record_payment,
        "admin.reports" => reports,
        _ => return None,
    };
    Some(run_view(state, req, f))
}
