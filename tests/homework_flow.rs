mod test_support;

use serde_json::json;
use test_support::{open_workspace, seed_school, sign_in, sign_out, Sidecar};

#[test]
fn homework_moves_from_pending_to_graded() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-homework-flow");
    let school = seed_school(&mut sc);
    sign_out(&mut sc);

    sign_in(&mut sc, &school.teacher_email);
    let created = sc.ok(
        "teacher.homework.create",
        json!({
            "classId": school.class_id,
            "title": "Memorise Surah Al-Mulk 1-10",
            "dueDate": "2099-01-01",
            "maxScore": 20
        }),
    );
    let homework_id = created["homeworkId"].as_str().expect("homeworkId").to_string();
    assert_eq!(created["homework"][0]["submissionCount"], 0);
    // Past-due work with no submission still counts as pending.
    sc.ok(
        "teacher.homework.create",
        json!({ "classId": school.class_id, "title": "Revise Juz Amma", "dueDate": "2001-01-01" }),
    );
    sign_out(&mut sc);

    sign_in(&mut sc, &school.student_email);
    let list = sc.ok("student.homework.list", json!({}));
    assert_eq!(list["pending"].as_array().map(Vec::len), Some(2));
    assert_eq!(list["homework"][0]["title"], "Revise Juz Amma");

    let submitted = sc.ok(
        "student.homework.submit",
        json!({ "homeworkId": homework_id, "submissionText": "Recited to my mother" }),
    );
    assert_eq!(submitted["submitted"], json!([homework_id.as_str()]));
    assert_eq!(submitted["submissions"][homework_id.as_str()]["status"], "pending");
    let dash = sc.ok("student.dashboard", json!({}));
    assert_eq!(dash["stats"]["pendingHomework"], 1);
    sign_out(&mut sc);

    sign_in(&mut sc, &school.teacher_email);
    let dash = sc.ok("teacher.dashboard", json!({}));
    assert_eq!(dash["stats"]["pendingSubmissions"], 1);
    assert_eq!(dash["stats"]["totalStudents"], 1);

    let subs = sc.ok("teacher.homework.submissions", json!({ "homeworkId": homework_id }));
    let submission_id = subs["submissions"][0]["id"].as_str().expect("submission").to_string();
    let e = sc.fail(
        "teacher.homework.grade",
        json!({ "submissionId": submission_id, "score": 25 }),
    );
    assert_eq!(e["code"], "bad_params");
    let graded = sc.ok(
        "teacher.homework.grade",
        json!({ "submissionId": submission_id, "score": 18, "feedback": "Beautiful tajweed" }),
    );
    assert_eq!(graded["submissions"][0]["status"], "graded");
    sign_out(&mut sc);

    sign_in(&mut sc, &school.student_email);
    let list = sc.ok("student.homework.list", json!({}));
    let sub = &list["submissions"][homework_id.as_str()];
    assert_eq!(sub["score"], 18.0);
    assert_eq!(sub["feedback"], "Beautiful tajweed");
}

#[test]
fn lessons_and_reports_reach_the_student() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-homework-lessons");
    let school = seed_school(&mut sc);
    sign_out(&mut sc);

    sign_in(&mut sc, &school.teacher_email);
    sc.ok(
        "teacher.lessons.add",
        json!({
            "classId": school.class_id,
            "title": "Rules of Noon Sakinah",
            "videoUrl": "https://video.example/noon",
            "recordedDate": "2024-03-01",
            "durationMinutes": 45
        }),
    );
    let report = sc.ok(
        "teacher.progress.create",
        json!({
            "studentId": school.student_id,
            "quranMemorization": 72.5,
            "tajweedScore": 80,
            "overallPerformance": "Good",
            "reportDate": "2024-03-31"
        }),
    );
    // No attendance recorded yet.
    assert_eq!(report["reports"][0]["attendancePercentage"], 0.0);
    sign_out(&mut sc);

    sign_in(&mut sc, &school.student_email);
    let classes = sc.ok("student.classes.list", json!({}));
    assert_eq!(classes["classes"][0]["className"], "Hifz Evening");
    assert_eq!(classes["classes"][0]["teacher"]["fullName"], "Ustadh Ali");
    assert_eq!(
        classes["classes"][0]["recordedLessons"][0]["title"],
        "Rules of Noon Sakinah"
    );

    let progress = sc.ok("student.progress", json!({}));
    assert_eq!(progress["reports"][0]["teacherName"], "Ustadh Ali");
    assert_eq!(progress["chart"][0]["memorization"], 72.5);
}
