mod test_support;

use serde_json::json;
use test_support::{open_workspace, seed_school, Sidecar};

fn teacher<'a>(view: &'a serde_json::Value, teacher_id: &str) -> &'a serde_json::Value {
    view["teachers"]
        .as_array()
        .and_then(|arr| arr.iter().find(|t| t["id"] == teacher_id))
        .expect("teacher row")
}

#[test]
fn active_flag_can_be_set_and_toggled() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-admin-teachers-active");
    let school = seed_school(&mut sc);

    let listed = sc.ok("admin.teachers.list", json!({}));
    assert_eq!(teacher(&listed, &school.teacher_id)["isActive"], true);

    let off = sc.ok(
        "admin.teachers.setActive",
        json!({ "teacherId": school.teacher_id, "active": false }),
    );
    assert_eq!(teacher(&off, &school.teacher_id)["isActive"], false);

    let toggled = sc.ok(
        "admin.teachers.setActive",
        json!({ "teacherId": school.teacher_id }),
    );
    assert_eq!(teacher(&toggled, &school.teacher_id)["isActive"], true);

    let listed = sc.ok("admin.teachers.list", json!({}));
    assert_eq!(teacher(&listed, &school.teacher_id)["isActive"], true);
}

#[test]
fn profile_update_only_touches_given_fields() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-admin-teachers-update");
    let school = seed_school(&mut sc);

    let updated = sc.ok(
        "admin.teachers.update",
        json!({ "teacherId": school.teacher_id, "hourlyRate": 25, "experienceYears": 4 }),
    );
    let row = teacher(&updated, &school.teacher_id);
    assert_eq!(row["hourlyRate"], 25.0);
    assert_eq!(row["experienceYears"], 4);

    let updated = sc.ok(
        "admin.teachers.update",
        json!({ "teacherId": school.teacher_id, "qualification": "Ijazah in Hafs" }),
    );
    let row = teacher(&updated, &school.teacher_id);
    assert_eq!(row["qualification"], "Ijazah in Hafs");
    assert_eq!(row["hourlyRate"], 25.0);
    assert_eq!(row["experienceYears"], 4);

    let e = sc.fail(
        "admin.teachers.update",
        json!({ "teacherId": school.teacher_id, "hourlyRate": "NaN" }),
    );
    assert_eq!(e["code"], "bad_params");
}

#[test]
fn unknown_teacher_is_not_found() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-admin-teachers-missing");
    seed_school(&mut sc);

    let e = sc.fail(
        "admin.teachers.setActive",
        json!({ "teacherId": "missing", "active": true }),
    );
    assert_eq!(e["code"], "not_found");
    let e = sc.fail(
        "admin.teachers.update",
        json!({ "teacherId": "missing", "hourlyRate": 30 }),
    );
    assert_eq!(e["code"], "not_found");
}
