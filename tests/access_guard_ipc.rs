mod test_support;

use serde_json::json;
use test_support::{open_workspace, register_parent, sign_in, Sidecar};

#[test]
fn gated_methods_wait_for_the_session_check() {
    let mut sc = Sidecar::spawn();
    let e = sc.fail("student.dashboard", json!({}));
    assert_eq!(e["code"], "session_loading");

    let nav = sc.ok("nav.resolve", json!({ "path": "/student/homework" }));
    assert_eq!(nav["outcome"], "placeholder");
}

#[test]
fn anonymous_callers_are_sent_to_login() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-guard-anon");

    for method in ["admin.dashboard", "teacher.dashboard", "student.progress", "parent.fees"] {
        let e = sc.fail(method, json!({}));
        assert_eq!(e["code"], "unauthenticated", "{}", method);
        assert_eq!(e["details"]["redirect"], "/login", "{}", method);
    }
    let nav = sc.ok("nav.resolve", json!({ "path": "/" }));
    assert_eq!(nav, json!({ "outcome": "redirect", "to": "/login" }));
}

#[test]
fn a_parent_only_reaches_parent_views() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-guard-parent");
    register_parent(&mut sc, "Khadija", "khadija@quranlms.test");
    sign_in(&mut sc, "khadija@quranlms.test");

    for method in ["admin.fees.list", "teacher.attendance.open", "student.homework.list"] {
        let e = sc.fail(method, json!({}));
        assert_eq!(e["code"], "unauthorized", "{}", method);
        assert_eq!(e["details"]["redirect"], "/unauthorized", "{}", method);
    }

    let dash = sc.ok("parent.dashboard", json!({}));
    assert_eq!(dash["stats"]["totalChildren"], 0);

    let items = sc.ok("nav.items", json!({}));
    let paths: Vec<_> = items["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|i| i["path"].as_str())
        .collect();
    assert_eq!(
        paths,
        vec!["/parent", "/parent/children", "/parent/fees", "/parent/progress"]
    );

    let nav = sc.ok("nav.resolve", json!({ "path": "/admin/teachers" }));
    assert_eq!(nav, json!({ "outcome": "redirect", "to": "/unauthorized" }));
    let nav = sc.ok("nav.resolve", json!({ "path": "/parent/fees/" }));
    assert_eq!(nav, json!({ "outcome": "render", "path": "/parent/fees" }));
    let nav = sc.ok("nav.resolve", json!({ "path": "/nowhere" }));
    assert_eq!(nav["outcome"], "not_found");
}

#[test]
fn unknown_methods_are_not_implemented() {
    let mut sc = Sidecar::spawn();
    open_workspace(&mut sc, "quranlms-guard-unknown");
    let e = sc.fail("library.checkout", json!({}));
    assert_eq!(e["code"], "not_implemented");
}
