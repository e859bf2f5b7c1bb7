#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN_EMAIL: &str = "admin@quranlms.test";
pub const PASSWORD: &str = "bismillah1";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running `quranlmsd` speaking JSON lines over its stdio.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_quranlmsd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn quranlmsd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Sends one request and returns the whole response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_default()
    }

    /// Expects an error response and returns its `error` object.
    pub fn fail(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or_default()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn open_workspace(sc: &mut Sidecar, prefix: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    workspace
}

pub fn bootstrap_admin(sc: &mut Sidecar) {
    sc.ok(
        "setup.bootstrapAdmin",
        json!({ "email": ADMIN_EMAIL, "password": PASSWORD, "fullName": "Head Office" }),
    );
}

pub fn sign_in(sc: &mut Sidecar, email: &str) -> serde_json::Value {
    sc.ok("auth.signIn", json!({ "email": email, "password": PASSWORD }))
}

pub fn sign_out(sc: &mut Sidecar) {
    sc.ok("auth.signOut", json!({}));
}

fn sign_up(sc: &mut Sidecar, mut form: serde_json::Value) -> String {
    form["password"] = json!(PASSWORD);
    form["confirmPassword"] = json!(PASSWORD);
    let signed = sc.ok("auth.signUp", form);
    let id = signed["identity"]["id"].as_str().expect("identity id").to_string();
    sign_out(sc);
    id
}

/// Registers a student and leaves the session signed out. Returns the
/// identity id.
pub fn register_student(sc: &mut Sidecar, name: &str, email: &str) -> String {
    sign_up(
        sc,
        json!({
            "role": "student",
            "fullName": name,
            "email": email,
            "dateOfBirth": "2012-05-04",
            "gender": "female",
            "level": "Hifz"
        }),
    )
}

pub fn register_teacher(sc: &mut Sidecar, name: &str, email: &str) -> String {
    sign_up(
        sc,
        json!({
            "role": "teacher",
            "fullName": name,
            "email": email,
            "qualification": "Ijazah in Hafs",
            "specialization": ["Hifz", "Tajweed"]
        }),
    )
}

pub fn register_parent(sc: &mut Sidecar, name: &str, email: &str) -> String {
    sign_up(
        sc,
        json!({ "role": "parent", "fullName": name, "email": email }),
    )
}

/// Picks `id` out of `rows` where `field == value`.
pub fn id_where(rows: &serde_json::Value, field: &str, value: &str) -> String {
    rows.as_array()
        .and_then(|arr| arr.iter().find(|r| r[field].as_str() == Some(value)))
        .and_then(|r| r["id"].as_str())
        .unwrap_or_else(|| panic!("no row with {} = {} in {}", field, value, rows))
        .to_string()
}

/// Admin-side setup shared by the portal tests: one teacher running one
/// class with one enrolled student. Leaves the admin signed in.
pub struct School {
    pub teacher_email: String,
    pub student_email: String,
    pub teacher_id: String,
    pub student_id: String,
    pub class_id: String,
}

pub fn seed_school(sc: &mut Sidecar) -> School {
    bootstrap_admin(sc);
    let teacher_email = "ali@quranlms.test".to_string();
    let student_email = "amina@quranlms.test".to_string();
    register_teacher(sc, "Ustadh Ali", &teacher_email);
    register_student(sc, "Amina", &student_email);

    sign_in(sc, ADMIN_EMAIL);
    let teachers = sc.ok("admin.teachers.list", json!({}));
    let teacher_id = id_where(&teachers["teachers"], "email", &teacher_email);
    let students = sc.ok("admin.students.list", json!({}));
    let student_id = id_where(&students["students"], "email", &student_email);

    let course = sc.ok(
        "admin.courses.create",
        json!({ "name": "Hifz Programme", "level": "Hifz" }),
    );
    let course_id = course["courseId"].as_str().expect("courseId").to_string();
    let class = sc.ok(
        "admin.classes.create",
        json!({
            "className": "Hifz Evening",
            "courseId": course_id,
            "teacherId": teacher_id,
            "scheduleDay": "Monday",
            "scheduleTime": "18:00"
        }),
    );
    let class_id = class["classId"].as_str().expect("classId").to_string();
    sc.ok(
        "admin.enrollments.create",
        json!({ "studentId": student_id, "classId": class_id }),
    );

    School {
        teacher_email,
        student_email,
        teacher_id,
        student_id,
        class_id,
    }
}
