use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

// 2025-08-03 is a Sunday; 2025-08-04 a Monday.
const SUNDAY: &str = "2025-08-03";
const MONDAY: &str = "2025-08-04";
const TUESDAY: &str = "2025-08-05";

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolhubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn raw_request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = raw_request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = raw_request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

struct School {
    teacher: String,
    student_ids: Vec<String>,
}

fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    student_count: usize,
) -> School {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s2",
        "auth.bootstrap",
        json!({ "name": "Principal", "loginId": "root", "password": "first-login-1" }),
    );
    let login = request_ok(
        stdin,
        reader,
        "s3",
        "auth.login",
        json!({ "loginId": "root", "password": "first-login-1", "role": "admin" }),
    );
    let admin = login["sessionToken"].as_str().expect("admin token").to_string();
    let class = request_ok(
        stdin,
        reader,
        "s4",
        "classes.create",
        json!({ "sessionToken": admin, "name": "4-B" }),
    );
    let class_id = class["classId"].as_str().expect("classId").to_string();
    let _ = request_ok(
        stdin,
        reader,
        "s5",
        "admin.addTeacher",
        json!({
            "sessionToken": admin,
            "name": "S. Verma",
            "loginId": "T001",
            "password": "teach-pass-1",
            "assignedClassId": class_id
        }),
    );
    let tlogin = request_ok(
        stdin,
        reader,
        "s6",
        "auth.login",
        json!({ "loginId": "T001", "password": "teach-pass-1", "role": "teacher" }),
    );
    let teacher = tlogin["sessionToken"].as_str().expect("teacher token").to_string();

    let mut student_ids = Vec::new();
    for i in 0..student_count {
        let created = request_ok(
            stdin,
            reader,
            &format!("s7-{}", i),
            "admin.addStudent",
            json!({
                "sessionToken": admin,
                "classId": class_id,
                "name": format!("Student {}", i + 1),
                "loginId": format!("STU{:02}", i + 1),
                "password": "stud-pass-1",
                "rollNo": i + 1
            }),
        );
        student_ids.push(created["studentId"].as_str().expect("studentId").to_string());
    }
    School {
        teacher,
        student_ids,
    }
}

#[test]
fn taking_session_buffers_marks_and_submits_without_pending() {
    let workspace = temp_dir("schoolhub-att-take");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let school = seed_school(&mut stdin, &mut reader, &workspace, 3);

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sessionStart",
        json!({ "sessionToken": school.teacher, "date": MONDAY, "mode": "taking" }),
    );
    assert_eq!(started["total"], 3);
    assert_eq!(started["cursor"], 0);
    assert_eq!(started["current"]["rollNo"], 1);

    let after_first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.sessionMark",
        json!({ "sessionToken": school.teacher, "status": "present" }),
    );
    assert_eq!(after_first["current"]["rollNo"], 2);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sessionMark",
        json!({ "sessionToken": school.teacher, "status": "absent" }),
    );

    // Swipe back one card and change roll 2 to present.
    let undone = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.sessionUndo",
        json!({ "sessionToken": school.teacher }),
    );
    assert_eq!(undone["current"]["rollNo"], 2);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.sessionMark",
        json!({ "sessionToken": school.teacher, "status": "present" }),
    );

    // Roll 3 is never swiped; it must stay out of the submitted batch.
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.sessionSubmit",
        json!({ "sessionToken": school.teacher }),
    );
    assert_eq!(submitted["saved"], 2);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.rosterForDate",
        json!({ "sessionToken": school.teacher, "date": MONDAY }),
    );
    let students = roster["students"].as_array().expect("students");
    assert_eq!(students[0]["status"], "present");
    assert_eq!(students[1]["status"], "present");
    assert_eq!(students[2]["status"], "pending");

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.monthSummary",
        json!({ "sessionToken": school.teacher, "year": 2025, "month": 8 }),
    );
    assert_eq!(summary["days"][MONDAY]["status"], "taken");
    assert_eq!(summary["days"][MONDAY]["stats"]["present"], 2);
    assert_eq!(summary["days"][MONDAY]["stats"]["absent"], 0);

    // The wizard is gone after submit.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.sessionState",
        json!({ "sessionToken": school.teacher }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sundays_are_never_writable() {
    let workspace = temp_dir("schoolhub-att-sunday");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let school = seed_school(&mut stdin, &mut reader, &workspace, 1);

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sessionStart",
        json!({ "sessionToken": school.teacher, "date": SUNDAY, "mode": "taking" }),
    );
    assert_eq!(code, "invalid_date");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.saveBatch",
        json!({
            "sessionToken": school.teacher,
            "date": SUNDAY,
            "records": [{ "studentId": school.student_ids[0], "status": "present" }]
        }),
    );
    assert_eq!(code, "invalid_date");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.updateStudentDay",
        json!({
            "sessionToken": school.teacher,
            "studentId": school.student_ids[0],
            "date": SUNDAY,
            "status": "absent"
        }),
    );
    assert_eq!(code, "invalid_date");

    // The calendar model still renders the day, flagged.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.monthSummary",
        json!({ "sessionToken": school.teacher, "year": 2025, "month": 8 }),
    );
    let cells = summary["grid"]["cells"].as_array().expect("cells");
    let sunday_cell = cells.iter().find(|c| c["date"] == SUNDAY).expect("aug 3");
    assert_eq!(sunday_cell["isSunday"], true);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn holiday_overrides_taken_attendance_and_blocks_edits() {
    let workspace = temp_dir("schoolhub-att-holiday");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let school = seed_school(&mut stdin, &mut reader, &workspace, 2);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.saveBatch",
        json!({
            "sessionToken": school.teacher,
            "date": MONDAY,
            "records": [
                { "studentId": school.student_ids[0], "status": "present" },
                { "studentId": school.student_ids[1], "status": "absent" }
            ]
        }),
    );

    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.markHoliday",
        json!({ "sessionToken": school.teacher, "date": MONDAY }),
    );
    assert_eq!(marked["status"], "holiday");

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.monthSummary",
        json!({ "sessionToken": school.teacher, "year": 2025, "month": 8 }),
    );
    assert_eq!(summary["days"][MONDAY]["status"], "holiday");

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.rosterForDate",
        json!({ "sessionToken": school.teacher, "date": MONDAY }),
    );
    for student in roster["students"].as_array().expect("students") {
        assert_eq!(student["status"], "holiday");
    }

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.updateStudentDay",
        json!({
            "sessionToken": school.teacher,
            "studentId": school.student_ids[0],
            "date": MONDAY,
            "status": "present"
        }),
    );
    assert_eq!(code, "conflict");

    // A normal day still accepts the single-day edit and shows up in the
    // per-student month drill-down.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.updateStudentDay",
        json!({
            "sessionToken": school.teacher,
            "studentId": school.student_ids[0],
            "date": TUESDAY,
            "status": "present"
        }),
    );
    let logs = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.studentMonthLogs",
        json!({
            "sessionToken": school.teacher,
            "studentId": school.student_ids[0],
            "year": 2025,
            "month": 8
        }),
    );
    let entries = logs["logs"].as_array().expect("logs");
    let monday = entries.iter().find(|l| l["date"] == MONDAY).expect("monday");
    assert_eq!(monday["status"], "holiday");
    let tuesday = entries.iter().find(|l| l["date"] == TUESDAY).expect("tuesday");
    assert_eq!(tuesday["status"], "present");
    // Holidays never count toward the working-day denominator.
    assert_eq!(logs["stats"]["present"], 1);
    assert_eq!(logs["stats"]["totalWorking"], 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn edit_mode_reviews_saved_marks_and_resubmits() {
    let workspace = temp_dir("schoolhub-att-edit");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let school = seed_school(&mut stdin, &mut reader, &workspace, 2);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.saveBatch",
        json!({
            "sessionToken": school.teacher,
            "date": MONDAY,
            "records": [
                { "studentId": school.student_ids[0], "status": "absent" },
                { "studentId": school.student_ids[1], "status": "absent" }
            ]
        }),
    );

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.sessionStart",
        json!({ "sessionToken": school.teacher, "date": MONDAY, "mode": "edit" }),
    );
    // Edit mode shows the saved marks and starts from the top.
    assert_eq!(started["cursor"], 0);
    assert_eq!(started["students"][0]["status"], "absent");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sessionSet",
        json!({
            "sessionToken": school.teacher,
            "studentId": school.student_ids[0],
            "status": "present"
        }),
    );
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.sessionSubmit",
        json!({ "sessionToken": school.teacher }),
    );
    assert_eq!(submitted["saved"], 2);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.rosterForDate",
        json!({ "sessionToken": school.teacher, "date": MONDAY }),
    );
    let students = roster["students"].as_array().expect("students");
    assert_eq!(students[0]["status"], "present");
    assert_eq!(students[1]["status"], "absent");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
