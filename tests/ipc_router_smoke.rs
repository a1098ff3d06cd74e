use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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

fn request_ok(
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string())
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn result_str(result: &serde_json::Value, key: &str) -> String {
    result
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, result))
        .to_string()
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoolhub-router-smoke");
    let bundle_out = workspace.join("smoke-backup.shbackup.zip");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // First run bootstraps the super admin, then signs in.
    let boot = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.bootstrap",
        json!({ "name": "Principal", "loginId": "root", "password": "first-login-1" }),
    );
    assert!(boot.get("adminId").is_some());
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "loginId": "root", "password": "first-login-1", "role": "admin" }),
    );
    let admin = result_str(&login, "sessionToken");
    assert_eq!(login["user"]["role"], "admin");
    assert_eq!(login["user"]["level"], 1);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        json!({ "sessionToken": admin, "name": "3-A" }),
    );
    let class_id = result_str(&created, "classId");
    let classes = request_ok(&mut stdin, &mut reader, "6", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|a| a.len()), Some(1));

    let subjects = request_ok(&mut stdin, &mut reader, "7", "subjects.list", json!({}));
    assert!(
        subjects["subjects"]
            .as_array()
            .map(|a| a.iter().any(|s| s["code"] == "MAT"))
            .unwrap_or(false),
        "default subjects seeded"
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "admin.addTeacher",
        json!({
            "sessionToken": admin,
            "name": "S. Verma",
            "loginId": "T001",
            "password": "teach-pass-1",
            "contact": "9000000001",
            "assignedClassId": class_id,
            "subjectCode": "MAT"
        }),
    );
    let _teacher_id = result_str(&teacher, "teacherId");
    let tlogin = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "loginId": "T001", "password": "teach-pass-1", "role": "teacher" }),
    );
    let teacher_tok = result_str(&tlogin, "sessionToken");
    assert_eq!(tlogin["user"]["assignedClassName"], "3-A");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "admin.addStudent",
        json!({
            "sessionToken": admin,
            "classId": class_id,
            "name": "Aarav Singh",
            "loginId": "STU01",
            "password": "stud-pass-1",
            "rollNo": 1,
            "fatherName": "R. Singh",
            "dob": "2016-05-02"
        }),
    );
    let student_id = result_str(&student, "studentId");
    let slogin = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "auth.login",
        json!({
            "loginId": "STU01",
            "password": "stud-pass-1",
            "role": "student",
            "classId": class_id
        }),
    );
    let student_tok = result_str(&slogin, "sessionToken");
    assert_eq!(slogin["user"]["className"], "3-A");

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "admin.stats",
        json!({ "sessionToken": admin }),
    );
    assert_eq!(stats["students"], 1);
    assert_eq!(stats["teachers"], 1);

    let nav = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "nav.model",
        json!({ "sessionToken": teacher_tok }),
    );
    assert!(nav["items"]
        .as_array()
        .map(|a| a.iter().any(|i| i["key"] == "attendance"))
        .unwrap_or(false));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.monthSummary",
        json!({ "sessionToken": teacher_tok, "year": 2025, "month": 8 }),
    );
    assert_eq!(summary["grid"]["daysInMonth"], 31);

    let exam = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "exams.create",
        json!({ "sessionToken": teacher_tok, "name": "Half Yearly", "maxMarksPerSubject": 50.0 }),
    );
    let exam_id = result_str(&exam, "examId");
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "marks.sheet",
        json!({ "sessionToken": teacher_tok, "examId": exam_id, "subjectCode": "MAT" }),
    );
    assert_eq!(sheet["students"].as_array().map(|a| a.len()), Some(1));
    let mut marks_map = serde_json::Map::new();
    marks_map.insert(student_id.clone(), json!(41));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "marks.saveBulk",
        json!({
            "sessionToken": teacher_tok,
            "examId": exam_id,
            "subjectCode": "MAT",
            "marks": marks_map
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "timetable.save",
        json!({
            "sessionToken": teacher_tok,
            "timetable": { "Monday": { "1": "MAT", "2": "ENG" } }
        }),
    );
    let tt = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "timetable.get",
        json!({ "sessionToken": teacher_tok }),
    );
    assert_eq!(tt["timetable"]["Monday"]["1"], "MAT");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "posts.create",
        json!({
            "sessionToken": teacher_tok,
            "date": "2025-08-04",
            "postType": "daily",
            "items": [
                { "itemType": "classwork", "heading": "Maths", "content": "Fractions" },
                { "itemType": "homework", "heading": "English", "content": "Essay" }
            ]
        }),
    );
    let work = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "work.feed",
        json!({ "sessionToken": student_tok }),
    );
    assert_eq!(work["posts"].as_array().map(|a| a.len()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "adminPosts.saveNotice",
        json!({
            "sessionToken": admin,
            "title": "PTM on Friday",
            "content": "Parent teacher meeting at 10am."
        }),
    );
    let gallery_saved = request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "gallery.save",
        json!({
            "sessionToken": admin,
            "type": "video",
            "category": "sports",
            "caption": "Sports day",
            "videoUrl": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        }),
    );
    assert_eq!(
        gallery_saved["videoUrl"],
        "https://www.youtube.com/embed/dQw4w9WgXcQ"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "24",
        "toppers.save",
        json!({
            "sessionToken": teacher_tok,
            "showToppers": true,
            "ranks": { "1": { "studentId": student_id, "percentage": "95" } }
        }),
    );
    let home = request_ok(
        &mut stdin,
        &mut reader,
        "25",
        "home.feed",
        json!({ "sessionToken": student_tok }),
    );
    assert_eq!(home["showToppers"], true);
    assert_eq!(home["toppers"][0]["studentName"], "Aarav Singh");
    assert_eq!(home["announcements"].as_array().map(|a| a.len()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "26",
        "suggestions.submit",
        json!({ "sessionToken": student_tok, "message": "More library periods please." }),
    );
    let inbox = request_ok(
        &mut stdin,
        &mut reader,
        "27",
        "admin.listSuggestions",
        json!({ "sessionToken": admin }),
    );
    assert_eq!(inbox["suggestions"].as_array().map(|a| a.len()), Some(1));

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "28",
        "reports.cardModel",
        json!({ "sessionToken": teacher_tok, "examId": exam_id, "studentId": student_id }),
    );
    assert_eq!(card["card"]["template"], "standard");

    let updates = request_ok(&mut stdin, &mut reader, "29", "updates.feed", json!({}));
    assert_eq!(updates["announcements"].as_array().map(|a| a.len()), Some(1));

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "30",
        "backup.exportWorkspaceBundle",
        json!({ "sessionToken": admin, "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], "schoolhub-workspace-v1");
    assert!(bundle_out.is_file());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "31",
        "auth.logout",
        json!({ "token": student_tok }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
