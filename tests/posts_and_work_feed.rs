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

#[test]
fn daily_posts_reach_the_class_feed_with_defaulters_resolved() {
    let workspace = temp_dir("schoolhub-posts");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.bootstrap",
        json!({ "name": "Principal", "loginId": "root", "password": "first-login-1" }),
    );
    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "loginId": "root", "password": "first-login-1", "role": "admin" }),
    )["sessionToken"]
        .as_str()
        .expect("admin")
        .to_string();
    let class_id = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "sessionToken": admin, "name": "5-A" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    // A class teacher and a subject teacher (no assigned class).
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "admin.addTeacher",
        json!({
            "sessionToken": admin,
            "name": "S. Verma",
            "loginId": "T001",
            "password": "teach-pass-1",
            "assignedClassId": class_id
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "admin.addTeacher",
        json!({
            "sessionToken": admin,
            "name": "R. Gupta",
            "loginId": "T002",
            "password": "teach-pass-2",
            "subjectCode": "ENG"
        }),
    );
    let class_teacher = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "loginId": "T001", "password": "teach-pass-1", "role": "teacher" }),
    )["sessionToken"]
        .as_str()
        .expect("class teacher")
        .to_string();
    let subject_teacher = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "auth.login",
        json!({ "loginId": "T002", "password": "teach-pass-2", "role": "teacher" }),
    )["sessionToken"]
        .as_str()
        .expect("subject teacher")
        .to_string();

    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "admin.addStudent",
        json!({
            "sessionToken": admin,
            "classId": class_id,
            "name": "Aarav Singh",
            "loginId": "STU01",
            "password": "stud-pass-1",
            "rollNo": 1
        }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "auth.login",
        json!({
            "loginId": "STU01",
            "password": "stud-pass-1",
            "role": "student",
            "classId": class_id
        }),
    )["sessionToken"]
        .as_str()
        .expect("student")
        .to_string();

    // Subject teachers cannot publish a daily update.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "11",
        "posts.create",
        json!({
            "sessionToken": subject_teacher,
            "date": "2025-08-04",
            "postType": "daily",
            "items": [{ "itemType": "classwork", "heading": "Maths" }]
        }),
    );
    assert_eq!(code, "forbidden");

    // Daily post: rows with blank headings are dropped, defaulters resolve
    // to student names, attachments are stored under assets/.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "posts.create",
        json!({
            "sessionToken": class_teacher,
            "date": "2025-08-04",
            "postType": "daily",
            "items": [
                { "itemType": "homework", "heading": "English", "content": "Essay on monsoon" },
                {
                    "itemType": "classwork",
                    "heading": "Maths",
                    "content": "Fractions",
                    "attachments": [{ "fileName": "board.png", "data": "aGVsbG8=" }]
                },
                { "itemType": "classwork", "heading": "   " },
                {
                    "itemType": "defaulter",
                    "heading": "Incomplete Math Copy",
                    "studentIds": [student_id]
                }
            ]
        }),
    );
    assert_eq!(created["items"], 3);

    // A general notice from the subject teacher to every class.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "posts.create",
        json!({
            "sessionToken": subject_teacher,
            "date": "2025-08-05",
            "postType": "general",
            "targetClasses": ["all"],
            "items": [{ "itemType": "update", "heading": "Library week", "content": "New books in." }]
        }),
    );

    let work = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "work.feed",
        json!({ "sessionToken": student }),
    );
    let posts = work["posts"].as_array().expect("posts");
    assert_eq!(posts.len(), 2);
    // Newest post date first.
    assert_eq!(posts[0]["postDate"], "2025-08-05");
    assert_eq!(posts[0]["teacherRole"], "Subject Teacher");
    assert_eq!(posts[1]["teacherRole"], "Class Teacher");

    // Classwork sorts ahead of homework regardless of entry order.
    let daily_items = posts[1]["items"].as_array().expect("items");
    assert_eq!(daily_items.len(), 2);
    assert_eq!(daily_items[0]["itemType"], "classwork");
    assert_eq!(daily_items[1]["itemType"], "homework");
    let attachment = daily_items[0]["attachments"][0].as_str().expect("path");
    assert!(attachment.starts_with("assets/posts/"));

    let defaulters = posts[1]["defaulterItems"].as_array().expect("defaulters");
    assert_eq!(defaulters[0]["heading"], "Incomplete Math Copy");
    assert_eq!(defaulters[0]["defaulters"][0], "Aarav Singh");

    // The teacher's history mirrors the feed and supports item deletion.
    let recent = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "posts.recent",
        json!({ "sessionToken": class_teacher }),
    );
    let batch = &recent["posts"][0];
    let batch_id = batch["batchId"].as_str().expect("batchId").to_string();
    let item_id = batch["items"][0]["itemId"].as_str().expect("itemId").to_string();

    // Another teacher cannot delete it.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "16",
        "posts.deleteItem",
        json!({ "sessionToken": subject_teacher, "itemId": item_id }),
    );
    assert_eq!(code, "forbidden");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "posts.deleteItem",
        json!({ "sessionToken": class_teacher, "itemId": item_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "posts.deleteBatch",
        json!({ "sessionToken": class_teacher, "batchId": batch_id }),
    );

    let work = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "work.feed",
        json!({ "sessionToken": student }),
    );
    assert_eq!(work["posts"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
