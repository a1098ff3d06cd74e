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
fn level_two_admins_manage_students_only() {
    let workspace = temp_dir("schoolhub-admin-roles");
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
    // Bootstrap runs once.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "auth.bootstrap",
        json!({ "name": "Again", "loginId": "root2", "password": "whatever-99" }),
    );
    assert_eq!(code, "conflict");

    let root = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "loginId": "root", "password": "first-login-1", "role": "admin" }),
    )["sessionToken"]
        .as_str()
        .expect("root token")
        .to_string();
    let class_id = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        json!({ "sessionToken": root, "name": "2-B" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    let clerk_id = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "admin.addAdmin",
        json!({
            "sessionToken": root,
            "name": "Office Clerk",
            "loginId": "clerk",
            "password": "clerk-pass-1",
            "level": 2
        }),
    )["adminId"]
        .as_str()
        .expect("adminId")
        .to_string();
    let clerk = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "loginId": "clerk", "password": "clerk-pass-1", "role": "admin" }),
    )["sessionToken"]
        .as_str()
        .expect("clerk token")
        .to_string();

    // Student management is open to every admin level.
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "admin.addStudent",
        json!({
            "sessionToken": clerk,
            "classId": class_id,
            "name": "Meera Patel",
            "loginId": "STU01",
            "password": "stud-pass-1",
            "rollNo": 4
        }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();

    // Teacher/admin consoles and the inbox are super-admin territory.
    for (id, method) in [
        ("9", "admin.listTeachers"),
        ("10", "admin.listAdmins"),
        ("11", "admin.listSuggestions"),
    ] {
        let code = request_err_code(
            &mut stdin,
            &mut reader,
            id,
            method,
            json!({ "sessionToken": clerk }),
        );
        assert_eq!(code, "forbidden", "{}", method);
    }
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "12",
        "admin.addTeacher",
        json!({
            "sessionToken": clerk,
            "name": "X",
            "loginId": "T009",
            "password": "teach-pass-9"
        }),
    );
    assert_eq!(code, "forbidden");

    // Saving a profile with a blank password keeps the old credential.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "admin.saveStudent",
        json!({
            "sessionToken": clerk,
            "studentId": student_id,
            "name": "Meera R. Patel",
            "password": ""
        }),
    );
    let relogin = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "auth.login",
        json!({
            "loginId": "STU01",
            "password": "stud-pass-1",
            "role": "student",
            "classId": class_id
        }),
    );
    assert_eq!(relogin["user"]["name"], "Meera R. Patel");

    // Students get a clean denial on admin surfaces.
    let student = relogin["sessionToken"].as_str().expect("student").to_string();
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "15",
        "admin.stats",
        json!({ "sessionToken": student }),
    );
    assert_eq!(code, "forbidden");

    // Wrong password and wrong class both read as the same failure.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "16",
        "auth.login",
        json!({
            "loginId": "STU01",
            "password": "wrong-pass-1",
            "role": "student",
            "classId": class_id
        }),
    );
    assert_eq!(code, "unauthorized");

    // The last super admin can be neither demoted nor deleted.
    let admins = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "admin.listAdmins",
        json!({ "sessionToken": root }),
    );
    let root_id = admins["admins"]
        .as_array()
        .expect("admins")
        .iter()
        .find(|a| a["level"] == 1)
        .and_then(|a| a["id"].as_str())
        .expect("root id")
        .to_string();
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "18",
        "admin.saveAdmin",
        json!({ "sessionToken": root, "adminId": root_id, "level": 2 }),
    );
    assert_eq!(code, "conflict");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "19",
        "admin.deleteAdmin",
        json!({ "sessionToken": root, "adminId": root_id }),
    );
    assert_eq!(code, "conflict");

    // A level-2 admin can go, and their sessions die with them.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "admin.deleteAdmin",
        json!({ "sessionToken": root, "adminId": clerk_id }),
    );
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "21",
        "admin.stats",
        json!({ "sessionToken": clerk }),
    );
    assert_eq!(code, "unauthorized");

    // Suggestion inbox round-trip.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "suggestions.submit",
        json!({ "sessionToken": student, "message": "Please add a chess club." }),
    );
    let inbox = request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "admin.listSuggestions",
        json!({ "sessionToken": root }),
    );
    let suggestion = &inbox["suggestions"][0];
    assert_eq!(suggestion["className"], "2-B");
    let sid = suggestion["id"].as_str().expect("suggestion id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "24",
        "admin.deleteSuggestion",
        json!({ "sessionToken": root, "suggestionId": sid }),
    );
    let inbox = request_ok(
        &mut stdin,
        &mut reader,
        "25",
        "admin.listSuggestions",
        json!({ "sessionToken": root }),
    );
    assert_eq!(inbox["suggestions"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
