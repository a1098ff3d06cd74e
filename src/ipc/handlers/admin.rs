use crate::calendar::ACADEMIC_MONTHS;
use crate::ipc::handlers::attendance::student_month_aggregates;
use crate::ipc::handlers::auth::{self, Role, SUPER_ADMIN_LEVEL};
use crate::ipc::helpers::{optional_i64, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::password;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn stats(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let students: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .map_err(HandlerErr::db_query)?;
    let teachers: i64 = conn
        .query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "students": students, "teachers": teachers }))
}

fn list_students(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let class_id = required_str(params, "classId")?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, roll_no, login_id, profile_pic
             FROM students WHERE class_id = ?
             ORDER BY roll_no IS NULL, roll_no, name",
        )
        .map_err(HandlerErr::db_query)?;
    let students = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "rollNo": r.get::<_, Option<i64>>(2)?,
                "loginId": r.get::<_, String>(3)?,
                "profilePic": r.get::<_, Option<String>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "classId": class_id, "students": students }))
}

/// Full profile row with class and class-teacher context. Also feeds the
/// student-facing profile and the report card.
pub(super) fn student_profile_json(
    conn: &Connection,
    student_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT s.id, s.name, s.roll_no, s.login_id, s.dob, s.father_name,
                    s.mother_name, s.contact, s.address, s.admission_year,
                    s.profile_pic, s.class_id, c.name
             FROM students s JOIN classes c ON c.id = s.class_id
             WHERE s.id = ?",
            [student_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "rollNo": r.get::<_, Option<i64>>(2)?,
                    "loginId": r.get::<_, String>(3)?,
                    "dob": r.get::<_, Option<String>>(4)?,
                    "fatherName": r.get::<_, Option<String>>(5)?,
                    "motherName": r.get::<_, Option<String>>(6)?,
                    "contact": r.get::<_, Option<String>>(7)?,
                    "address": r.get::<_, Option<String>>(8)?,
                    "admissionYear": r.get::<_, Option<i64>>(9)?,
                    "profilePic": r.get::<_, Option<String>>(10)?,
                    "classId": r.get::<_, String>(11)?,
                    "className": r.get::<_, String>(12)?,
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(mut profile) = row else {
        return Err(HandlerErr::not_found("student not found"));
    };

    let class_id = profile["classId"].as_str().unwrap_or("").to_string();
    let teacher: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT name, contact FROM teachers WHERE assigned_class_id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    if let Some(obj) = profile.as_object_mut() {
        match teacher {
            Some((name, contact)) => {
                obj.insert("teacherName".to_string(), json!(name));
                obj.insert("teacherContact".to_string(), json!(contact));
            }
            None => {
                obj.insert("teacherName".to_string(), json!(null));
                obj.insert("teacherContact".to_string(), json!(null));
            }
        }
    }
    Ok(profile)
}

pub(super) fn exam_results_json(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    published_only: bool,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut exam_stmt = conn
        .prepare(
            "SELECT id, name, max_marks_per_subject, is_published
             FROM exams WHERE class_id = ?
             ORDER BY sort_order, name",
        )
        .map_err(HandlerErr::db_query)?;
    let exams = exam_stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
                r.get::<_, i64>(3)? != 0,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut out = Vec::new();
    for (exam_id, name, max_marks, is_published) in exams {
        if published_only && !is_published {
            continue;
        }
        let mut mark_stmt = conn
            .prepare(
                "SELECT m.subject_code, sub.name, m.marks
                 FROM exam_marks m JOIN subjects sub ON sub.code = m.subject_code
                 WHERE m.exam_id = ? AND m.student_id = ?
                 ORDER BY sub.sort_order, sub.code",
            )
            .map_err(HandlerErr::db_query)?;
        let results = mark_stmt
            .query_map((&exam_id, student_id), |r| {
                Ok(json!({
                    "subjectCode": r.get::<_, String>(0)?,
                    "subject": r.get::<_, String>(1)?,
                    "marksObtained": r.get::<_, Option<f64>>(2)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::db_query)?;
        let total: f64 = results
            .iter()
            .filter_map(|r| r["marksObtained"].as_f64())
            .sum();
        out.push(json!({
            "id": exam_id,
            "name": name,
            "maxMarksPerSubject": max_marks,
            "isPublished": is_published,
            "totalObtained": total,
            "results": results,
        }));
    }
    Ok(out)
}

fn require_student_view(
    conn: &Connection,
    params: &serde_json::Value,
    student_id: &str,
) -> Result<(), HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    match ctx.role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            let (_ctx, assigned) = auth::require_class_teacher(conn, params)?;
            let class_id: Option<String> = conn
                .query_row(
                    "SELECT class_id FROM students WHERE id = ?",
                    [student_id],
                    |r| r.get(0),
                )
                .optional()
                .map_err(HandlerErr::db_query)?;
            if class_id.as_deref() == Some(assigned.as_str()) {
                Ok(())
            } else {
                Err(HandlerErr::forbidden("student is not in your class"))
            }
        }
        Role::Student => Err(HandlerErr::forbidden("teacher or admin access required")),
    }
}

fn student_detail(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    require_student_view(conn, params, &student_id)?;
    let profile = student_profile_json(conn, &student_id)?;
    let class_id = profile["classId"].as_str().unwrap_or("").to_string();

    let aggregates = student_month_aggregates(conn, &student_id)?;
    let attendance: Vec<serde_json::Value> = ACADEMIC_MONTHS
        .iter()
        .map(|m| {
            let (present, absent) = aggregates.get(m).copied().unwrap_or((0, 0));
            json!({ "month": m, "daysPresent": present, "daysAbsent": absent })
        })
        .collect();

    let exams = exam_results_json(conn, &class_id, &student_id, false)?;
    Ok(json!({
        "profile": profile,
        "attendance": attendance,
        "exams": exams,
    }))
}

fn list_teachers(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name, t.login_id, t.contact, t.assigned_class_id,
                    c.name, t.subject_code, t.profile_pic
             FROM teachers t LEFT JOIN classes c ON c.id = t.assigned_class_id
             ORDER BY t.name",
        )
        .map_err(HandlerErr::db_query)?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "loginId": r.get::<_, String>(2)?,
                "contact": r.get::<_, Option<String>>(3)?,
                "assignedClassId": r.get::<_, Option<String>>(4)?,
                "assignedClassName": r.get::<_, Option<String>>(5)?,
                "subjectCode": r.get::<_, Option<String>>(6)?,
                "profilePic": r.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut sub_stmt = conn
        .prepare("SELECT code, name FROM subjects ORDER BY sort_order, code")
        .map_err(HandlerErr::db_query)?;
    let subjects = sub_stmt
        .query_map([], |r| {
            Ok(json!({
                "code": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "teachers": teachers, "subjects": subjects }))
}

fn teacher_detail(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let teacher_id = required_str(params, "teacherId")?;
    let row = conn
        .query_row(
            "SELECT t.id, t.name, t.login_id, t.contact, t.assigned_class_id,
                    c.name, t.subject_code, t.profile_pic
             FROM teachers t LEFT JOIN classes c ON c.id = t.assigned_class_id
             WHERE t.id = ?",
            [&teacher_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "loginId": r.get::<_, String>(2)?,
                    "contact": r.get::<_, Option<String>>(3)?,
                    "assignedClassId": r.get::<_, Option<String>>(4)?,
                    "assignedClassName": r.get::<_, Option<String>>(5)?,
                    "subjectCode": r.get::<_, Option<String>>(6)?,
                    "profilePic": r.get::<_, Option<String>>(7)?,
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    row.ok_or_else(|| HandlerErr::not_found("teacher not found"))
}

fn list_admins(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, login_id, contact, level, profile_pic
             FROM admins ORDER BY level, name",
        )
        .map_err(HandlerErr::db_query)?;
    let admins = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "loginId": r.get::<_, String>(2)?,
                "contact": r.get::<_, Option<String>>(3)?,
                "level": r.get::<_, i64>(4)?,
                "profilePic": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "admins": admins }))
}

fn hash_param(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let plain = required_str(params, "password")?;
    password::hash(&plain).map_err(|e| HandlerErr::new("hash_failed", e.to_string()))
}

fn add_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let class_id = required_str(params, "classId")?;
    let name = required_str(params, "name")?;
    let login_id = required_str(params, "loginId")?;
    let hash = hash_param(params)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, roll_no, login_id, password_hash,
                              dob, father_name, mother_name, contact, address, admission_year)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            class_id,
            name,
            optional_i64(params, "rollNo"),
            login_id,
            hash,
            optional_str(params, "dob"),
            optional_str(params, "fatherName"),
            optional_str(params, "motherName"),
            optional_str(params, "contact"),
            optional_str(params, "address"),
            optional_i64(params, "admissionYear"),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            HandlerErr::conflict("login id already taken in this class")
        }
        other => HandlerErr::db_update(other),
    })?;
    Ok(json!({ "studentId": id }))
}

fn save_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if exists == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }

    let fields: [(&str, &str); 8] = [
        ("name", "name"),
        ("dob", "dob"),
        ("fatherName", "father_name"),
        ("motherName", "mother_name"),
        ("contact", "contact"),
        ("address", "address"),
        ("loginId", "login_id"),
        ("classId", "class_id"),
    ];
    for (key, column) in fields {
        if let Some(value) = optional_str(params, key) {
            let sql = format!("UPDATE students SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &student_id))
                .map_err(HandlerErr::db_update)?;
        }
    }
    if let Some(roll) = optional_i64(params, "rollNo") {
        conn.execute(
            "UPDATE students SET roll_no = ? WHERE id = ?",
            (roll, &student_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    if let Some(year) = optional_i64(params, "admissionYear") {
        conn.execute(
            "UPDATE students SET admission_year = ? WHERE id = ?",
            (year, &student_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    // Blank password means keep the current one.
    if optional_str(params, "password").is_some() {
        let hash = hash_param(params)?;
        conn.execute(
            "UPDATE students SET password_hash = ? WHERE id = ?",
            (&hash, &student_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    Ok(json!({ "studentId": student_id }))
}

fn delete_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for sql in [
        "DELETE FROM attendance_records WHERE student_id = ?",
        "DELETE FROM exam_marks WHERE student_id = ?",
        "DELETE FROM post_defaulters WHERE student_id = ?",
        "DELETE FROM suggestions WHERE student_id = ?",
        "UPDATE toppers SET student_id = NULL, percentage = NULL WHERE student_id = ?",
        "DELETE FROM sessions WHERE role = 'student' AND user_id = ?",
    ] {
        tx.execute(sql, [&student_id])
            .map_err(HandlerErr::db_update)?;
    }
    let removed = tx
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "removed": true }))
}

fn add_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let name = required_str(params, "name")?;
    let login_id = required_str(params, "loginId")?;
    let hash = hash_param(params)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, name, login_id, password_hash, contact,
                              assigned_class_id, subject_code)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            name,
            login_id,
            hash,
            optional_str(params, "contact"),
            optional_str(params, "assignedClassId"),
            optional_str(params, "subjectCode"),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            HandlerErr::conflict("login id already taken")
        }
        other => HandlerErr::db_update(other),
    })?;
    Ok(json!({ "teacherId": id }))
}

fn save_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let teacher_id = required_str(params, "teacherId")?;
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM teachers WHERE id = ?",
            [&teacher_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if exists == 0 {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    for (key, column) in [
        ("name", "name"),
        ("contact", "contact"),
        ("loginId", "login_id"),
    ] {
        if let Some(value) = optional_str(params, key) {
            let sql = format!("UPDATE teachers SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &teacher_id))
                .map_err(HandlerErr::db_update)?;
        }
    }
    // Explicit empty string clears the assignment (back to subject teacher).
    if let Some(value) = params.get("assignedClassId").and_then(|v| v.as_str()) {
        let assigned = if value.trim().is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        conn.execute(
            "UPDATE teachers SET assigned_class_id = ? WHERE id = ?",
            (&assigned, &teacher_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    if let Some(value) = params.get("subjectCode").and_then(|v| v.as_str()) {
        let subject = if value.trim().is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        conn.execute(
            "UPDATE teachers SET subject_code = ? WHERE id = ?",
            (&subject, &teacher_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    if optional_str(params, "password").is_some() {
        let hash = hash_param(params)?;
        conn.execute(
            "UPDATE teachers SET password_hash = ? WHERE id = ?",
            (&hash, &teacher_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    Ok(json!({ "teacherId": teacher_id }))
}

fn delete_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let teacher_id = required_str(params, "teacherId")?;
    conn.execute(
        "DELETE FROM sessions WHERE role = 'teacher' AND user_id = ?",
        [&teacher_id],
    )
    .map_err(HandlerErr::db_update)?;
    let removed = conn
        .execute("DELETE FROM teachers WHERE id = ?", [&teacher_id])
        .map_err(HandlerErr::db_update)?;
    if removed == 0 {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    Ok(json!({ "removed": true }))
}

fn add_admin(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let name = required_str(params, "name")?;
    let login_id = required_str(params, "loginId")?;
    let level = optional_i64(params, "level").unwrap_or(2);
    if !(1..=2).contains(&level) {
        return Err(HandlerErr::bad_params("level must be 1 or 2"));
    }
    let hash = hash_param(params)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO admins(id, name, login_id, password_hash, contact, level)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![id, name, login_id, hash, optional_str(params, "contact"), level],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            HandlerErr::conflict("login id already taken")
        }
        other => HandlerErr::db_update(other),
    })?;
    Ok(json!({ "adminId": id }))
}

fn super_admin_count(conn: &Connection) -> Result<i64, HandlerErr> {
    conn.query_row(
        "SELECT COUNT(*) FROM admins WHERE level = ?",
        [SUPER_ADMIN_LEVEL],
        |r| r.get(0),
    )
    .map_err(HandlerErr::db_query)
}

fn save_admin(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let admin_id = required_str(params, "adminId")?;
    let current_level: Option<i64> = conn
        .query_row("SELECT level FROM admins WHERE id = ?", [&admin_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(current_level) = current_level else {
        return Err(HandlerErr::not_found("admin not found"));
    };

    for (key, column) in [
        ("name", "name"),
        ("contact", "contact"),
        ("loginId", "login_id"),
    ] {
        if let Some(value) = optional_str(params, key) {
            let sql = format!("UPDATE admins SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &admin_id))
                .map_err(HandlerErr::db_update)?;
        }
    }
    if let Some(level) = optional_i64(params, "level") {
        if !(1..=2).contains(&level) {
            return Err(HandlerErr::bad_params("level must be 1 or 2"));
        }
        if current_level == SUPER_ADMIN_LEVEL
            && level != SUPER_ADMIN_LEVEL
            && super_admin_count(conn)? <= 1
        {
            return Err(HandlerErr::conflict("cannot demote the last super admin"));
        }
        conn.execute(
            "UPDATE admins SET level = ? WHERE id = ?",
            (level, &admin_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    if optional_str(params, "password").is_some() {
        let hash = hash_param(params)?;
        conn.execute(
            "UPDATE admins SET password_hash = ? WHERE id = ?",
            (&hash, &admin_id),
        )
        .map_err(HandlerErr::db_update)?;
    }
    Ok(json!({ "adminId": admin_id }))
}

fn delete_admin(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let admin_id = required_str(params, "adminId")?;
    let level: Option<i64> = conn
        .query_row("SELECT level FROM admins WHERE id = ?", [&admin_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(level) = level else {
        return Err(HandlerErr::not_found("admin not found"));
    };
    if level == SUPER_ADMIN_LEVEL && super_admin_count(conn)? <= 1 {
        return Err(HandlerErr::conflict("cannot delete the last super admin"));
    }
    conn.execute(
        "DELETE FROM sessions WHERE role = 'admin' AND user_id = ?",
        [&admin_id],
    )
    .map_err(HandlerErr::db_update)?;
    conn.execute("DELETE FROM admins WHERE id = ?", [&admin_id])
        .map_err(HandlerErr::db_update)?;
    Ok(json!({ "removed": true }))
}

fn list_suggestions(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT g.id, g.message, g.created_at, s.name, s.profile_pic, c.name
             FROM suggestions g
             JOIN students s ON s.id = g.student_id
             JOIN classes c ON c.id = s.class_id
             ORDER BY g.created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    let suggestions = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "message": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, String>(2)?,
                "name": r.get::<_, String>(3)?,
                "profilePic": r.get::<_, Option<String>>(4)?,
                "className": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "suggestions": suggestions }))
}

fn delete_suggestion(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let id = required_str(params, "suggestionId")?;
    let removed = conn
        .execute("DELETE FROM suggestions WHERE id = ?", [&id])
        .map_err(HandlerErr::db_update)?;
    if removed == 0 {
        return Err(HandlerErr::not_found("suggestion not found"));
    }
    Ok(json!({ "removed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.stats" => Some(respond(state, req, stats)),
        "admin.listStudents" => Some(respond(state, req, list_students)),
        "admin.studentDetail" => Some(respond(state, req, student_detail)),
        "admin.listTeachers" => Some(respond(state, req, list_teachers)),
        "admin.teacherDetail" => Some(respond(state, req, teacher_detail)),
        "admin.listAdmins" => Some(respond(state, req, list_admins)),
        "admin.addStudent" => Some(respond(state, req, add_student)),
        "admin.saveStudent" => Some(respond(state, req, save_student)),
        "admin.deleteStudent" => Some(respond(state, req, delete_student)),
        "admin.addTeacher" => Some(respond(state, req, add_teacher)),
        "admin.saveTeacher" => Some(respond(state, req, save_teacher)),
        "admin.deleteTeacher" => Some(respond(state, req, delete_teacher)),
        "admin.addAdmin" => Some(respond(state, req, add_admin)),
        "admin.saveAdmin" => Some(respond(state, req, save_admin)),
        "admin.deleteAdmin" => Some(respond(state, req, delete_admin)),
        "admin.listSuggestions" => Some(respond(state, req, list_suggestions)),
        "admin.deleteSuggestion" => Some(respond(state, req, delete_suggestion)),
        _ => None,
    }
}
