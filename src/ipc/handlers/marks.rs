use crate::ipc::handlers::attendance::load_roster;
use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{required_f64, required_object, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(super) struct ExamRow {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub max_marks: f64,
    pub is_published: bool,
}

pub(super) fn load_exam(conn: &Connection, exam_id: &str) -> Result<ExamRow, HandlerErr> {
    conn.query_row(
        "SELECT id, class_id, name, max_marks_per_subject, is_published
         FROM exams WHERE id = ?",
        [exam_id],
        |r| {
            Ok(ExamRow {
                id: r.get(0)?,
                class_id: r.get(1)?,
                name: r.get(2)?,
                max_marks: r.get(3)?,
                is_published: r.get::<_, i64>(4)? != 0,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .ok_or_else(|| HandlerErr::not_found("exam not found"))
}

/// Class teachers may touch exams of their own class; admins any.
fn require_exam_access(
    conn: &Connection,
    params: &serde_json::Value,
    exam: &ExamRow,
) -> Result<(), HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    match ctx.role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            let (_ctx, class_id) = auth::require_class_teacher(conn, params)?;
            if class_id == exam.class_id {
                Ok(())
            } else {
                Err(HandlerErr::forbidden("exam belongs to another class"))
            }
        }
        Role::Student => Err(HandlerErr::forbidden("teacher or admin access required")),
    }
}

fn subject_exists(conn: &Connection, code: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM subjects WHERE code = ?", [code], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

/// Marks arrive as numbers or numeric strings (blank clears the cell).
fn parse_mark(value: &serde_json::Value, max: f64) -> Result<Option<f64>, HandlerErr> {
    let parsed = if value.is_null() {
        None
    } else if let Some(n) = value.as_f64() {
        Some(n)
    } else if let Some(s) = value.as_str() {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(
                t.parse::<f64>()
                    .map_err(|_| HandlerErr::bad_params(format!("not a number: {}", t)))?,
            )
        }
    } else {
        return Err(HandlerErr::bad_params("marks must be numeric"));
    };
    if let Some(n) = parsed {
        if !(0.0..=max).contains(&n) {
            return Err(HandlerErr::bad_params(format!(
                "marks must be between 0 and {}",
                max
            )));
        }
    }
    Ok(parsed)
}

fn exams_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, max_marks_per_subject, is_published
             FROM exams WHERE class_id = ?
             ORDER BY sort_order, name",
        )
        .map_err(HandlerErr::db_query)?;
    let exams = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "maxMarksPerSubject": r.get::<_, f64>(2)?,
                "isPublished": r.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "classId": class_id, "exams": exams }))
}

fn exams_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let name = required_str(params, "name")?;
    let max_marks = required_f64(params, "maxMarksPerSubject")?;
    if max_marks <= 0.0 {
        return Err(HandlerErr::bad_params("maxMarksPerSubject must be positive"));
    }
    let next_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM exams WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, class_id, name, max_marks_per_subject, is_published, sort_order)
         VALUES(?, ?, ?, ?, 0, ?)",
        (&id, &class_id, &name, max_marks, next_order),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "examId": id }))
}

fn exams_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let exam = load_exam(conn, &exam_id)?;
    require_exam_access(conn, params, &exam)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM exam_marks WHERE exam_id = ?", [&exam.id])
        .map_err(HandlerErr::db_update)?;
    tx.execute("DELETE FROM exams WHERE id = ?", [&exam.id])
        .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "removed": true }))
}

fn sheet(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let subject_code = required_str(params, "subjectCode")?;
    let exam = load_exam(conn, &exam_id)?;
    require_exam_access(conn, params, &exam)?;
    if !subject_exists(conn, &subject_code)? {
        return Err(HandlerErr::not_found("subject not found"));
    }

    let roster = load_roster(conn, &exam.class_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT student_id, marks FROM exam_marks
             WHERE exam_id = ? AND subject_code = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map((&exam.id, &subject_code), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<f64>>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    let by_student: std::collections::HashMap<String, Option<f64>> = rows.into_iter().collect();

    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|e| {
            json!({
                "studentId": e.student_id,
                "name": e.name,
                "rollNo": e.roll_no,
                "marksObtained": by_student.get(&e.student_id).copied().flatten(),
            })
        })
        .collect();

    Ok(json!({
        "examId": exam.id,
        "examName": exam.name,
        "subjectCode": subject_code,
        "maxMarksPerSubject": exam.max_marks,
        "students": students,
    }))
}

fn save_bulk(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let subject_code = required_str(params, "subjectCode")?;
    let exam = load_exam(conn, &exam_id)?;
    require_exam_access(conn, params, &exam)?;
    if !subject_exists(conn, &subject_code)? {
        return Err(HandlerErr::not_found("subject not found"));
    }
    let marks = required_object(params, "marks")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut written = 0usize;
    for (student_id, value) in marks {
        let belongs = tx
            .query_row(
                "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                (&exam.class_id, student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(HandlerErr::db_query)?
            .is_some();
        if !belongs {
            continue;
        }
        match parse_mark(value, exam.max_marks)? {
            Some(n) => {
                tx.execute(
                    "INSERT INTO exam_marks(exam_id, student_id, subject_code, marks)
                     VALUES(?, ?, ?, ?)
                     ON CONFLICT(exam_id, student_id, subject_code) DO UPDATE SET
                       marks = excluded.marks",
                    (&exam.id, student_id, &subject_code, n),
                )
                .map_err(HandlerErr::db_update)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM exam_marks
                     WHERE exam_id = ? AND student_id = ? AND subject_code = ?",
                    (&exam.id, student_id, &subject_code),
                )
                .map_err(HandlerErr::db_update)?;
            }
        }
        written += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "saved": written }))
}

fn update_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exam_id = required_str(params, "examId")?;
    let exam = load_exam(conn, &exam_id)?;
    require_exam_access(conn, params, &exam)?;
    let belongs = conn
        .query_row(
            "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
            (&exam.class_id, &student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .is_some();
    if !belongs {
        return Err(HandlerErr::not_found("student not in the exam's class"));
    }
    let marks = required_object(params, "marks")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut written = 0usize;
    for (subject_code, value) in marks {
        if !subject_exists(&tx, subject_code)? {
            return Err(HandlerErr::not_found(format!(
                "unknown subject: {}",
                subject_code
            )));
        }
        match parse_mark(value, exam.max_marks)? {
            Some(n) => {
                tx.execute(
                    "INSERT INTO exam_marks(exam_id, student_id, subject_code, marks)
                     VALUES(?, ?, ?, ?)
                     ON CONFLICT(exam_id, student_id, subject_code) DO UPDATE SET
                       marks = excluded.marks",
                    (&exam.id, &student_id, subject_code, n),
                )
                .map_err(HandlerErr::db_update)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM exam_marks
                     WHERE exam_id = ? AND student_id = ? AND subject_code = ?",
                    (&exam.id, &student_id, subject_code),
                )
                .map_err(HandlerErr::db_update)?;
            }
        }
        written += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "saved": written }))
}

fn toggle_publish(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let published = params
        .get("published")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("missing published"))?;
    let exam = load_exam(conn, &exam_id)?;
    require_exam_access(conn, params, &exam)?;
    conn.execute(
        "UPDATE exams SET is_published = ? WHERE id = ?",
        (published as i64, &exam.id),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "examId": exam.id, "isPublished": published }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(respond(state, req, exams_list)),
        "exams.create" => Some(respond(state, req, exams_create)),
        "exams.delete" => Some(respond(state, req, exams_delete)),
        "marks.sheet" => Some(respond(state, req, sheet)),
        "marks.saveBulk" => Some(respond(state, req, save_bulk)),
        "marks.updateStudent" => Some(respond(state, req, update_student)),
        "reports.togglePublish" => Some(respond(state, req, toggle_publish)),
        _ => None,
    }
}
