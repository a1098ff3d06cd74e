use crate::ipc::handlers::auth;
use crate::ipc::helpers::{required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM classes ORDER BY sort_order, name")
        .map_err(HandlerErr::db_query)?;
    let classes = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "classes": classes }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let name = required_str(params, "name")?;
    let next_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM classes",
            [],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, sort_order) VALUES(?, ?, ?)",
        (&id, &name, next_order),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "classId": id }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let class_id = required_str(params, "classId")?;
    let students: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if students > 0 {
        return Err(HandlerErr::conflict(
            "class still has students; move or delete them first",
        ));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE teachers SET assigned_class_id = NULL WHERE assigned_class_id = ?",
        [&class_id],
    )
    .map_err(HandlerErr::db_update)?;
    for sql in [
        "DELETE FROM exam_marks WHERE exam_id IN (SELECT id FROM exams WHERE class_id = ?)",
        "DELETE FROM exams WHERE class_id = ?",
        "DELETE FROM attendance_records WHERE class_id = ?",
        "DELETE FROM attendance_days WHERE class_id = ?",
        "DELETE FROM timetable_slots WHERE class_id = ?",
        "DELETE FROM toppers WHERE class_id = ?",
        "DELETE FROM class_settings WHERE class_id = ?",
        "DELETE FROM post_batch_classes WHERE class_id = ?",
    ] {
        tx.execute(sql, [&class_id]).map_err(HandlerErr::db_update)?;
    }
    let removed = tx
        .execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(json!({ "removed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(respond(state, req, list)),
        "classes.create" => Some(respond(state, req, create)),
        "classes.delete" => Some(respond(state, req, delete)),
        _ => None,
    }
}
