use crate::ipc::handlers::auth;
use crate::ipc::helpers::{optional_i64, required_object, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub const DAYS: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
pub const PERIODS: std::ops::RangeInclusive<i64> = 1..=8;

fn subjects_json(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT code, name FROM subjects ORDER BY sort_order, code")
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([], |r| {
        Ok(json!({
            "code": r.get::<_, String>(0)?,
            "name": r.get::<_, String>(1)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

/// The weekly grid keyed by day then period, plus the subject catalogue the
/// editor's dropdowns need. Shared with the student profile schedule tab.
pub fn timetable_json(conn: &Connection, class_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT day, period, subject_code FROM timetable_slots
             WHERE class_id = ?
             ORDER BY day, period",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut days = serde_json::Map::new();
    for (day, period, code) in rows {
        let entry = days
            .entry(day)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(obj) = entry.as_object_mut() {
            obj.insert(period.to_string(), serde_json::Value::String(code));
        }
    }
    Ok(serde_json::Value::Object(days))
}

fn subjects_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "subjects": subjects_json(conn)? }))
}

fn subjects_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    let code = required_str(params, "code")?.to_uppercase();
    let name = required_str(params, "name")?;
    let sort_order = optional_i64(params, "sortOrder").unwrap_or(0);
    conn.execute(
        "INSERT INTO subjects(code, name, sort_order) VALUES(?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET name = excluded.name, sort_order = excluded.sort_order",
        (&code, &name, sort_order),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "code": code }))
}

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    Ok(json!({
        "classId": class_id,
        "timetable": timetable_json(conn, &class_id)?,
        "subjects": subjects_json(conn)?,
    }))
}

fn save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let grid = required_object(params, "timetable")?;

    // Validate the whole grid before touching the table.
    let mut slots: Vec<(String, i64, String)> = Vec::new();
    for (day, periods) in grid {
        if !DAYS.contains(&day.as_str()) {
            return Err(HandlerErr::bad_params(format!("unknown day: {}", day)));
        }
        let Some(periods) = periods.as_object() else {
            return Err(HandlerErr::bad_params("day entries must be objects"));
        };
        for (period_s, code) in periods {
            let Ok(period) = period_s.parse::<i64>() else {
                return Err(HandlerErr::bad_params(format!(
                    "period must be numeric: {}",
                    period_s
                )));
            };
            if !PERIODS.contains(&period) {
                return Err(HandlerErr::bad_params("period must be between 1 and 8"));
            }
            let Some(code) = code.as_str() else {
                return Err(HandlerErr::bad_params("subject codes must be strings"));
            };
            if code.trim().is_empty() {
                continue; // cleared cell
            }
            slots.push((day.clone(), period, code.to_string()));
        }
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM timetable_slots WHERE class_id = ?", [&class_id])
        .map_err(HandlerErr::db_update)?;
    for (day, period, code) in &slots {
        tx.execute(
            "INSERT INTO timetable_slots(class_id, day, period, subject_code)
             VALUES(?, ?, ?, ?)",
            (&class_id, day, period, code),
        )
        .map_err(HandlerErr::db_update)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "classId": class_id, "slots": slots.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(state, req, subjects_list)),
        "subjects.upsert" => Some(respond(state, req, subjects_upsert)),
        "timetable.get" => Some(respond(state, req, get)),
        "timetable.save" => Some(respond(state, req, save)),
        _ => None,
    }
}
