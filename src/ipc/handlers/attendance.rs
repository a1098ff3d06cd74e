use crate::calendar;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{
    db_conn, required_array, required_i64, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::wizard::{Mark, Mode, RosterEntry, TakeSession};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

fn parse_date(params: &serde_json::Value, key: &str) -> Result<(String, NaiveDate), HandlerErr> {
    let raw = required_str(params, key)?;
    match calendar::parse_date(&raw) {
        Some(d) => Ok((d.format("%Y-%m-%d").to_string(), d)),
        None => Err(HandlerErr::invalid_date(format!(
            "{} must be YYYY-MM-DD",
            key
        ))),
    }
}

fn parse_year_month(params: &serde_json::Value) -> Result<(i32, u32), HandlerErr> {
    let year = required_i64(params, "year")?;
    let month = required_i64(params, "month")?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }
    Ok((year as i32, month as u32))
}

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

pub fn load_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterEntry>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, roll_no, login_id, profile_pic
             FROM students
             WHERE class_id = ?
             ORDER BY roll_no IS NULL, roll_no, name",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([class_id], |r| {
        Ok(RosterEntry {
            student_id: r.get(0)?,
            name: r.get(1)?,
            roll_no: r.get(2)?,
            login_id: r.get(3)?,
            profile_pic: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

fn day_is_holiday(conn: &Connection, class_id: &str, date: &str) -> Result<bool, HandlerErr> {
    let v: Option<i64> = conn
        .query_row(
            "SELECT is_holiday FROM attendance_days WHERE class_id = ? AND date = ?",
            (class_id, date),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    Ok(v.unwrap_or(0) != 0)
}

fn marks_for_date(
    conn: &Connection,
    class_id: &str,
    date: &str,
) -> Result<HashMap<String, Mark>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status FROM attendance_records
             WHERE class_id = ? AND date = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map((class_id, date), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    let mut out = HashMap::new();
    for (sid, status) in rows {
        if let Some(m) = Mark::parse(&status) {
            out.insert(sid, m);
        }
    }
    Ok(out)
}

/// Write a batch of present/absent marks for one day inside a transaction.
/// Sundays and holiday-marked days are never writable.
fn save_batch(
    conn: &Connection,
    class_id: &str,
    date_key: &str,
    date: NaiveDate,
    records: &[(String, Mark)],
) -> Result<usize, HandlerErr> {
    if calendar::is_sunday(date) {
        return Err(HandlerErr::invalid_date(
            "attendance cannot be taken on a Sunday",
        ));
    }
    if !class_exists(conn, class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    if day_is_holiday(conn, class_id, date_key)? {
        return Err(HandlerErr::conflict("day is marked as a holiday"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut written = 0usize;
    for (student_id, mark) in records {
        let belongs = tx
            .query_row(
                "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                (class_id, student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(HandlerErr::db_query)?
            .is_some();
        if !belongs {
            continue;
        }
        tx.execute(
            "INSERT INTO attendance_records(class_id, student_id, date, status)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(class_id, student_id, date) DO UPDATE SET
               status = excluded.status",
            (class_id, student_id, date_key, mark.as_str()),
        )
        .map_err(HandlerErr::db_update)?;
        written += 1;
    }
    tx.execute(
        "INSERT INTO attendance_days(class_id, date, is_holiday) VALUES(?, ?, 0)
         ON CONFLICT(class_id, date) DO NOTHING",
        (class_id, date_key),
    )
    .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(written)
}

fn month_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let (year, month) = parse_year_month(params)?;
    let Some(grid) = calendar::month_grid(year, month) else {
        return Err(HandlerErr::bad_params("invalid month"));
    };
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let from = calendar::date_key(year, month, 1);
    let to = calendar::date_key(year, month, grid.days_in_month);

    let mut days: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
    let mut stmt = conn
        .prepare(
            "SELECT date,
                    SUM(CASE WHEN status = 'present' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'absent' THEN 1 ELSE 0 END)
             FROM attendance_records
             WHERE class_id = ? AND date >= ? AND date <= ?
             GROUP BY date",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map((&class_id, &from, &to), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for (date, present, absent) in rows {
        days.insert(
            date,
            json!({
                "status": "taken",
                "stats": { "present": present, "absent": absent },
            }),
        );
    }

    let mut hstmt = conn
        .prepare(
            "SELECT date FROM attendance_days
             WHERE class_id = ? AND is_holiday = 1 AND date >= ? AND date <= ?",
        )
        .map_err(HandlerErr::db_query)?;
    let holidays = hstmt
        .query_map((&class_id, &from, &to), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for date in holidays {
        days.insert(date, json!({ "status": "holiday" }));
    }

    let (prev, next) = calendar::month_nav(year, month);
    Ok(json!({
        "classId": class_id,
        "grid": grid,
        "days": days,
        "nav": {
            "prev": { "year": prev.0, "month": prev.1 },
            "next": { "year": next.0, "month": next.1 },
        },
    }))
}

fn roster_for_date(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let (date_key, date) = parse_date(params, "date")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let roster = load_roster(conn, &class_id)?;
    let holiday = day_is_holiday(conn, &class_id, &date_key)?;
    let marks = marks_for_date(conn, &class_id, &date_key)?;

    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|e| {
            let status = if holiday {
                "holiday"
            } else {
                marks
                    .get(&e.student_id)
                    .map(|m| m.as_str())
                    .unwrap_or("pending")
            };
            json!({
                "studentId": e.student_id,
                "name": e.name,
                "rollNo": e.roll_no,
                "loginId": e.login_id,
                "profilePic": e.profile_pic,
                "status": status,
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "date": date_key,
        "isSunday": calendar::is_sunday(date),
        "isHoliday": holiday,
        "students": students,
    }))
}

fn save_batch_handler(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let (date_key, date) = parse_date(params, "date")?;
    let raw = required_array(params, "records")?;
    let mut records: Vec<(String, Mark)> = Vec::with_capacity(raw.len());
    for item in raw {
        let sid = item
            .get("studentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("record missing studentId"))?;
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("record missing status"))?;
        let Some(mark) = Mark::parse(status) else {
            return Err(HandlerErr::bad_params(
                "record status must be present or absent",
            ));
        };
        records.push((sid.to_string(), mark));
    }
    let saved = save_batch(conn, &class_id, &date_key, date, &records)?;
    Ok(json!({ "saved": saved }))
}

fn mark_holiday(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let (date_key, _date) = parse_date(params, "date")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO attendance_days(class_id, date, is_holiday) VALUES(?, ?, 1)
         ON CONFLICT(class_id, date) DO UPDATE SET is_holiday = 1",
        (&class_id, &date_key),
    )
    .map_err(HandlerErr::db_update)?;
    // Holiday overrides anything already taken for the day.
    tx.execute(
        "DELETE FROM attendance_records WHERE class_id = ? AND date = ?",
        (&class_id, &date_key),
    )
    .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "date": date_key, "status": "holiday" }))
}

fn class_of_student(conn: &Connection, student_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT class_id FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .ok_or_else(|| HandlerErr::not_found("student not found"))
}

/// Teachers may touch only their own class; admins any; students none
/// (unless explicitly allowed by the caller).
fn require_student_access(
    conn: &Connection,
    params: &serde_json::Value,
    student_id: &str,
    allow_self: bool,
) -> Result<String, HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    let class_id = class_of_student(conn, student_id)?;
    match ctx.role {
        Role::Admin => Ok(class_id),
        Role::Teacher => {
            let (_ctx, assigned) = auth::require_class_teacher(conn, params)?;
            if assigned == class_id {
                Ok(class_id)
            } else {
                Err(HandlerErr::forbidden("student is not in your class"))
            }
        }
        Role::Student => {
            if allow_self && ctx.user_id == student_id {
                Ok(class_id)
            } else {
                Err(HandlerErr::forbidden("teacher or admin access required"))
            }
        }
    }
}

fn update_student_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let class_id = require_student_access(conn, params, &student_id, false)?;
    let (date_key, date) = parse_date(params, "date")?;
    let status = required_str(params, "status")?;
    let Some(mark) = Mark::parse(&status) else {
        return Err(HandlerErr::bad_params("status must be present or absent"));
    };
    if calendar::is_sunday(date) {
        return Err(HandlerErr::invalid_date(
            "attendance cannot be edited on a Sunday",
        ));
    }
    if day_is_holiday(conn, &class_id, &date_key)? {
        return Err(HandlerErr::conflict("day is marked as a holiday"));
    }
    conn.execute(
        "INSERT INTO attendance_records(class_id, student_id, date, status)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, date) DO UPDATE SET
           status = excluded.status",
        (&class_id, &student_id, &date_key, mark.as_str()),
    )
    .map_err(HandlerErr::db_update)?;
    conn.execute(
        "INSERT INTO attendance_days(class_id, date, is_holiday) VALUES(?, ?, 0)
         ON CONFLICT(class_id, date) DO NOTHING",
        (&class_id, &date_key),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "studentId": student_id, "date": date_key, "status": mark.as_str() }))
}

fn student_month_logs(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let class_id = require_student_access(conn, params, &student_id, true)?;
    let (year, month) = parse_year_month(params)?;
    let Some(grid) = calendar::month_grid(year, month) else {
        return Err(HandlerErr::bad_params("invalid month"));
    };

    let from = calendar::date_key(year, month, 1);
    let to = calendar::date_key(year, month, grid.days_in_month);

    let mut record_stmt = conn
        .prepare(
            "SELECT date, status FROM attendance_records
             WHERE student_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(HandlerErr::db_query)?;
    let mut by_date: HashMap<String, String> = HashMap::new();
    let rows = record_stmt
        .query_map((&student_id, &from, &to), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for (date, status) in rows {
        by_date.insert(date, status);
    }
    let mut holiday_stmt = conn
        .prepare(
            "SELECT date FROM attendance_days
             WHERE class_id = ? AND is_holiday = 1 AND date >= ? AND date <= ?",
        )
        .map_err(HandlerErr::db_query)?;
    let holidays = holiday_stmt
        .query_map((&class_id, &from, &to), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for date in holidays {
        by_date.insert(date, "holiday".to_string());
    }

    let logs: Vec<serde_json::Value> = grid
        .cells
        .iter()
        .map(|cell| {
            let status = by_date.get(&cell.date).cloned();
            json!({
                "date": cell.date,
                "day": cell.day,
                "isSunday": cell.is_sunday,
                "status": status,
            })
        })
        .collect();
    let stats = calendar::month_stats(by_date.values().map(|s| s.as_str()));

    Ok(json!({
        "studentId": student_id,
        "year": year,
        "month": month,
        "logs": logs,
        "stats": stats,
    }))
}

/// Per-month present/absent counts across everything on record, keyed by
/// calendar month number. Shared with the admin drill-down and profile.
pub fn student_month_aggregates(
    conn: &Connection,
    student_id: &str,
) -> Result<HashMap<u32, (i64, i64)>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT CAST(substr(date, 6, 2) AS INTEGER),
                    SUM(CASE WHEN status = 'present' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'absent' THEN 1 ELSE 0 END)
             FROM attendance_records
             WHERE student_id = ?
             GROUP BY 1",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, i64>(0)? as u32,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(rows.into_iter().map(|(m, p, a)| (m, (p, a))).collect())
}

// --- wizard session methods (need mutable state) ---

fn session_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<TakeSession, HandlerErr> {
        let conn = db_conn(state)?;
        let (_ctx, class_id) = auth::require_class_access(conn, params)?;
        let (date_key, date) = parse_date(params, "date")?;
        let mode_s = required_str(params, "mode")?;
        let Some(mode) = Mode::parse(&mode_s) else {
            return Err(HandlerErr::bad_params("mode must be taking or edit"));
        };
        if calendar::is_sunday(date) {
            return Err(HandlerErr::invalid_date(
                "attendance cannot be taken on a Sunday",
            ));
        }
        if day_is_holiday(conn, &class_id, &date_key)? {
            return Err(HandlerErr::conflict("day is marked as a holiday"));
        }
        let roster = load_roster(conn, &class_id)?;
        if roster.is_empty() {
            return Err(HandlerErr::conflict("class has no students"));
        }
        let marks = marks_for_date(conn, &class_id, &date_key)?;
        Ok(TakeSession::new(class_id, date_key, mode, roster, marks))
    };
    match body() {
        Ok(session) => {
            let snapshot = session.state_json();
            state.take_session = Some(session);
            ok(&req.id, snapshot)
        }
        Err(e) => e.response(&req.id),
    }
}

fn with_session<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&mut TakeSession) -> Result<(), HandlerErr>,
{
    let Some(session) = state.take_session.as_mut() else {
        return err(&req.id, "not_found", "no attendance session in progress", None);
    };
    match f(session) {
        Ok(()) => ok(&req.id, session.state_json()),
        Err(e) => e.response(&req.id),
    }
}

fn session_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = req.params.clone();
    with_session(state, req, |session| {
        let status = required_str(&params, "status")?;
        let Some(mark) = Mark::parse(&status) else {
            return Err(HandlerErr::bad_params("status must be present or absent"));
        };
        session.mark(mark).map_err(HandlerErr::conflict)
    })
}

fn session_undo(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_session(state, req, |session| {
        session.undo();
        Ok(())
    })
}

fn session_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = req.params.clone();
    with_session(state, req, |session| {
        let student_id = required_str(&params, "studentId")?;
        let status = required_str(&params, "status")?;
        let Some(mark) = Mark::parse(&status) else {
            return Err(HandlerErr::bad_params("status must be present or absent"));
        };
        session.set(&student_id, mark).map_err(HandlerErr::not_found)
    })
}

fn session_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.take_session.as_ref() {
        Some(session) => ok(&req.id, session.state_json()),
        None => err(&req.id, "not_found", "no attendance session in progress", None),
    }
}

fn session_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.take_session.as_ref() else {
        return err(&req.id, "not_found", "no attendance session in progress", None);
    };
    let class_id = session.class_id.clone();
    let date_key = session.date.clone();
    let records = session.records();
    let Some(date) = calendar::parse_date(&date_key) else {
        return err(&req.id, "invalid_date", "session date is corrupt", None);
    };

    let result = match db_conn(state) {
        Ok(conn) => save_batch(conn, &class_id, &date_key, date, &records),
        Err(e) => Err(e),
    };
    match result {
        Ok(saved) => {
            state.take_session = None;
            tracing::info!(class_id = %class_id, date = %date_key, saved, "attendance batch saved");
            ok(
                &req.id,
                json!({ "saved": saved, "date": date_key, "classId": class_id }),
            )
        }
        Err(e) => e.response(&req.id),
    }
}

fn session_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let existed = state.take_session.take().is_some();
    ok(&req.id, json!({ "cancelled": existed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.monthSummary" => Some(respond(state, req, month_summary)),
        "attendance.rosterForDate" => Some(respond(state, req, roster_for_date)),
        "attendance.saveBatch" => Some(respond(state, req, save_batch_handler)),
        "attendance.markHoliday" => Some(respond(state, req, mark_holiday)),
        "attendance.updateStudentDay" => Some(respond(state, req, update_student_day)),
        "attendance.studentMonthLogs" => Some(respond(state, req, student_month_logs)),
        "attendance.sessionStart" => Some(session_start(state, req)),
        "attendance.sessionMark" => Some(session_mark(state, req)),
        "attendance.sessionUndo" => Some(session_undo(state, req)),
        "attendance.sessionSet" => Some(session_set(state, req)),
        "attendance.sessionState" => Some(session_state(state, req)),
        "attendance.sessionSubmit" => Some(session_submit(state, req)),
        "attendance.sessionCancel" => Some(session_cancel(state, req)),
        _ => None,
    }
}
