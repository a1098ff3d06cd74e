use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{optional_bool, required_object, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn today_key() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn rows_json(
    conn: &Connection,
    sql: &str,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value>,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db_query)?;
    stmt.query_map([], map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)
}

pub(super) fn notices_json(
    conn: &Connection,
    limit: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    rows_json(
        conn,
        &format!(
            "SELECT id, title, content, image_url, created_at FROM notices
             ORDER BY created_at DESC {}",
            limit
        ),
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "content": r.get::<_, String>(2)?,
                "imageUrl": r.get::<_, Option<String>>(3)?,
                "createdAt": r.get::<_, String>(4)?,
            }))
        },
    )
}

pub(super) fn updates_json(
    conn: &Connection,
    limit: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    rows_json(
        conn,
        &format!(
            "SELECT id, update_text, image_url, created_at FROM updates
             ORDER BY created_at DESC {}",
            limit
        ),
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "updateText": r.get::<_, String>(1)?,
                "imageUrl": r.get::<_, Option<String>>(2)?,
                "createdAt": r.get::<_, String>(3)?,
            }))
        },
    )
}

pub(super) fn events_json(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    rows_json(
        conn,
        "SELECT id, title, description, event_date, image_url, created_at FROM events
         ORDER BY event_date DESC",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "description": r.get::<_, String>(2)?,
                "eventDate": r.get::<_, String>(3)?,
                "imageUrl": r.get::<_, Option<String>>(4)?,
                "createdAt": r.get::<_, String>(5)?,
            }))
        },
    )
}

/// Today's poster is date-scoped; anything older is swept on read.
pub(super) fn whats_today_json(
    conn: &Connection,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    let today = today_key();
    conn.execute("DELETE FROM whats_today WHERE posted_on <> ?", [&today])
        .map_err(HandlerErr::db_update)?;
    conn.query_row(
        "SELECT id, image_url, posted_on FROM whats_today WHERE posted_on = ?",
        [&today],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "imageUrl": r.get::<_, String>(1)?,
                "postedOn": r.get::<_, String>(2)?,
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn toppers_json(
    conn: &Connection,
    class_id: &str,
) -> Result<(bool, Vec<serde_json::Value>), HandlerErr> {
    let show: Option<i64> = conn
        .query_row(
            "SELECT show_toppers FROM class_settings WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let show = show.unwrap_or(0) != 0;

    let mut stmt = conn
        .prepare(
            "SELECT t.rank, t.student_id, t.percentage, s.name, s.profile_pic
             FROM toppers t LEFT JOIN students s ON s.id = t.student_id
             WHERE t.class_id = ?
             ORDER BY t.rank",
        )
        .map_err(HandlerErr::db_query)?;
    let toppers = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "rank": r.get::<_, i64>(0)?,
                "studentId": r.get::<_, Option<String>>(1)?,
                "percentage": r.get::<_, Option<String>>(2)?,
                "studentName": r.get::<_, Option<String>>(3)?,
                "imageUrl": r.get::<_, Option<String>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    let toppers = toppers
        .into_iter()
        .filter(|t| !t["studentId"].is_null())
        .collect();
    Ok((show, toppers))
}

fn home_feed(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let slides = rows_json(
        conn,
        "SELECT id, img_url FROM slides ORDER BY sort_order",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "imgUrl": r.get::<_, String>(1)?,
            }))
        },
    )?;
    let announcements = notices_json(conn, "LIMIT 5")?;
    let updates = updates_json(conn, "LIMIT 5")?;
    let gallery = rows_json(
        conn,
        "SELECT id, image_url FROM gallery_photos ORDER BY created_at DESC LIMIT 3",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "imageUrl": r.get::<_, String>(1)?,
            }))
        },
    )?;
    let thoughts = rows_json(
        conn,
        "SELECT id, name, position, quote, image_url FROM thoughts ORDER BY name",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "position": r.get::<_, String>(2)?,
                "quote": r.get::<_, String>(3)?,
                "imageUrl": r.get::<_, Option<String>>(4)?,
            }))
        },
    )?;
    let contacts = json!({
        "phone": crate::db::settings_get(conn, "contact.phone")
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?,
        "email": crate::db::settings_get(conn, "contact.email")
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?,
    });

    // Toppers surface only for students and class teachers of the class.
    let mut show_toppers = false;
    let mut toppers: Vec<serde_json::Value> = Vec::new();
    let mut user_details = json!(null);
    if let Some(ctx) = auth::optional_session(conn, params) {
        user_details = auth::user_payload(conn, ctx.role, &ctx.user_id)?;
        let topper_class = match ctx.role {
            Role::Student => user_details["classId"].as_str().map(|s| s.to_string()),
            Role::Teacher => user_details["assignedClassId"].as_str().map(|s| s.to_string()),
            Role::Admin => None,
        };
        if let Some(class_id) = topper_class {
            let (show, list) = toppers_json(conn, &class_id)?;
            show_toppers = show;
            if show {
                toppers = list;
            }
        }
    }

    Ok(json!({
        "slides": slides,
        "announcements": announcements,
        "updates": updates,
        "gallery": gallery,
        "thoughts": thoughts,
        "contacts": contacts,
        "whatsToday": whats_today_json(conn)?,
        "showToppers": show_toppers,
        "toppers": toppers,
        "userDetails": user_details,
    }))
}

fn updates_feed(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "updates": updates_json(conn, "LIMIT 30")?,
        "announcements": notices_json(conn, "LIMIT 30")?,
        "events": events_json(conn)?,
    }))
}

fn toppers_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let (show, toppers) = toppers_json(conn, &class_id)?;
    Ok(json!({
        "classId": class_id,
        "showToppers": show,
        "toppers": toppers,
    }))
}

fn toppers_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_ctx, class_id) = auth::require_class_access(conn, params)?;
    let show = optional_bool(params, "showToppers").unwrap_or(false);
    let ranks = required_object(params, "ranks")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO class_settings(class_id, show_toppers) VALUES(?, ?)
         ON CONFLICT(class_id) DO UPDATE SET show_toppers = excluded.show_toppers",
        (&class_id, show as i64),
    )
    .map_err(HandlerErr::db_update)?;

    for (rank_s, entry) in ranks {
        let Ok(rank) = rank_s.parse::<i64>() else {
            return Err(HandlerErr::bad_params("rank keys must be numeric"));
        };
        if !(1..=3).contains(&rank) {
            return Err(HandlerErr::bad_params("rank must be 1, 2 or 3"));
        }
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());
        match student_id {
            Some(sid) => {
                let belongs = tx
                    .query_row(
                        "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                        (&class_id, sid),
                        |r| r.get::<_, i64>(0),
                    )
                    .optional()
                    .map_err(HandlerErr::db_query)?
                    .is_some();
                if !belongs {
                    return Err(HandlerErr::bad_params("topper must be in the class"));
                }
                let percentage = entry
                    .get("percentage")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                tx.execute(
                    "INSERT INTO toppers(class_id, rank, student_id, percentage)
                     VALUES(?, ?, ?, ?)
                     ON CONFLICT(class_id, rank) DO UPDATE SET
                       student_id = excluded.student_id,
                       percentage = excluded.percentage",
                    (&class_id, rank, sid, percentage),
                )
                .map_err(HandlerErr::db_update)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM toppers WHERE class_id = ? AND rank = ?",
                    (&class_id, rank),
                )
                .map_err(HandlerErr::db_update)?;
            }
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "classId": class_id, "showToppers": show }))
}

fn suggestion_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (ctx, _class_id) = auth::require_student(conn, params)?;
    let message = required_str(params, "message")?;
    if message.trim().is_empty() {
        return Err(HandlerErr::bad_params("message must not be empty"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO suggestions(id, student_id, message, created_at) VALUES(?, ?, ?, ?)",
        (&id, &ctx.user_id, message.trim(), Utc::now().to_rfc3339()),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(json!({ "suggestionId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "home.feed" => Some(respond(state, req, home_feed)),
        "updates.feed" => Some(respond(state, req, updates_feed)),
        "toppers.get" => Some(respond(state, req, toppers_get)),
        "toppers.save" => Some(respond(state, req, toppers_save)),
        "suggestions.submit" => Some(respond(state, req, suggestion_submit)),
        _ => None,
    }
}
