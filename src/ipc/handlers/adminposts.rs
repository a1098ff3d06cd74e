use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::{assets, auth, feed};
use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn workspace_of(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn fetch_all(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    Ok(json!({
        "notices": feed::notices_json(conn, "")?,
        "updates": feed::updates_json(conn, "")?,
        "events": feed::events_json(conn)?,
        "whatsToday": feed::whats_today_json(conn)?,
    }))
}

fn save_notice(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = workspace_of(state)?;
        auth::require_admin(conn, params)?;
        let title = required_str(params, "title")?;
        let content = required_str(params, "content")?;
        let image = assets::optional_image(&workspace, "uploads", params)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO notices(id, title, content, image_url, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (&id, &title, &content, &image, now()),
        )
        .map_err(HandlerErr::db_update)?;
        Ok(json!({ "id": id }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn save_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = workspace_of(state)?;
        auth::require_admin(conn, params)?;
        let text = required_str(params, "text")?;
        let image = assets::optional_image(&workspace, "uploads", params)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO updates(id, update_text, image_url, created_at)
             VALUES(?, ?, ?, ?)",
            (&id, &text, &image, now()),
        )
        .map_err(HandlerErr::db_update)?;
        Ok(json!({ "id": id }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn save_event(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = workspace_of(state)?;
        auth::require_admin(conn, params)?;
        let title = required_str(params, "title")?;
        let description = required_str(params, "description")?;
        let date = required_str(params, "date")?;
        if crate::calendar::parse_date(&date).is_none() {
            return Err(HandlerErr::invalid_date("date must be YYYY-MM-DD"));
        }
        let image = assets::optional_image(&workspace, "uploads", params)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO events(id, title, description, event_date, image_url, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&id, &title, &description, &date, &image, now()),
        )
        .map_err(HandlerErr::db_update)?;
        Ok(json!({ "id": id }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn save_whats_today(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = workspace_of(state)?;
        auth::require_admin(conn, params)?;
        let Some(image) = assets::optional_image(&workspace, "uploads", params)? else {
            return Err(HandlerErr::bad_params("missing image"));
        };
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        // One live poster at a time.
        conn.execute("DELETE FROM whats_today", [])
            .map_err(HandlerErr::db_update)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO whats_today(id, image_url, posted_on) VALUES(?, ?, ?)",
            (&id, &image, &today),
        )
        .map_err(HandlerErr::db_update)?;
        Ok(json!({ "id": id, "imageUrl": image, "postedOn": today }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn save_slide(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = workspace_of(state)?;
        auth::require_admin(conn, params)?;
        let Some(image) = assets::optional_image(&workspace, "slides", params)? else {
            return Err(HandlerErr::bad_params("missing image"));
        };
        let next_order: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM slides",
                [],
                |r| r.get(0),
            )
            .map_err(HandlerErr::db_query)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO slides(id, img_url, sort_order) VALUES(?, ?, ?)",
            (&id, &image, next_order),
        )
        .map_err(HandlerErr::db_update)?;
        Ok(json!({ "id": id, "imgUrl": image }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn delete_slide(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let id = required_str(params, "slideId")?;
    let removed = conn
        .execute("DELETE FROM slides WHERE id = ?", [&id])
        .map_err(HandlerErr::db_update)?;
    if removed == 0 {
        return Err(HandlerErr::not_found("slide not found"));
    }
    Ok(json!({ "removed": true }))
}

fn delete_post(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let id = required_str(params, "id")?;
    let kind = required_str(params, "type")?;
    let table = match kind.as_str() {
        "notice" => "notices",
        "update" => "updates",
        "event" => "events",
        _ => return Err(HandlerErr::bad_params("type must be notice, update or event")),
    };
    let removed = conn
        .execute(&format!("DELETE FROM {} WHERE id = ?", table), [&id])
        .map_err(HandlerErr::db_update)?;
    if removed == 0 {
        return Err(HandlerErr::not_found("post not found"));
    }
    Ok(json!({ "removed": true }))
}

fn save_contacts(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    auth::require_super_admin(conn, params)?;
    for (key, setting) in [("phone", "contact.phone"), ("email", "contact.email")] {
        if let Some(value) = params.get(key).and_then(|v| v.as_str()) {
            db::settings_set(conn, setting, value)
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        }
    }
    Ok(json!({ "saved": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "adminPosts.fetchAll" => Some(respond(state, req, fetch_all)),
        "adminPosts.saveNotice" => Some(save_notice(state, req)),
        "adminPosts.saveUpdate" => Some(save_update(state, req)),
        "adminPosts.saveEvent" => Some(save_event(state, req)),
        "adminPosts.saveWhatsToday" => Some(save_whats_today(state, req)),
        "adminPosts.saveSlide" => Some(save_slide(state, req)),
        "adminPosts.deleteSlide" => Some(respond(state, req, delete_slide)),
        "adminPosts.delete" => Some(respond(state, req, delete_post)),
        "adminPosts.saveContacts" => Some(respond(state, req, save_contacts)),
        _ => None,
    }
}
