use crate::ipc::error::ok;
use crate::ipc::handlers::{assets, auth};
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::media;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

pub const CATEGORIES: [&str; 4] = ["academic", "sports", "cultural", "infrastructure"];

fn validate_category(category: &str) -> Result<(), HandlerErr> {
    if CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!(
            "category must be one of: {}",
            CATEGORIES.join(", ")
        )))
    }
}

fn photos_json(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, category, caption, image_url, created_at
             FROM gallery_photos ORDER BY created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "category": r.get::<_, String>(1)?,
            "caption": r.get::<_, Option<String>>(2)?,
            "imageUrl": r.get::<_, String>(3)?,
            "createdAt": r.get::<_, String>(4)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

fn videos_json(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, category, caption, video_url, created_at
             FROM gallery_videos ORDER BY created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([], |r| {
        let url: String = r.get(3)?;
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "category": r.get::<_, String>(1)?,
            "caption": r.get::<_, Option<String>>(2)?,
            "thumbnailUrl": media::thumbnail_url(&url),
            "videoUrl": url,
            "createdAt": r.get::<_, String>(4)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

fn feed(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "images": photos_json(conn)?,
        "videos": videos_json(conn)?,
    }))
}

fn save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        auth::require_admin(conn, params)?;
        let kind = required_str(params, "type")?;
        let category = required_str(params, "category")?;
        validate_category(&category)?;
        let caption = optional_str(params, "caption");
        let created_at = Utc::now().to_rfc3339();

        match kind.as_str() {
            "photo" => {
                let Some(images) = params.get("images").and_then(|v| v.as_array()) else {
                    return Err(HandlerErr::bad_params("select at least one image"));
                };
                if images.is_empty() {
                    return Err(HandlerErr::bad_params("select at least one image"));
                }
                let mut ids = Vec::with_capacity(images.len());
                for image in images {
                    let file_name = image
                        .get("fileName")
                        .and_then(|v| v.as_str())
                        .unwrap_or("photo");
                    let data = image
                        .get("data")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| HandlerErr::bad_params("image missing data"))?;
                    let path = assets::store_image(&workspace, "gallery", file_name, data)?;
                    let id = Uuid::new_v4().to_string();
                    conn.execute(
                        "INSERT INTO gallery_photos(id, category, caption, image_url, created_at)
                         VALUES(?, ?, ?, ?, ?)",
                        (&id, &category, &caption, &path, &created_at),
                    )
                    .map_err(HandlerErr::db_update)?;
                    ids.push(id);
                }
                Ok(json!({ "type": "photo", "ids": ids }))
            }
            "video" => {
                let raw = required_str(params, "videoUrl")?;
                // Any recognized YouTube shape is stored in embed form.
                let url = media::embed_url(&raw);
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO gallery_videos(id, category, caption, video_url, created_at)
                     VALUES(?, ?, ?, ?, ?)",
                    (&id, &category, &caption, &url, &created_at),
                )
                .map_err(HandlerErr::db_update)?;
                Ok(json!({ "type": "video", "id": id, "videoUrl": url }))
            }
            _ => Err(HandlerErr::bad_params("type must be photo or video")),
        }
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn history(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let mut items: Vec<serde_json::Value> = Vec::new();
    for photo in photos_json(conn)? {
        items.push(json!({
            "id": photo["id"],
            "type": "photo",
            "category": photo["category"],
            "caption": photo["caption"],
            "url": photo["imageUrl"],
            "createdAt": photo["createdAt"],
        }));
    }
    for video in videos_json(conn)? {
        items.push(json!({
            "id": video["id"],
            "type": "video",
            "category": video["category"],
            "caption": video["caption"],
            "url": video["videoUrl"],
            "createdAt": video["createdAt"],
        }));
    }
    items.sort_by(|a, b| {
        let ka = a["createdAt"].as_str().unwrap_or("");
        let kb = b["createdAt"].as_str().unwrap_or("");
        kb.cmp(ka)
    });
    Ok(json!({ "items": items }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    auth::require_admin(conn, params)?;
    let id = required_str(params, "id")?;
    let kind = required_str(params, "type")?;
    let table = match kind.as_str() {
        "photo" => "gallery_photos",
        "video" => "gallery_videos",
        _ => return Err(HandlerErr::bad_params("type must be photo or video")),
    };
    let removed = conn
        .execute(&format!("DELETE FROM {} WHERE id = ?", table), [&id])
        .map_err(HandlerErr::db_update)?;
    if removed == 0 {
        return Err(HandlerErr::not_found("gallery item not found"));
    }
    Ok(json!({ "removed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gallery.feed" => Some(respond(state, req, feed)),
        "gallery.save" => Some(save(state, req)),
        "gallery.history" => Some(respond(state, req, history)),
        "gallery.delete" => Some(respond(state, req, delete)),
        _ => None,
    }
}
