use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{db_conn, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Decode a base64 payload into `assets/<subdir>/` and return the
/// workspace-relative path stored in the database.
pub(super) fn store_image(
    workspace: &Path,
    subdir: &str,
    file_name: &str,
    data_b64: &str,
) -> Result<String, HandlerErr> {
    let bytes = BASE64
        .decode(data_b64)
        .map_err(|_| HandlerErr::bad_params("image data is not valid base64"))?;
    let dir = workspace.join(db::ASSETS_DIR).join(subdir);
    std::fs::create_dir_all(&dir).map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    let rel = format!(
        "{}/{}/{}-{}",
        db::ASSETS_DIR,
        subdir,
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    );
    std::fs::write(workspace.join(&rel), bytes)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    Ok(rel)
}

/// Pull an optional `{ image: { fileName, data } }` out of params and store
/// it, returning the saved path.
pub(super) fn optional_image(
    workspace: &Path,
    subdir: &str,
    params: &serde_json::Value,
) -> Result<Option<String>, HandlerErr> {
    let Some(image) = params.get("image") else {
        return Ok(None);
    };
    if image.is_null() {
        return Ok(None);
    }
    let file_name = image
        .get("fileName")
        .and_then(|v| v.as_str())
        .unwrap_or("image");
    let data = image
        .get("data")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("image missing data"))?;
    Ok(Some(store_image(workspace, subdir, file_name, data)?))
}

fn update_profile_pic(
    conn: &Connection,
    role: Role,
    id: &str,
    path: &str,
) -> Result<Option<String>, HandlerErr> {
    let table = match role {
        Role::Admin => "admins",
        Role::Teacher => "teachers",
        Role::Student => "students",
    };
    let previous: Option<String> = conn
        .query_row(
            &format!("SELECT profile_pic FROM {} WHERE id = ?", table),
            [id],
            |r| r.get(0),
        )
        .map_err(|_| HandlerErr::not_found("account not found"))?;
    conn.execute(
        &format!("UPDATE {} SET profile_pic = ? WHERE id = ?", table),
        (path, id),
    )
    .map_err(HandlerErr::db_update)?;
    Ok(previous)
}

fn save_profile_image(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let ctx = auth::require_session(conn, params)?;
        let target_role_s = required_str(params, "role")?;
        let Some(target_role) = Role::parse(&target_role_s) else {
            return Err(HandlerErr::bad_params("role must be student, teacher or admin"));
        };
        let target_id = required_str(params, "id")?;

        // Admins manage everyone; others only their own picture.
        let own = ctx.role == target_role && ctx.user_id == target_id;
        if ctx.role != Role::Admin && !own {
            return Err(HandlerErr::forbidden("cannot change another profile"));
        }

        let file_name = required_str(params, "fileName")?;
        let data = required_str(params, "data")?;
        let path = store_image(&workspace, "profiles", &file_name, &data)?;
        let previous = update_profile_pic(conn, target_role, &target_id, &path)?;
        if let Some(prev) = previous {
            let _ = std::fs::remove_file(workspace.join(&prev));
        }
        Ok(json!({ "profilePic": path }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn read_asset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let rel = required_str(params, "path")?;
        // Served paths are always workspace-relative under assets/.
        if rel.contains("..") || !rel.starts_with(db::ASSETS_DIR) {
            return Err(HandlerErr::bad_params("path must be under assets/"));
        }
        let bytes = std::fs::read(workspace.join(&rel))
            .map_err(|_| HandlerErr::not_found("asset not found"))?;
        Ok(json!({ "path": rel, "data": BASE64.encode(bytes) }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assets.saveProfileImage" => Some(save_profile_image(state, req)),
        "assets.read" => Some(read_asset(state, req)),
        _ => None,
    }
}
