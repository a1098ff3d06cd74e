use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn item(key: &str, label: &str, target: &str) -> serde_json::Value {
    json!({ "key": key, "label": label, "target": target })
}

/// Bottom-navigation entries for a role. Only class teachers get the
/// attendance shortcut; only admins get the posts console.
pub fn nav_items(role: Role, is_class_teacher: bool) -> Vec<serde_json::Value> {
    let mut items = vec![item("home", "Home", "home")];
    match role {
        Role::Student => items.push(item("work", "Work", "work")),
        Role::Teacher => {
            if is_class_teacher {
                items.push(item("attendance", "Attendance", "attendance"));
            }
        }
        Role::Admin => items.push(item("posts", "Posts", "admin-posts")),
    }
    items.push(item("updates", "Updates", "updates"));
    items.push(item("gallery", "Gallery", "gallery"));
    let profile_target = match role {
        Role::Student => "profile",
        Role::Teacher => "teacher",
        Role::Admin => "admin",
    };
    items.push(item("profile", "Profile", profile_target));
    items
}

fn model(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    let is_class_teacher = if ctx.role == Role::Teacher {
        conn.query_row(
            "SELECT assigned_class_id FROM teachers WHERE id = ?",
            [&ctx.user_id],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .flatten()
        .is_some()
    } else {
        false
    };
    Ok(json!({
        "role": ctx.role.as_str(),
        "items": nav_items(ctx.role, is_class_teacher),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "nav.model" => Some(respond(state, req, model)),
        _ => None,
    }
}
