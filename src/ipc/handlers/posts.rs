use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::helpers::{db_conn, required_array, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

const ITEM_ORDER: [&str; 3] = ["classwork", "homework", "update"];

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

fn store_attachment(
    workspace: &Path,
    file_name: &str,
    data_b64: &str,
) -> Result<String, HandlerErr> {
    let bytes = BASE64
        .decode(data_b64)
        .map_err(|_| HandlerErr::bad_params("attachment data is not valid base64"))?;
    let dir = workspace.join(db::ASSETS_DIR).join("posts");
    std::fs::create_dir_all(&dir)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    let rel = format!(
        "{}/posts/{}-{}",
        db::ASSETS_DIR,
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    );
    std::fs::write(workspace.join(&rel), bytes)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    Ok(rel)
}

fn teacher_role_label(assigned: &Option<String>) -> &'static str {
    if assigned.is_some() {
        "Class Teacher"
    } else {
        "Subject Teacher"
    }
}

fn create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let (ctx, assigned) = auth::require_teacher(conn, params)?;
        let post_date = required_str(params, "date")?;
        if crate::calendar::parse_date(&post_date).is_none() {
            return Err(HandlerErr::invalid_date("date must be YYYY-MM-DD"));
        }
        let post_type = required_str(params, "postType")?;

        // Resolve targets up front so an invalid request writes nothing.
        let mut target_classes: Vec<String> = Vec::new();
        let mut all_classes = false;
        match post_type.as_str() {
            "daily" => {
                let Some(class_id) = assigned.clone() else {
                    return Err(HandlerErr::forbidden(
                        "daily updates are for class teachers",
                    ));
                };
                target_classes.push(class_id);
            }
            "general" => {
                let targets = required_array(params, "targetClasses")?;
                for t in targets {
                    match t.as_str() {
                        Some("all") => all_classes = true,
                        Some(id) => target_classes.push(id.to_string()),
                        None => return Err(HandlerErr::bad_params("targetClasses must be strings")),
                    }
                }
                if !all_classes && target_classes.is_empty() {
                    return Err(HandlerErr::bad_params("select at least one class"));
                }
            }
            _ => return Err(HandlerErr::bad_params("postType must be daily or general")),
        }

        let items = required_array(params, "items")?;
        let allowed_types: &[&str] = if post_type == "daily" {
            &["classwork", "homework", "defaulter"]
        } else {
            &["update"]
        };

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
        let batch_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO post_batches(id, teacher_id, post_date, post_type, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                &batch_id,
                &ctx.user_id,
                &post_date,
                &post_type,
                Utc::now().to_rfc3339(),
            ),
        )
        .map_err(HandlerErr::db_update)?;
        if all_classes {
            tx.execute(
                "INSERT INTO post_batch_classes(batch_id, class_id, all_classes) VALUES(?, NULL, 1)",
                [&batch_id],
            )
            .map_err(HandlerErr::db_update)?;
        } else {
            for class_id in &target_classes {
                tx.execute(
                    "INSERT INTO post_batch_classes(batch_id, class_id, all_classes) VALUES(?, ?, 0)",
                    (&batch_id, class_id),
                )
                .map_err(HandlerErr::db_update)?;
            }
        }

        let mut saved_items = 0usize;
        for (idx, item) in items.iter().enumerate() {
            let heading = item
                .get("heading")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if heading.is_empty() {
                continue; // empty repeater rows are skipped, not rejected
            }
            let item_type = item
                .get("itemType")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if !allowed_types.contains(&item_type) {
                return Err(HandlerErr::bad_params(format!(
                    "item type {} not allowed in a {} post",
                    item_type, post_type
                )));
            }
            let content = item.get("content").and_then(|v| v.as_str());
            let item_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO post_items(id, batch_id, item_type, heading, content, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &item_id,
                    &batch_id,
                    item_type,
                    &heading,
                    content,
                    idx as i64,
                ),
            )
            .map_err(HandlerErr::db_update)?;

            if item_type == "defaulter" {
                if let Some(ids) = item.get("studentIds").and_then(|v| v.as_array()) {
                    for sid in ids.iter().filter_map(|v| v.as_str()) {
                        tx.execute(
                            "INSERT OR IGNORE INTO post_defaulters(item_id, student_id) VALUES(?, ?)",
                            (&item_id, sid),
                        )
                        .map_err(HandlerErr::db_update)?;
                    }
                }
            }

            if let Some(files) = item.get("attachments").and_then(|v| v.as_array()) {
                for file in files {
                    let name = file
                        .get("fileName")
                        .and_then(|v| v.as_str())
                        .unwrap_or("attachment");
                    let data = file
                        .get("data")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| HandlerErr::bad_params("attachment missing data"))?;
                    let path = store_attachment(&workspace, name, data)?;
                    tx.execute(
                        "INSERT INTO post_item_files(id, item_id, path) VALUES(?, ?, ?)",
                        (Uuid::new_v4().to_string(), &item_id, &path),
                    )
                    .map_err(HandlerErr::db_update)?;
                }
            }
            saved_items += 1;
        }

        if saved_items == 0 {
            return Err(HandlerErr::bad_params("post has no items"));
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        tracing::info!(batch_id = %batch_id, items = saved_items, "post published");
        Ok(json!({ "batchId": batch_id, "items": saved_items }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn item_files(conn: &Connection, item_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT path FROM post_item_files WHERE item_id = ?")
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([item_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)
}

fn defaulter_names(conn: &Connection, item_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.name FROM post_defaulters d
             JOIN students s ON s.id = d.student_id
             WHERE d.item_id = ?
             ORDER BY s.roll_no IS NULL, s.roll_no, s.name",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([item_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)
}

fn batch_class_names(conn: &Connection, batch_id: &str) -> Result<Vec<String>, HandlerErr> {
    let all: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM post_batch_classes WHERE batch_id = ? AND all_classes = 1",
            [batch_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if all > 0 {
        return Ok(vec!["All Classes".to_string()]);
    }
    let mut stmt = conn
        .prepare(
            "SELECT c.name FROM post_batch_classes b
             JOIN classes c ON c.id = b.class_id
             WHERE b.batch_id = ?
             ORDER BY c.sort_order, c.name",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([batch_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)
}

fn batch_items_json(
    conn: &Connection,
    batch_id: &str,
) -> Result<(Vec<serde_json::Value>, Vec<serde_json::Value>), HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, item_type, heading, content FROM post_items
             WHERE batch_id = ?
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([batch_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut regular: Vec<(usize, serde_json::Value)> = Vec::new();
    let mut defaulters: Vec<serde_json::Value> = Vec::new();
    for (item_id, item_type, heading, content) in rows {
        if item_type == "defaulter" {
            defaulters.push(json!({
                "itemId": item_id,
                "itemType": item_type,
                "heading": heading,
                "defaulters": defaulter_names(conn, &item_id)?,
            }));
        } else {
            let rank = ITEM_ORDER
                .iter()
                .position(|t| *t == item_type)
                .unwrap_or(ITEM_ORDER.len());
            regular.push((
                rank,
                json!({
                    "itemId": item_id,
                    "itemType": item_type,
                    "heading": heading,
                    "content": content,
                    "attachments": item_files(conn, &item_id)?,
                }),
            ));
        }
    }
    // Classwork first, then homework, then general updates.
    regular.sort_by_key(|(rank, _)| *rank);
    Ok((regular.into_iter().map(|(_, v)| v).collect(), defaulters))
}

fn recent(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (ctx, _assigned) = auth::require_teacher(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, post_date, post_type, created_at FROM post_batches
             WHERE teacher_id = ?
             ORDER BY created_at DESC
             LIMIT 30",
        )
        .map_err(HandlerErr::db_query)?;
    let batches = stmt
        .query_map([&ctx.user_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut posts = Vec::with_capacity(batches.len());
    for (batch_id, post_date, post_type, created_at) in batches {
        let (items, defaulters) = batch_items_json(conn, &batch_id)?;
        posts.push(json!({
            "batchId": batch_id,
            "postDate": post_date,
            "postType": post_type,
            "createdAt": created_at,
            "classes": batch_class_names(conn, &batch_id)?,
            "items": items,
            "defaulterItems": defaulters,
        }));
    }
    Ok(json!({ "posts": posts }))
}

fn owned_batch(
    conn: &Connection,
    teacher_id: &str,
    batch_id: &str,
) -> Result<(), HandlerErr> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM post_batches WHERE id = ?",
            [batch_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    match owner {
        None => Err(HandlerErr::not_found("post not found")),
        Some(owner) if owner == teacher_id => Ok(()),
        Some(_) => Err(HandlerErr::forbidden("post belongs to another teacher")),
    }
}

fn delete_item_rows(conn: &Connection, item_id: &str) -> Result<(), HandlerErr> {
    conn.execute("DELETE FROM post_item_files WHERE item_id = ?", [item_id])
        .map_err(HandlerErr::db_update)?;
    conn.execute("DELETE FROM post_defaulters WHERE item_id = ?", [item_id])
        .map_err(HandlerErr::db_update)?;
    conn.execute("DELETE FROM post_items WHERE id = ?", [item_id])
        .map_err(HandlerErr::db_update)?;
    Ok(())
}

fn delete_batch(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (ctx, _assigned) = auth::require_teacher(conn, params)?;
    let batch_id = required_str(params, "batchId")?;
    owned_batch(conn, &ctx.user_id, &batch_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut stmt = tx
        .prepare("SELECT id FROM post_items WHERE batch_id = ?")
        .map_err(HandlerErr::db_query)?;
    let item_ids = stmt
        .query_map([&batch_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    drop(stmt);
    for item_id in &item_ids {
        delete_item_rows(&tx, item_id)?;
    }
    tx.execute("DELETE FROM post_batch_classes WHERE batch_id = ?", [&batch_id])
        .map_err(HandlerErr::db_update)?;
    tx.execute("DELETE FROM post_batches WHERE id = ?", [&batch_id])
        .map_err(HandlerErr::db_update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "removed": true }))
}

fn delete_item(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (ctx, _assigned) = auth::require_teacher(conn, params)?;
    let item_id = required_str(params, "itemId")?;
    let batch_id: Option<String> = conn
        .query_row(
            "SELECT batch_id FROM post_items WHERE id = ?",
            [&item_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(batch_id) = batch_id else {
        return Err(HandlerErr::not_found("item not found"));
    };
    owned_batch(conn, &ctx.user_id, &batch_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    delete_item_rows(&tx, &item_id)?;
    let remaining: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM post_items WHERE batch_id = ?",
            [&batch_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let batch_removed = if remaining == 0 {
        tx.execute("DELETE FROM post_batch_classes WHERE batch_id = ?", [&batch_id])
            .map_err(HandlerErr::db_update)?;
        tx.execute("DELETE FROM post_batches WHERE id = ?", [&batch_id])
            .map_err(HandlerErr::db_update)?;
        true
    } else {
        false
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "removed": true, "batchRemoved": batch_removed }))
}

fn work_feed(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    let class_id = match ctx.role {
        Role::Student => {
            let (_ctx, class_id) = auth::require_student(conn, params)?;
            class_id
        }
        Role::Teacher => {
            let (_ctx, class_id) = auth::require_class_teacher(conn, params)?;
            class_id
        }
        Role::Admin => required_str(params, "classId")?,
    };

    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT b.id, b.post_date, b.created_at, t.name, t.profile_pic,
                    t.assigned_class_id
             FROM post_batches b
             JOIN post_batch_classes pbc ON pbc.batch_id = b.id
             JOIN teachers t ON t.id = b.teacher_id
             WHERE pbc.all_classes = 1 OR pbc.class_id = ?
             ORDER BY b.post_date DESC, b.created_at DESC
             LIMIT 60",
        )
        .map_err(HandlerErr::db_query)?;
    let batches = stmt
        .query_map([&class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut posts = Vec::with_capacity(batches.len());
    for (batch_id, post_date, created_at, teacher_name, teacher_pic, assigned) in batches {
        let (items, defaulters) = batch_items_json(conn, &batch_id)?;
        posts.push(json!({
            "postId": batch_id,
            "postDate": post_date,
            "createdAt": created_at,
            "teacherName": teacher_name,
            "teacherPic": teacher_pic,
            "teacherRole": teacher_role_label(&assigned),
            "items": items,
            "defaulterItems": defaulters,
        }));
    }
    Ok(json!({ "classId": class_id, "posts": posts }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "posts.create" => Some(create(state, req)),
        "posts.recent" => Some(respond(state, req, recent)),
        "posts.deleteBatch" => Some(respond(state, req, delete_batch)),
        "posts.deleteItem" => Some(respond(state, req, delete_item)),
        "work.feed" => Some(respond(state, req, work_feed)),
        _ => None,
    }
}
