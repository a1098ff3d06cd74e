use crate::ipc::helpers::{optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::password;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub const SUPER_ADMIN_LEVEL: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCtx {
    pub role: Role,
    pub user_id: String,
}

/// Resolve `params.sessionToken` against the sessions table.
pub fn require_session(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<SessionCtx, HandlerErr> {
    let token = required_str(params, "sessionToken")
        .map_err(|_| HandlerErr::unauthorized("missing sessionToken"))?;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT role, user_id FROM sessions WHERE token = ?",
            [&token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((role_s, user_id)) = row else {
        return Err(HandlerErr::unauthorized("session expired or unknown"));
    };
    let Some(role) = Role::parse(&role_s) else {
        return Err(HandlerErr::unauthorized("session has an unknown role"));
    };
    Ok(SessionCtx { role, user_id })
}

pub fn admin_level(conn: &Connection, admin_id: &str) -> Result<i64, HandlerErr> {
    conn.query_row("SELECT level FROM admins WHERE id = ?", [admin_id], |r| {
        r.get(0)
    })
    .optional()
    .map_err(HandlerErr::db_query)?
    .ok_or_else(|| HandlerErr::unauthorized("admin account no longer exists"))
}

pub fn require_admin(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(SessionCtx, i64), HandlerErr> {
    let ctx = require_session(conn, params)?;
    if ctx.role != Role::Admin {
        return Err(HandlerErr::forbidden("admin access required"));
    }
    let level = admin_level(conn, &ctx.user_id)?;
    Ok((ctx, level))
}

pub fn require_super_admin(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<SessionCtx, HandlerErr> {
    let (ctx, level) = require_admin(conn, params)?;
    if level != SUPER_ADMIN_LEVEL {
        return Err(HandlerErr::forbidden("super admin access required"));
    }
    Ok(ctx)
}

pub fn require_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(SessionCtx, Option<String>), HandlerErr> {
    let ctx = require_session(conn, params)?;
    if ctx.role != Role::Teacher {
        return Err(HandlerErr::forbidden("teacher access required"));
    }
    let assigned: Option<String> = conn
        .query_row(
            "SELECT assigned_class_id FROM teachers WHERE id = ?",
            [&ctx.user_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .flatten();
    Ok((ctx, assigned))
}

/// Class teachers only; returns the class they are responsible for.
pub fn require_class_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(SessionCtx, String), HandlerErr> {
    let (ctx, assigned) = require_teacher(conn, params)?;
    match assigned {
        Some(class_id) => Ok((ctx, class_id)),
        None => Err(HandlerErr::forbidden("class teacher access required")),
    }
}

/// Class teachers and admins can both manage class data; returns the class
/// the caller may touch (admins pass `classId` explicitly).
pub fn require_class_access(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(SessionCtx, String), HandlerErr> {
    let ctx = require_session(conn, params)?;
    match ctx.role {
        Role::Teacher => {
            let (ctx, class_id) = require_class_teacher(conn, params)?;
            Ok((ctx, class_id))
        }
        Role::Admin => {
            let class_id = required_str(params, "classId")?;
            Ok((ctx, class_id))
        }
        Role::Student => Err(HandlerErr::forbidden("teacher or admin access required")),
    }
}

pub fn require_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(SessionCtx, String), HandlerErr> {
    let ctx = require_session(conn, params)?;
    if ctx.role != Role::Student {
        return Err(HandlerErr::forbidden("student access required"));
    }
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [&ctx.user_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    match class_id {
        Some(class_id) => Ok((ctx, class_id)),
        None => Err(HandlerErr::unauthorized("student account no longer exists")),
    }
}

fn class_name(conn: &Connection, class_id: &str) -> Result<Option<String>, HandlerErr> {
    conn.query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| {
        r.get(0)
    })
    .optional()
    .map_err(HandlerErr::db_query)
}

/// Role-shaped user payload shared by login and resume.
pub fn user_payload(
    conn: &Connection,
    role: Role,
    user_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    match role {
        Role::Admin => {
            let row: Option<(String, Option<String>, i64, Option<String>)> = conn
                .query_row(
                    "SELECT name, contact, level, profile_pic FROM admins WHERE id = ?",
                    [user_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()
                .map_err(HandlerErr::db_query)?;
            let Some((name, contact, level, pic)) = row else {
                return Err(HandlerErr::unauthorized("account no longer exists"));
            };
            Ok(json!({
                "id": user_id,
                "name": name,
                "role": "admin",
                "level": level,
                "contact": contact,
                "profilePic": pic,
            }))
        }
        Role::Teacher => {
            let row: Option<(String, Option<String>, Option<String>, Option<String>, Option<String>)> =
                conn.query_row(
                    "SELECT name, contact, assigned_class_id, subject_code, profile_pic
                     FROM teachers WHERE id = ?",
                    [user_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()
                .map_err(HandlerErr::db_query)?;
            let Some((name, contact, assigned, subject, pic)) = row else {
                return Err(HandlerErr::unauthorized("account no longer exists"));
            };
            let assigned_name = match assigned.as_deref() {
                Some(cid) => class_name(conn, cid)?,
                None => None,
            };
            Ok(json!({
                "id": user_id,
                "name": name,
                "role": "teacher",
                "contact": contact,
                "assignedClassId": assigned,
                "assignedClassName": assigned_name,
                "subjectCode": subject,
                "profilePic": pic,
            }))
        }
        Role::Student => {
            let row: Option<(String, String, Option<i64>, String, Option<String>)> = conn
                .query_row(
                    "SELECT name, class_id, roll_no, login_id, profile_pic
                     FROM students WHERE id = ?",
                    [user_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()
                .map_err(HandlerErr::db_query)?;
            let Some((name, class_id, roll_no, login_id, pic)) = row else {
                return Err(HandlerErr::unauthorized("account no longer exists"));
            };
            let cname = class_name(conn, &class_id)?;
            Ok(json!({
                "id": user_id,
                "name": name,
                "role": "student",
                "classId": class_id,
                "className": cname,
                "rollNo": roll_no,
                "loginId": login_id,
                "profilePic": pic,
            }))
        }
    }
}

fn bootstrap(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let login_id = required_str(params, "loginId")?;
    let password_plain = required_str(params, "password")?;

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM admins", [], |r| r.get(0))
        .map_err(HandlerErr::db_query)?;
    if existing > 0 {
        return Err(HandlerErr::conflict("workspace already has an admin"));
    }

    let hash = password::hash(&password_plain)
        .map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO admins(id, name, login_id, password_hash, level) VALUES(?, ?, ?, ?, ?)",
        (&id, &name, &login_id, &hash, SUPER_ADMIN_LEVEL),
    )
    .map_err(HandlerErr::db_update)?;
    tracing::info!(login_id = %login_id, "bootstrap super admin created");
    Ok(json!({ "adminId": id }))
}

fn login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let login_id = required_str(params, "loginId")?;
    let password_plain = required_str(params, "password")?;
    let role_s = required_str(params, "role")?;
    let Some(role) = Role::parse(&role_s) else {
        return Err(HandlerErr::bad_params("role must be student, teacher or admin"));
    };

    let denied = || HandlerErr::unauthorized("invalid id or password");

    let row: Option<(String, String)> = match role {
        Role::Admin => conn
            .query_row(
                "SELECT id, password_hash FROM admins WHERE login_id = ?",
                [&login_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db_query)?,
        Role::Teacher => conn
            .query_row(
                "SELECT id, password_hash FROM teachers WHERE login_id = ?",
                [&login_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db_query)?,
        Role::Student => {
            // A student signs in against their class; the same login id may
            // exist in another class.
            let class_id = required_str(params, "classId")?;
            conn.query_row(
                "SELECT id, password_hash FROM students WHERE class_id = ? AND login_id = ?",
                (&class_id, &login_id),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db_query)?
        }
    };

    let Some((user_id, stored_hash)) = row else {
        return Err(denied());
    };
    if !password::verify(&password_plain, &stored_hash) {
        tracing::info!(role = role.as_str(), login_id = %login_id, "rejected login");
        return Err(denied());
    }

    let token = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sessions(token, role, user_id, created_at) VALUES(?, ?, ?, ?)",
        (&token, role.as_str(), &user_id, Utc::now().to_rfc3339()),
    )
    .map_err(HandlerErr::db_update)?;

    let user = user_payload(conn, role, &user_id)?;
    Ok(json!({ "sessionToken": token, "user": user }))
}

fn resume(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = required_str(params, "token").or_else(|_| required_str(params, "sessionToken"))?;
    let probe = json!({ "sessionToken": token });
    let ctx = require_session(conn, &probe)?;
    let user = user_payload(conn, ctx.role, &ctx.user_id)?;
    Ok(json!({ "sessionToken": token, "user": user }))
}

fn logout(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = required_str(params, "token").or_else(|_| required_str(params, "sessionToken"))?;
    let removed = conn
        .execute("DELETE FROM sessions WHERE token = ?", [&token])
        .map_err(HandlerErr::db_update)?;
    Ok(json!({ "removed": removed > 0 }))
}

/// Optional caller identity for feeds that adapt to the viewer but stay
/// readable logged out.
pub fn optional_session(conn: &Connection, params: &serde_json::Value) -> Option<SessionCtx> {
    if optional_str(params, "sessionToken").is_none() {
        return None;
    }
    require_session(conn, params).ok()
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.bootstrap" => Some(respond(state, req, bootstrap)),
        "auth.login" => Some(respond(state, req, login)),
        "auth.resume" => Some(respond(state, req, resume)),
        "auth.logout" => Some(respond(state, req, logout)),
        _ => None,
    }
}
