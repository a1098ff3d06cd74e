use crate::backup;
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::auth;
use crate::ipc::helpers::{db_conn, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;
    let body = || -> Result<serde_json::Value, HandlerErr> {
        let conn = db_conn(state)?;
        auth::require_super_admin(conn, params)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let out_path = PathBuf::from(required_str(params, "outPath")?);
        let summary = backup::export_workspace_bundle(&workspace, &out_path)
            .map_err(|e| HandlerErr::new("export_failed", format!("{e:#}")))?;
        Ok(json!({
            "bundleFormat": summary.bundle_format,
            "dbSha256": summary.db_sha256,
            "outPath": out_path.to_string_lossy(),
        }))
    };
    match body() {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = &req.params;

    let precheck = || -> Result<(PathBuf, PathBuf), HandlerErr> {
        let conn = db_conn(state)?;
        auth::require_super_admin(conn, params)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let in_path = PathBuf::from(required_str(params, "inPath")?);
        Ok((workspace, in_path))
    };
    let (workspace, in_path) = match precheck() {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Release the live connection before swapping the database file.
    state.db = None;
    state.take_session = None;

    let imported = backup::import_workspace_bundle(&in_path, &workspace)
        .map_err(|e| HandlerErr::new("import_failed", format!("{e:#}")));
    let reopened = db::open_db(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")));
    match (imported, reopened) {
        (Ok(summary), Ok(conn)) => {
            state.db = Some(conn);
            tracing::info!(path = %in_path.to_string_lossy(), "workspace bundle imported");
            ok(
                &req.id,
                json!({ "bundleFormatDetected": summary.bundle_format_detected }),
            )
        }
        (Err(e), Ok(conn)) => {
            // Import failed but the old database is intact.
            state.db = Some(conn);
            e.response(&req.id)
        }
        (_, Err(e)) => e.response(&req.id),
    }
}

fn handle_bundle_format(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "bundleFormat": backup::BUNDLE_FORMAT }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import(state, req)),
        "backup.bundleFormat" => Some(handle_bundle_format(req)),
        _ => None,
    }
}
