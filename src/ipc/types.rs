use std::path::PathBuf;

use crate::wizard::TakeSession;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// The single in-flight attendance-taking wizard, if any.
    pub take_session: Option<TakeSession>,
}
