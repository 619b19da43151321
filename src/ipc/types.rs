use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line of the wire protocol: `{"id", "method", "params"}`. Params are
/// left as raw JSON; each handler pulls out what it needs.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Both fields stay `None` until `workspace.select` opens a database.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
