use crate::db;
use std::path::{Path, PathBuf};

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
}

impl AppState {
    /// Opens (creating if needed) the workspace database, replacing any open connection.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        self.close_workspace();
        tracing::info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        Ok(())
    }

    pub fn close_workspace(&mut self) {
        if let Some(conn) = self.db.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(error = %e, "database close failed");
            }
            if let Some(path) = self.workspace.as_ref() {
                tracing::info!(workspace = %path.display(), "workspace closed");
            }
        }
        self.workspace = None;
    }
}
