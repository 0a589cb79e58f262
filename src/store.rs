//! Session persistence behind a small document-store trait.

use crate::{
    error::{BrickError, Result},
    session::Session,
};
use log::debug;
use std::path::{Path, PathBuf};

/// Loads and saves whole sessions by id. Callers serialize concurrent
/// writes to the same session.
pub trait SessionStore {
    fn load(&self, session_id: &str) -> Result<Session>;
    fn save(&self, session: &Session) -> Result<()>;
    fn exists(&self, session_id: &str) -> bool;
}

/// Keeps every session as `{session_id}.json` in one directory.
#[derive(Debug, Clone)]
pub struct JsonDirectoryStore {
    root: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BrickError::validation(format!(
                "Invalid session id '{session_id}'"
            )));
        }
        Ok(self.root.join(format!("{session_id}.json")))
    }
}

impl SessionStore for JsonDirectoryStore {
    fn load(&self, session_id: &str) -> Result<Session> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Err(BrickError::not_found(format!(
                "Session '{session_id}' does not exist"
            )));
        }
        Session::load_from_path(&path)
    }

    fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;
        debug!("Saving session '{}' to '{}'", session.id, path.display());
        session.save_to_path(&path)
    }

    fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id)
            .map(|path| path.exists())
            .unwrap_or(false)
    }
}
