//! Session persistence for pending gate reviews
//!
//! Whole-record read/replace semantics keyed by session id. A store assumes a
//! single in-flight step per session; it does not serialize racing writers
//! beyond making each save atomic.

use promptgate_core::PendingGateReview;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid session id: {0}")]
    InvalidId(String),

    #[error("session io: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Option<PendingGateReview>, StoreError>;

    /// Replace the whole record for the session
    fn save(&self, session_id: &str, review: &PendingGateReview) -> Result<(), StoreError>;

    /// Remove the record; absent records are not an error
    fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    reviews: Mutex<HashMap<String, PendingGateReview>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reviews.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session_id: &str) -> Result<Option<PendingGateReview>, StoreError> {
        Ok(self
            .reviews
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned())
    }

    fn save(&self, session_id: &str, review: &PendingGateReview) -> Result<(), StoreError> {
        self.reviews
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), review.clone());
        Ok(())
    }

    fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.reviews.lock().unwrap_or_else(|e| e.into_inner()).remove(session_id);
        Ok(())
    }
}

/// One JSON file per session under a base directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.base_path.join(format!("{}.json", session_id)))
    }
}

fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.is_empty() {
        return Err(StoreError::InvalidId("empty".to_string()));
    }
    if session_id.contains(['/', '\\', '\0']) || session_id.contains("..") || session_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidId(format!("{:?}", session_id)));
    }
    Ok(())
}

impl SessionStore for FileSessionStore {
    fn load(&self, session_id: &str) -> Result<Option<PendingGateReview>, StoreError> {
        let path = self.session_path(session_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session_id: &str, review: &PendingGateReview) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;
        fs::create_dir_all(&self.base_path)?;

        let content = serde_json::to_vec_pretty(review)?;
        let tmp = self
            .base_path
            .join(format!(".{}.{}.tmp", session_id, uuid::Uuid::new_v4().simple()));

        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&content)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
