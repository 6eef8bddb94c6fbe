//! Append-only, capped log of completed build sessions, stored as one JSON
//! document.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::constants::MAX_HISTORY_ENTRIES;
use crate::cost::CostBreakdown;

/// Token counts reported by the model.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens.
    pub input: u64,
    /// Output tokens.
    pub output: u64,
}

/// One completed build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Per-request id, for log correlation.
    pub session_id: String,
    /// When the build started.
    pub timestamp: DateTime<Utc>,
    /// Name of the uploaded file.
    pub original_filename: String,
    /// The user's instruction, empty if none.
    pub custom_prompt: String,
    /// Prototype directory, relative to the data dir.
    pub output_dir: String,
    /// URL of the generated `index.html`.
    pub prototype_url: String,
    /// URL of the thumbnail, if one was written.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Token usage.
    pub tokens: TokenUsage,
    /// Total cost in USD.
    pub cost: f64,
    /// Cost breakdown.
    pub costs: CostBreakdown,
    /// Seconds spent in the model call.
    pub duration: f64,
    /// Model identifier.
    pub model: String,
    /// Whether the build succeeded.
    pub success: bool,
}

/// The on-disk document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    /// Most recent first.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Failure writing the history file.
#[derive(Debug)]
pub enum HistoryError {
    /// Filesystem failure.
    Io(std::io::Error),
    /// Serialization failure.
    Serialize(serde_json::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to write history: {err}"),
            Self::Serialize(err) => write!(f, "Failed to serialize history: {err}"),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::Io(err)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Serialize(err)
    }
}

/// History file plus the lock that serializes read-modify-write cycles.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the history file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; empty if the file is missing or unreadable.
    pub async fn load(&self) -> HistoryDocument {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No history at {}, starting fresh", self.path.display());
                return HistoryDocument::default();
            }
            Err(err) => {
                warn!("Failed to read history {}: {}", self.path.display(), err);
                return HistoryDocument::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(err) => {
                warn!("Ignoring corrupt history {}: {}", self.path.display(), err);
                HistoryDocument::default()
            }
        }
    }

    /// Puts `session` at the front, drops anything past the cap and rewrites
    /// the file.
    pub async fn append(&self, session: Session) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await;
        document.sessions.insert(0, session);
        document.sessions.truncate(MAX_HISTORY_ENTRIES);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!("Failed to remove {}: {}", tmp.display(), cleanup);
            }
            return Err(err.into());
        }
        Ok(())
    }
}
