//! Saved interactive conversations.

use crate::api::{ChatMessage, Role};
use crate::core::config::data::path_display;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Oldest conversations beyond this count are dropped on save.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// How many conversations `/history`, `/resume` and `/delete` index into.
pub const RECENT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationEntry {
    /// Messages other than the system prompt.
    pub fn exchange_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role != Role::System)
            .count()
    }

    pub fn updated_label(&self) -> String {
        self.updated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

#[derive(Debug)]
pub enum HistoryError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize(serde_json::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Read { path, source } => {
                write!(
                    f,
                    "failed to read history at {}: {source}",
                    path_display(path)
                )
            }
            HistoryError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse history at {}: {source}",
                    path_display(path)
                )
            }
            HistoryError::Write { path, source } => {
                write!(
                    f,
                    "failed to write history at {}: {source}",
                    path_display(path)
                )
            }
            HistoryError::Serialize(source) => write!(f, "failed to encode history: {source}"),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::Read { source, .. } | HistoryError::Write { source, .. } => Some(source),
            HistoryError::Parse { source, .. } | HistoryError::Serialize(source) => Some(source),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    conversations: Vec<ConversationEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            conversations: Vec::new(),
            path: path.into(),
        }
    }

    /// Read the history file; a missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(source) => return Err(HistoryError::Read { path, source }),
        };
        let mut history: History = match serde_json::from_slice(&data) {
            Ok(history) => history,
            Err(source) => return Err(HistoryError::Parse { path, source }),
        };
        history.path = path;
        Ok(history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trim to [`MAX_HISTORY_ENTRIES`] and replace the file atomically.
    pub fn save(&mut self) -> Result<(), HistoryError> {
        if self.conversations.len() > MAX_HISTORY_ENTRIES {
            let excess = self.conversations.len() - MAX_HISTORY_ENTRIES;
            self.conversations.drain(..excess);
        }

        let write_err = |source| HistoryError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let data = serde_json::to_vec_pretty(self).map_err(HistoryError::Serialize)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;
        temp_file.write_all(&data).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    pub fn conversations(&self) -> &[ConversationEntry] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn add_conversation(&mut self, id: &str, model: &str, messages: Vec<ChatMessage>) {
        let now = Utc::now();
        self.conversations.push(ConversationEntry {
            id: id.to_string(),
            model: model.to_string(),
            messages,
            created_at: now,
            updated_at: now,
        });
    }

    /// Replace the messages of an existing conversation. Returns false when
    /// no conversation has this id.
    pub fn update_conversation(&mut self, id: &str, messages: Vec<ChatMessage>) -> bool {
        match self.conversations.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.messages = messages;
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Update the conversation if it exists, otherwise add it.
    pub fn upsert(&mut self, id: &str, model: &str, messages: Vec<ChatMessage>) {
        if let Some(entry) = self.conversations.iter_mut().find(|entry| entry.id == id) {
            entry.messages = messages;
            entry.model = model.to_string();
            entry.updated_at = Utc::now();
        } else {
            self.add_conversation(id, model, messages);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ConversationEntry> {
        self.conversations.iter().find(|entry| entry.id == id)
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.conversations.last()
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    /// The `n` newest conversations, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationEntry] {
        let start = self.conversations.len().saturating_sub(n);
        &self.conversations[start..]
    }

    /// Conversations with any message containing `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<&ConversationEntry> {
        if keyword.is_empty() {
            return Vec::new();
        }
        let keyword = keyword.to_lowercase();
        self.conversations
            .iter()
            .filter(|entry| {
                entry
                    .messages
                    .iter()
                    .any(|message| message.content.to_lowercase().contains(&keyword))
            })
            .collect()
    }

    /// Delete by one-based position in [`History::recent`] of
    /// [`RECENT_WINDOW`]. Returns false for an out-of-range index.
    pub fn delete_recent(&mut self, index: usize) -> bool {
        let recent = self.recent(RECENT_WINDOW);
        if index == 0 || index > recent.len() {
            return false;
        }
        let target = recent[index - 1].id.clone();
        let before = self.conversations.len();
        self.conversations.retain(|entry| entry.id != target);
        self.conversations.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn conversation(text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Be precise and concise."),
            ChatMessage::user(text),
            ChatMessage::assistant(format!("answer to {text}")),
        ]
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let history = History::load(dir.path().join("none.json")).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("history.json");
        let mut history = History::new(&path);
        history.add_conversation("a", "sonar", conversation("rust"));
        history.save().unwrap();

        let loaded = History::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = loaded.get("a").unwrap();
        assert_eq!(entry.model, "sonar");
        assert_eq!(entry.messages, conversation("rust"));
        assert_eq!(entry.exchange_count(), 2);
        assert_eq!(loaded.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut history = History::new(&path);
        history.add_conversation("a", "sonar", conversation("x"));
        history.save().unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            History::load(&path),
            Err(HistoryError::Parse { .. })
        ));
    }

    #[test]
    fn save_keeps_only_the_newest_entries() {
        let dir = TempDir::new().unwrap();
        let mut history = History::new(dir.path().join("history.json"));
        for n in 0..(MAX_HISTORY_ENTRIES + 5) {
            history.add_conversation(&format!("c{n}"), "sonar", conversation("x"));
        }
        history.save().unwrap();
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.conversations()[0].id, "c5");
        assert_eq!(
            history.last().unwrap().id,
            format!("c{}", MAX_HISTORY_ENTRIES + 4)
        );
    }

    #[test]
    fn update_touches_existing_entries_only() {
        let mut history = History::new("unused.json");
        history.add_conversation("a", "sonar", conversation("one"));
        let created = history.get("a").unwrap().created_at;

        assert!(history.update_conversation("a", conversation("two")));
        let entry = history.get("a").unwrap();
        assert_eq!(entry.messages[1].content, "two");
        assert_eq!(entry.created_at, created);
        assert!(entry.updated_at >= created);

        assert!(!history.update_conversation("missing", conversation("x")));
    }

    #[test]
    fn upsert_adds_then_updates() {
        let mut history = History::new("unused.json");
        history.upsert("a", "sonar", conversation("one"));
        history.upsert("a", "sonar-pro", conversation("two"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get("a").unwrap().model, "sonar-pro");
    }

    #[test]
    fn recent_returns_newest_window_in_order() {
        let mut history = History::new("unused.json");
        for n in 0..12 {
            history.add_conversation(&format!("c{n}"), "sonar", conversation("x"));
        }
        let recent = history.recent(RECENT_WINDOW);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id, "c2");
        assert_eq!(recent[9].id, "c11");
        assert!(History::new("x").recent(5).is_empty());
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn search_is_case_insensitive() {
        let mut history = History::new("unused.json");
        history.add_conversation("a", "sonar", conversation("Tokio runtime"));
        history.add_conversation("b", "sonar", conversation("gardening"));
        let hits = history.search("TOKIO");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(history.search("").is_empty());
    }

    #[test]
    fn delete_uses_recent_window_positions() {
        let mut history = History::new("unused.json");
        for n in 0..12 {
            history.add_conversation(&format!("c{n}"), "sonar", conversation("x"));
        }
        assert!(!history.delete_recent(0));
        assert!(!history.delete_recent(11));

        // Position 1 of the recent window is c2, not c0.
        assert!(history.delete_recent(1));
        assert!(history.get("c2").is_none());
        assert!(history.get("c0").is_some());
        assert_eq!(history.len(), 11);
    }

    #[test]
    fn clear_removes_everything() {
        let mut history = History::new("unused.json");
        history.add_conversation("a", "sonar", conversation("x"));
        history.clear();
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }
}
