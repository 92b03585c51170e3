//! Durable conversation log: conversations, messages, auto-titling, and the
//! active-conversation pointer. The persistence medium is injected so the
//! store logic can be exercised against an in-memory fake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::events::{Citation, TimingSummary};

/// Title given to a conversation before its first user message names it.
pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_MAX_CHARS: usize = 50;

/// Store error.
#[derive(Debug)]
pub enum StoreError {
    /// The persistence medium failed; the mutation was rolled back.
    Storage(String),
    /// No conversation with the given id.
    UnknownConversation(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Storage(s) => write!(f, "storage error: {}", s),
            StoreError::UnknownConversation(id) => write!(f, "unknown conversation: {}", id),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One exchange entry. Immutable once appended; the assistant message is built
/// up outside the store and handed over only at stream completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sources: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timing: Option<TimingSummary>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
            timing: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        sources: Option<Vec<Citation>>,
        timing: Option<TimingSummary>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            timing,
            timestamp: Utc::now(),
        }
    }
}

/// Field names mirror the persisted record of the original frontend
/// (camelCase timestamps), so an existing conversation file keeps loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable key-value medium holding the serialized conversation list.
pub trait StorageBackend: Send {
    /// Returns the stored record, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<String>, StoreError>;
    fn save(&self, serialized: &str) -> Result<(), StoreError>;
}

/// JSON file on disk. Parent directories are created on first save.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StorageBackend for FileStorage {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Storage(err.to_string())),
        }
    }

    fn save(&self, serialized: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
        }
        std::fs::write(&self.path, serialized).map_err(|e| StoreError::Storage(e.to_string()))
    }
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: std::sync::Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, serialized: &str) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(serialized.to_string());
        Ok(())
    }
}

/// Ordered conversation list plus the active-conversation pointer.
///
/// Invariants: the list is never empty once the store is open, and every
/// mutation either fully applies and is flushed or is reported failed with no
/// visible effect.
pub struct ConversationStore {
    backend: Box<dyn StorageBackend>,
    conversations: Vec<Conversation>,
    active_id: String,
}

impl ConversationStore {
    /// Load the conversation list from the backend. Corrupt or missing data
    /// degrades to an empty list; bootstrap then creates a fresh conversation
    /// so at least one always exists. The most recent conversation is active.
    pub fn open(backend: Box<dyn StorageBackend>) -> Self {
        let conversations = match backend.load() {
            Ok(Some(serialized)) => match serde_json::from_str::<Vec<Conversation>>(&serialized) {
                Ok(list) => list,
                Err(err) => {
                    tracing::warn!("conversation data corrupt, starting empty: {}", err);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("conversation load failed, starting empty: {}", err);
                Vec::new()
            }
        };

        let mut store = Self {
            backend,
            conversations,
            active_id: String::new(),
        };
        if store.conversations.is_empty() {
            store.conversations.push(Conversation::new());
            if let Err(err) = store.flush() {
                tracing::warn!("bootstrap flush failed: {}", err);
            }
        }
        store.active_id = store.conversations[0].id.clone();
        store
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    /// The active conversation. Always present by the non-empty invariant.
    pub fn active(&self) -> &Conversation {
        self.conversations
            .iter()
            .find(|c| c.id == self.active_id)
            .unwrap_or(&self.conversations[0])
    }

    /// New conversation at the front of the list; becomes active.
    pub fn create(&mut self) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new();
        self.conversations.insert(0, conversation.clone());
        let previous_active = std::mem::replace(&mut self.active_id, conversation.id.clone());
        if let Err(err) = self.flush() {
            self.conversations.remove(0);
            self.active_id = previous_active;
            return Err(err);
        }
        Ok(conversation)
    }

    /// Move the active pointer. Unknown ids are ignored. The streaming guard
    /// lives in the session controller, which gates calls to this.
    pub fn switch_to(&mut self, id: &str) {
        if self.conversations.iter().any(|c| c.id == id) {
            self.active_id = id.to_string();
        }
    }

    /// Append a message, refresh `updated_at`, and derive the title from the
    /// first user message (first 50 characters, `...` when truncated) while
    /// the title is still the default placeholder.
    pub fn append_message(&mut self, id: &str, message: Message) -> Result<(), StoreError> {
        let idx = self
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

        let snapshot = self.conversations[idx].clone();
        {
            let conversation = &mut self.conversations[idx];
            conversation.messages.push(message);
            conversation.updated_at = Utc::now();
            if conversation.title == DEFAULT_TITLE {
                if let Some(first_user) = conversation
                    .messages
                    .iter()
                    .find(|m| m.role == Role::User)
                {
                    conversation.title = derive_title(&first_user.content);
                }
            }
        }
        if let Err(err) = self.flush() {
            self.conversations[idx] = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Remove a conversation. The sole remaining conversation is cleared in
    /// place instead, so the list never becomes empty. Removing the active
    /// conversation moves activation to the new first entry.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let Some(idx) = self.conversations.iter().position(|c| c.id == id) else {
            return Ok(());
        };

        if self.conversations.len() == 1 {
            let snapshot = self.conversations[0].clone();
            {
                let conversation = &mut self.conversations[0];
                conversation.messages.clear();
                conversation.title = DEFAULT_TITLE.to_string();
                conversation.updated_at = Utc::now();
            }
            if let Err(err) = self.flush() {
                self.conversations[0] = snapshot;
                return Err(err);
            }
            return Ok(());
        }

        let removed = self.conversations.remove(idx);
        let previous_active = self.active_id.clone();
        if self.active_id == removed.id {
            self.active_id = self.conversations[0].id.clone();
        }
        if let Err(err) = self.flush() {
            self.conversations.insert(idx, removed);
            self.active_id = previous_active;
            return Err(err);
        }
        Ok(())
    }

    /// Serialize the full conversation list to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&self.conversations)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.backend.save(&serialized)
    }
}

fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Default conversation file path: `~/.rag-chat/conversations.json`.
pub fn default_conversations_path() -> Option<PathBuf> {
    crate::config::home_dir().map(|home| home.join(".rag-chat").join("conversations.json"))
}

/// Convenience: file-backed store at `path`.
pub fn open_file_store(path: &Path) -> ConversationStore {
    ConversationStore::open(Box::new(FileStorage::new(path)))
}
