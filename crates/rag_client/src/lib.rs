//! Agentic RAG chat client library: streamed query sessions with citations
//! and latency diagnostics, plus a durable conversation log.
//! Used by the `rag-chat` binary and embeddable behind any rendering layer.

pub mod api;
pub mod config;
pub mod decoder;
pub mod events;
pub mod session;
pub mod store;

pub use api::{
    ApiClient, ClientError, CollectionStats, DeleteOutcome, DocumentEntry, HealthReport,
    IngestOutcome,
};
pub use config::{default_config_path, ApiSection, Config, ConfigError, StorageSection};
pub use decoder::LineDecoder;
pub use events::{Citation, StreamAccumulator, StreamOutcome, StreamUpdate, TimingSummary};
pub use session::{Session, SessionState, StreamObserver, SubmitOutcome};
pub use store::{
    default_conversations_path, open_file_store, Conversation, ConversationStore, FileStorage,
    MemoryStorage, Message, Role, StorageBackend, StoreError, DEFAULT_TITLE,
};
