//! Conversation management.
//!
//! - `types`: messages, conversations and title derivation
//! - `ids`: identifier newtypes
//! - `state`: pure state transitions
//! - `store`: the conversation store (busy flag, persistence, completion calls)
//! - `storage`: JSON blob persistence behind a key/value port
//! - `history`: sidebar grouping by recency

pub mod history;
pub mod ids;
pub mod state;
pub mod storage;
pub mod store;
pub mod types;

pub use history::{HistoryGroup, group_by_recency, recency_label};
pub use ids::{ConversationId, MessageId};
pub use state::{ChatState, PendingTurn};
pub use storage::{
    BlobStore, ChatStorage, FileBlobStore, MemoryBlobStore, STORAGE_KEY, StorageError,
    StorageResult,
};
pub use store::{ChatSnapshot, ConversationStore, SkipReason, TurnOutcome};
pub use types::{Conversation, Message, PLACEHOLDER_TITLE, Role, derive_title};
