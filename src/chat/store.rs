//! Conversation store: the single source of truth for the chat client.
//!
//! Wraps [`ChatState`] with three side effects:
//! - every mutation re-saves the whole list through [`ChatStorage`];
//! - every mutation publishes a [`ChatSnapshot`] on a watch channel;
//! - user messages and regenerations await a [`CompletionClient`].
//!
//! Sending is two-phase. The user message is committed (saved and published)
//! before the completion request starts, and the reply (or an error notice)
//! is committed as a second step. At most one request is outstanding; the
//! busy flag is released by a guard so it clears on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::llm::CompletionClient;

use super::ids::ConversationId;
use super::state::{ChatState, PendingTurn};
use super::storage::ChatStorage;
use super::types::{Conversation, Message, Role, now_ms};

/// Prefix of the assistant message written when a completion fails.
pub const COMPLETION_ERROR_PREFIX: &str = "Sorry, I encountered an error: ";

/// Observable state handed to renderers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChatSnapshot {
    /// All conversations, newest first.
    pub conversations: Vec<Conversation>,
    /// Selected conversation.
    pub current: Option<ConversationId>,
    /// Whether a completion request is outstanding.
    pub busy: bool,
}

impl ChatSnapshot {
    /// The selected conversation.
    #[must_use]
    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current?;
        self.conversations.iter().find(|c| c.id == id)
    }
}

/// Why a send or regenerate request did nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The message was empty after trimming.
    EmptyMessage,
    /// Another completion request is still outstanding.
    Busy,
    /// No selected conversation ending with an assistant reply.
    NothingToRegenerate,
}

/// Result of a send or regenerate request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TurnOutcome {
    /// The reply was appended.
    Replied {
        /// Conversation that received the reply.
        conversation_id: ConversationId,
        /// The appended assistant message.
        message: Message,
    },
    /// The request failed; an error notice was appended instead.
    Failed {
        /// Conversation that received the notice.
        conversation_id: ConversationId,
        /// The appended assistant message carrying the notice.
        message: Message,
        /// Failure reason as reported by the client.
        reason: String,
    },
    /// The conversation was removed before the reply arrived.
    Dropped {
        /// Conversation the reply was meant for.
        conversation_id: ConversationId,
    },
    /// Nothing was done.
    Skipped(SkipReason),
}

/// Copy the busy flag into the published snapshot.
///
/// The flag is read inside the channel's write lock, so whichever publisher
/// runs last sees the latest flag value.
fn publish_busy(flag: &AtomicBool, updates: &watch::Sender<ChatSnapshot>) {
    updates.send_modify(|snapshot| snapshot.busy = flag.load(Ordering::Acquire));
}

/// Clears the busy flag and republishes when dropped.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
    updates: &'a watch::Sender<ChatSnapshot>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        publish_busy(self.flag, self.updates);
    }
}

/// Conversation list, selection and busy flag, with persistence.
pub struct ConversationStore {
    state: Mutex<ChatState>,
    busy: AtomicBool,
    storage: ChatStorage,
    client: Arc<dyn CompletionClient>,
    updates: watch::Sender<ChatSnapshot>,
}

impl ConversationStore {
    /// Build a store around an existing state without touching storage.
    #[must_use]
    pub fn new(state: ChatState, storage: ChatStorage, client: Arc<dyn CompletionClient>) -> Self {
        let (updates, _) = watch::channel(ChatSnapshot {
            conversations: state.conversations().to_vec(),
            current: state.current_id(),
            busy: false,
        });

        Self {
            state: Mutex::new(state),
            busy: AtomicBool::new(false),
            storage,
            client,
            updates,
        }
    }

    /// Build a store from whatever `storage` holds.
    ///
    /// The newest conversation, if any, becomes current.
    pub async fn open(storage: ChatStorage, client: Arc<dyn CompletionClient>) -> Self {
        let conversations = storage.load().await;
        info!("Restored {} conversations", conversations.len());
        Self::new(ChatState::from_conversations(conversations), storage, client)
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.updates.subscribe()
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.updates.borrow().clone()
    }

    /// Whether a completion request is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Copy of every conversation, newest first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations().to_vec()
    }

    /// Copy of the selected conversation.
    pub async fn current(&self) -> Option<Conversation> {
        self.state.lock().await.current().cloned()
    }

    /// Create an empty conversation and select it.
    pub async fn create_conversation(&self) -> ConversationId {
        let mut state = self.state.lock().await;
        let id = state.create(now_ms());
        self.commit(&state).await;
        drop(state);
        info!("Created new conversation: {id}");
        id
    }

    /// Select a conversation. Returns `false` (and changes nothing) if unknown.
    pub async fn select_conversation(&self, id: ConversationId) -> bool {
        let mut state = self.state.lock().await;
        if !state.select(id) {
            debug!("Conversation not found: {id}");
            return false;
        }
        self.commit(&state).await;
        drop(state);
        debug!("Switched to conversation: {id}");
        true
    }

    /// Send a user message and wait for the reply.
    ///
    /// The message is trimmed; an empty message or a send while busy is
    /// skipped without any state change. Without a selected conversation a
    /// new one is created first.
    pub async fn append_user_message(&self, content: &str) -> TurnOutcome {
        let content = content.trim();
        if content.is_empty() {
            return TurnOutcome::Skipped(SkipReason::EmptyMessage);
        }

        let (turn, guard) = {
            let mut state = self.state.lock().await;
            let Some(guard) = self.try_acquire_busy() else {
                debug!("Ignoring message while a reply is pending");
                return TurnOutcome::Skipped(SkipReason::Busy);
            };
            let turn = state.push_user_message(content, now_ms());
            self.commit(&state).await;
            (turn, guard)
        };

        debug!(
            "Queued user message in {} ({} messages)",
            turn.conversation_id,
            turn.history.len()
        );
        self.complete_turn(turn, guard).await
    }

    /// Replace the last assistant reply of the selected conversation.
    ///
    /// Skipped unless a conversation is selected, it ends with an assistant
    /// message and no request is outstanding.
    pub async fn regenerate_last_response(&self) -> TurnOutcome {
        let (turn, guard) = {
            let mut state = self.state.lock().await;
            if self.is_busy() {
                debug!("Ignoring regenerate while a reply is pending");
                return TurnOutcome::Skipped(SkipReason::Busy);
            }
            if !state.current().is_some_and(Conversation::ends_with_assistant) {
                return TurnOutcome::Skipped(SkipReason::NothingToRegenerate);
            }
            let Some(guard) = self.try_acquire_busy() else {
                return TurnOutcome::Skipped(SkipReason::Busy);
            };
            let Some(turn) = state.begin_regenerate(now_ms()) else {
                return TurnOutcome::Skipped(SkipReason::NothingToRegenerate);
            };
            self.commit(&state).await;
            (turn, guard)
        };

        debug!("Regenerating reply in {}", turn.conversation_id);
        self.complete_turn(turn, guard).await
    }

    /// Empty the selected conversation and reset its title.
    ///
    /// Returns `false` if nothing is selected.
    pub async fn clear_current_conversation(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.clear_current(now_ms()) {
            return false;
        }
        self.commit(&state).await;
        drop(state);
        debug!("Cleared current conversation");
        true
    }

    /// Discard every conversation.
    pub async fn clear_all_conversations(&self) {
        let mut state = self.state.lock().await;
        let removed = state.conversations().len();
        state.clear_all();
        self.commit(&state).await;
        drop(state);
        info!("Cleared all conversations ({removed} removed)");
    }

    fn try_acquire_busy(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        publish_busy(&self.busy, &self.updates);
        Some(BusyGuard {
            flag: &self.busy,
            updates: &self.updates,
        })
    }

    /// Await the completion and apply its result to the requesting
    /// conversation, whichever conversation is selected by then.
    ///
    /// The guard is released while the state lock is still held.
    async fn complete_turn(&self, turn: PendingTurn, guard: BusyGuard<'_>) -> TurnOutcome {
        let conversation_id = turn.conversation_id;
        let result = self.client.complete(turn.history).await;

        let now = now_ms();
        let (message, failure) = match result {
            Ok(text) => (Message::new(Role::Assistant, text, now), None),
            Err(err) => {
                warn!("Completion failed for {conversation_id}: {err}");
                let reason = err.to_string();
                (
                    Message::new(
                        Role::Assistant,
                        format!("{COMPLETION_ERROR_PREFIX}{reason}"),
                        now,
                    ),
                    Some(reason),
                )
            }
        };

        let mut state = self.state.lock().await;
        let applied = state.apply_reply(conversation_id, message.clone(), now);
        drop(guard);
        if !applied {
            warn!("Conversation {conversation_id} was removed before its reply arrived");
            return TurnOutcome::Dropped { conversation_id };
        }
        self.commit(&state).await;
        drop(state);

        match failure {
            None => TurnOutcome::Replied {
                conversation_id,
                message,
            },
            Some(reason) => TurnOutcome::Failed {
                conversation_id,
                message,
                reason,
            },
        }
    }

    /// Persist and publish `state`. Storage failures are logged by the adapter.
    async fn commit(&self, state: &ChatState) {
        self.storage.save(state.conversations()).await;
        let busy = &self.busy;
        self.updates.send_modify(|snapshot| {
            snapshot.conversations = state.conversations().to_vec();
            snapshot.current = state.current_id();
            snapshot.busy = busy.load(Ordering::Acquire);
        });
    }
}
