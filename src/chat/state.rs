//! Pure conversation state and its transitions.
//!
//! Nothing here performs I/O or reads the clock: every transition takes the
//! timestamp it should record. [`super::store::ConversationStore`] wraps this
//! type with persistence, the busy flag and the completion call.

use super::ids::ConversationId;
use super::types::{Conversation, Message, PLACEHOLDER_TITLE, Role, derive_title};

/// History to send to the completion service, tagged with its conversation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingTurn {
    /// Conversation the reply belongs to.
    pub conversation_id: ConversationId,
    /// Full message history at request time.
    pub history: Vec<Message>,
}

/// Conversation list plus the current selection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChatState {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
}

impl ChatState {
    /// Empty state with nothing selected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conversations: Vec::new(),
            current: None,
        }
    }

    /// Restore state from a persisted list, selecting the newest conversation.
    #[must_use]
    pub fn from_conversations(conversations: Vec<Conversation>) -> Self {
        let current = conversations.first().map(|c| c.id);
        Self {
            conversations,
            current,
        }
    }

    /// All conversations, newest first.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Identifier of the selected conversation.
    #[must_use]
    pub const fn current_id(&self) -> Option<ConversationId> {
        self.current
    }

    /// The selected conversation.
    #[must_use]
    pub fn current(&self) -> Option<&Conversation> {
        self.current.and_then(|id| self.get(id))
    }

    /// Look up a conversation by id.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn current_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.current?;
        self.get_mut(id)
    }

    /// Create an empty conversation, prepend it and select it.
    pub fn create(&mut self, now_ms: i64) -> ConversationId {
        let conversation = Conversation::new(now_ms);
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.current = Some(id);
        id
    }

    /// Select a conversation. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: ConversationId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.current = Some(id);
        true
    }

    /// Append a user message to the current conversation, creating one first
    /// if nothing is selected.
    ///
    /// The first message of a conversation also sets its title.
    pub fn push_user_message(&mut self, content: &str, now_ms: i64) -> PendingTurn {
        let id = self
            .current()
            .map(|c| c.id)
            .unwrap_or_else(|| self.create(now_ms));

        let mut history = Vec::new();
        if let Some(conversation) = self.get_mut(id) {
            if conversation.messages.is_empty() {
                conversation.title = derive_title(content);
            }
            conversation.messages.push(Message::new(Role::User, content, now_ms));
            conversation.updated_at = now_ms;
            history.clone_from(&conversation.messages);
        }

        PendingTurn {
            conversation_id: id,
            history,
        }
    }

    /// Drop the trailing assistant reply of the current conversation.
    ///
    /// Returns `None` (and changes nothing) unless a conversation is selected
    /// and its last message is from the assistant.
    pub fn begin_regenerate(&mut self, now_ms: i64) -> Option<PendingTurn> {
        let conversation = self.current_mut()?;
        if !conversation.ends_with_assistant() {
            return None;
        }

        conversation.messages.pop();
        conversation.updated_at = now_ms;

        Some(PendingTurn {
            conversation_id: conversation.id,
            history: conversation.messages.clone(),
        })
    }

    /// Append an assistant message to the conversation with the given id.
    ///
    /// Returns `false` if that conversation no longer exists.
    pub fn apply_reply(&mut self, id: ConversationId, message: Message, now_ms: i64) -> bool {
        let Some(conversation) = self.get_mut(id) else {
            return false;
        };
        conversation.messages.push(message);
        conversation.updated_at = now_ms;
        true
    }

    /// Empty the current conversation and reset its title.
    pub fn clear_current(&mut self, now_ms: i64) -> bool {
        let Some(conversation) = self.current_mut() else {
            return false;
        };
        conversation.messages.clear();
        conversation.title = PLACEHOLDER_TITLE.to_string();
        conversation.updated_at = now_ms;
        true
    }

    /// Discard every conversation and the selection.
    pub fn clear_all(&mut self) {
        self.conversations.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_create_prepends_and_selects() {
        let mut state = ChatState::new();
        let ids: Vec<_> = (0..5).map(|i| state.create(i)).collect();

        assert_eq!(state.conversations().len(), 5);
        let unique: HashSet<_> = state.conversations().iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), 5);

        let listed: Vec<_> = state.conversations().iter().map(|c| c.id).collect();
        let newest_first: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(listed, newest_first);
        assert_eq!(state.current_id(), ids.last().copied());
    }

    #[test]
    fn test_select_unknown_is_noop() {
        let mut state = ChatState::new();
        let id = state.create(1);
        assert!(!state.select(ConversationId::new()));
        assert_eq!(state.current_id(), Some(id));
    }

    #[test]
    fn test_first_message_sets_title_later_ones_do_not() {
        let mut state = ChatState::new();
        state.create(1);
        state.push_user_message("first question", 2);
        state.push_user_message("second question", 3);

        let current = state.current().unwrap();
        assert_eq!(current.title, "first question");
        assert_eq!(current.messages.len(), 2);
        assert_eq!(current.updated_at, 3);
        assert_eq!(current.created_at, 1);
    }

    #[test]
    fn test_user_message_carries_transition_timestamp() {
        let mut state = ChatState::new();
        let turn = state.push_user_message("hi", 42);

        assert_eq!(turn.history[0].timestamp, 42);
        assert_eq!(state.current().unwrap().updated_at, 42);
    }

    #[test]
    fn test_push_without_selection_creates_conversation() {
        let mut state = ChatState::new();
        let turn = state.push_user_message("hi", 10);

        assert_eq!(state.conversations().len(), 1);
        assert_eq!(state.current_id(), Some(turn.conversation_id));
        assert_eq!(turn.history.len(), 1);
        assert_eq!(turn.history[0].role, Role::User);
        assert_eq!(turn.history[0].content, "hi");
    }

    #[test]
    fn test_regenerate_requires_trailing_assistant() {
        let mut state = ChatState::new();
        assert!(state.begin_regenerate(1).is_none());

        state.create(1);
        assert!(state.begin_regenerate(2).is_none());

        let turn = state.push_user_message("hi", 3);
        assert!(state.begin_regenerate(4).is_none());
        assert_eq!(state.current().unwrap().messages.len(), 1);

        state.apply_reply(turn.conversation_id, Message::assistant("hello"), 5);
        let regen = state.begin_regenerate(6).unwrap();
        assert_eq!(regen.history.len(), 1);
        assert_eq!(state.current().unwrap().messages.len(), 1);
    }

    #[test]
    fn test_clear_current_keeps_identity_and_position() {
        let mut state = ChatState::new();
        let older = state.create(1);
        state.push_user_message("something", 2);
        let newer = state.create(3);
        state.select(older);

        assert!(state.clear_current(4));
        let cleared = state.get(older).unwrap();
        assert!(cleared.messages.is_empty());
        assert_eq!(cleared.title, PLACEHOLDER_TITLE);
        assert_eq!(cleared.updated_at, 4);

        let order: Vec<_> = state.conversations().iter().map(|c| c.id).collect();
        assert_eq!(order, vec![newer, older]);
    }

    #[test]
    fn test_reply_for_removed_conversation_is_rejected() {
        let mut state = ChatState::new();
        let turn = state.push_user_message("hi", 1);
        state.clear_all();

        assert!(!state.apply_reply(turn.conversation_id, Message::assistant("late"), 2));
        assert!(state.conversations().is_empty());
        assert!(state.current_id().is_none());
    }

    #[test]
    fn test_restore_selects_newest() {
        let mut state = ChatState::new();
        state.create(1);
        let newest = state.create(2);
        let restored = ChatState::from_conversations(state.conversations().to_vec());
        assert_eq!(restored.current_id(), Some(newest));
    }
}
