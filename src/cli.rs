//! Line-oriented terminal front end.
//!
//! Plain lines are sent as messages; lines starting with `/` are commands.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::chat::history::group_by_recency;
use crate::chat::ids::ConversationId;
use crate::chat::store::{ChatSnapshot, ConversationStore, SkipReason, TurnOutcome};
use crate::chat::types::{Message, Role, now_ms};

const HELP: &str = "\
Commands:
  /new          start a new conversation
  /list         show past conversations
  /select <n>   switch to conversation number n from /list
  /clear        empty the current conversation
  /clear-all    delete every conversation
  /regen        regenerate the last reply
  /help         show this help
  /quit         exit
Anything else is sent as a message.";

/// A parsed input line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Send the text as a user message.
    Send(String),
    /// Start a new conversation.
    New,
    /// Print the sidebar.
    List,
    /// Select by 1-based position in the sidebar list.
    Select(usize),
    /// Clear the current conversation.
    Clear,
    /// Delete every conversation.
    ClearAll,
    /// Regenerate the last reply.
    Regenerate,
    /// Print the command summary.
    Help,
    /// Leave the client.
    Quit,
    /// A `/command` that is not recognised or lacks its argument.
    Invalid(String),
}

impl Command {
    /// Parse one input line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Send(trimmed.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        match name {
            "new" => Self::New,
            "list" | "ls" => Self::List,
            "select" | "open" => parts
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map_or_else(|| Self::Invalid(trimmed.to_string()), Self::Select),
            "clear" => Self::Clear,
            "clear-all" => Self::ClearAll,
            "regen" | "regenerate" => Self::Regenerate,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Invalid(trimmed.to_string()),
        }
    }
}

/// Conversation ids in sidebar display order.
///
/// Entry `n - 1` is the conversation shown as number `n` by
/// [`render_sidebar`] for the same snapshot and time.
#[must_use]
pub fn sidebar_order(snapshot: &ChatSnapshot, now_ms: i64) -> Vec<ConversationId> {
    group_by_recency(&snapshot.conversations, now_ms)
        .into_iter()
        .flat_map(|group| group.conversations)
        .map(|conversation| conversation.id)
        .collect()
}

/// Render the sidebar with 1-based positions usable by `/select`.
#[must_use]
pub fn render_sidebar(snapshot: &ChatSnapshot, now_ms: i64) -> String {
    if snapshot.conversations.is_empty() {
        return "No conversations yet. Start a new chat to begin.".to_string();
    }

    let mut out = String::new();
    let mut position = 0_usize;
    for group in group_by_recency(&snapshot.conversations, now_ms) {
        let _ = writeln!(out, "{}", group.label);
        for conversation in group.conversations {
            position += 1;
            let marker = if snapshot.current == Some(conversation.id) {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(out, " {marker}{position:>3}. {}", conversation.title);
        }
    }
    out.trim_end().to_string()
}

/// Render one message of the thread.
#[must_use]
pub fn render_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    format!("{who}> {}", message.content)
}

fn render_thread(snapshot: &ChatSnapshot) -> String {
    let Some(conversation) = snapshot.current() else {
        return "No conversation selected.".to_string();
    };
    let mut out = format!("== {} ==", conversation.title);
    for message in &conversation.messages {
        out.push('\n');
        out.push_str(&render_message(message));
    }
    out
}

fn render_outcome(outcome: &TurnOutcome) -> Option<String> {
    match outcome {
        TurnOutcome::Replied { message, .. } | TurnOutcome::Failed { message, .. } => {
            Some(render_message(message))
        }
        TurnOutcome::Dropped { .. } => Some("(reply discarded: conversation deleted)".to_string()),
        TurnOutcome::Skipped(SkipReason::EmptyMessage) => None,
        TurnOutcome::Skipped(SkipReason::Busy) => {
            Some("(still waiting for the previous reply)".to_string())
        }
        TurnOutcome::Skipped(SkipReason::NothingToRegenerate) => {
            Some("(nothing to regenerate)".to_string())
        }
    }
}

/// Read commands from stdin until `/quit` or end of input.
///
/// # Errors
/// Returns an error if stdin cannot be read.
pub async fn run_repl(store: Arc<ConversationStore>) -> std::io::Result<()> {
    println!("threadline: type a message, or /help for commands.");
    let snapshot = store.snapshot();
    if snapshot.current().is_some() {
        println!("{}", render_thread(&snapshot));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = Command::parse(&line);
        debug!("Command: {command:?}");

        match command {
            Command::Send(text) => {
                if text.is_empty() {
                    continue;
                }
                println!("(thinking...)");
                let outcome = store.append_user_message(&text).await;
                if let Some(rendered) = render_outcome(&outcome) {
                    println!("{rendered}");
                }
            }
            Command::New => {
                store.create_conversation().await;
                println!("Started a new conversation.");
            }
            Command::List => println!("{}", render_sidebar(&store.snapshot(), now_ms())),
            Command::Select(position) => {
                let target = sidebar_order(&store.snapshot(), now_ms())
                    .get(position - 1)
                    .copied();
                match target {
                    Some(id) if store.select_conversation(id).await => {
                        println!("{}", render_thread(&store.snapshot()));
                    }
                    _ => println!("No conversation number {position}."),
                }
            }
            Command::Clear => {
                if store.clear_current_conversation().await {
                    println!("Conversation cleared.");
                } else {
                    println!("No conversation selected.");
                }
            }
            Command::ClearAll => {
                store.clear_all_conversations().await;
                println!("History cleared.");
            }
            Command::Regenerate => {
                println!("(thinking...)");
                let outcome = store.regenerate_last_response().await;
                if let Some(rendered) = render_outcome(&outcome) {
                    println!("{rendered}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(raw) => println!("Unknown command: {raw} (try /help)"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::Conversation;

    #[test]
    fn test_parse_plain_text_is_sent_trimmed() {
        assert_eq!(Command::parse("  hello  "), Command::Send("hello".to_string()));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/new"), Command::New);
        assert_eq!(Command::parse("/select 3"), Command::Select(3));
        assert_eq!(Command::parse("/clear-all"), Command::ClearAll);
        assert_eq!(Command::parse("/regen"), Command::Regenerate);
        assert_eq!(Command::parse("/quit"), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_select() {
        assert!(matches!(Command::parse("/select"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/select 0"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/select two"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/frobnicate"), Command::Invalid(_)));
    }

    #[test]
    fn test_sidebar_marks_current_and_numbers_entries() {
        let now = 1_717_200_000_000;
        let mut first = Conversation::new(now);
        first.title = "Borrow checker".to_string();
        let second = Conversation::new(now);
        let snapshot = ChatSnapshot {
            current: Some(second.id),
            conversations: vec![first, second],
            busy: false,
        };

        let rendered = render_sidebar(&snapshot, now);
        assert!(rendered.starts_with("Today"));
        assert!(rendered.contains("   1. Borrow checker"));
        assert!(rendered.contains(" *  2. New Chat"));
    }

    #[test]
    fn test_select_numbers_follow_sidebar_grouping() {
        let now = 1_717_200_000_000;
        let titled = |title: &str, updated_at: i64| {
            let mut conversation = Conversation::new(updated_at);
            conversation.title = title.to_string();
            conversation
        };
        let c = titled("C", now - 1_000);
        let b = titled("B", now - 30 * 60 * 60 * 1000);
        let a = titled("A", now - 2_000);
        let snapshot = ChatSnapshot {
            current: None,
            conversations: vec![c.clone(), b.clone(), a.clone()],
            busy: false,
        };

        let rendered = render_sidebar(&snapshot, now);
        let lines: Vec<_> = rendered.lines().map(str::trim).collect();
        assert_eq!(lines, vec!["Today", "1. C", "2. A", "Yesterday", "3. B"]);
        assert_eq!(sidebar_order(&snapshot, now), vec![c.id, a.id, b.id]);
    }

    #[test]
    fn test_sidebar_empty() {
        let rendered = render_sidebar(&ChatSnapshot::default(), 0);
        assert!(rendered.starts_with("No conversations yet"));
    }

    #[test]
    fn test_render_message_prefix() {
        assert_eq!(render_message(&Message::user("hi")), "you> hi");
        assert_eq!(render_message(&Message::assistant("yo")), "assistant> yo");
    }
}
