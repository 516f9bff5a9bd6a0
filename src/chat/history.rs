//! Sidebar grouping of conversations by last activity.

use chrono::{DateTime, Utc};

use super::types::Conversation;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Conversations sharing one recency label, in list order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryGroup<'a> {
    /// Label such as `Today`, `Yesterday`, `3 days ago` or `2024-05-01`.
    pub label: String,
    /// Conversations in this bucket.
    pub conversations: Vec<&'a Conversation>,
}

/// Label for a conversation last touched at `updated_at`, seen from `now_ms`.
///
/// Elapsed time is rounded up to whole days: anything within the last 24
/// hours is `Today`, the day before is `Yesterday`, up to a week reads
/// `N days ago`, and older entries show their UTC calendar date.
#[must_use]
pub fn recency_label(updated_at: i64, now_ms: i64) -> String {
    let elapsed = u64::try_from(now_ms.saturating_sub(updated_at)).unwrap_or(0);
    let days = elapsed.div_ceil(DAY_MS.unsigned_abs());

    match days {
        0 | 1 => "Today".to_string(),
        2 => "Yesterday".to_string(),
        3..=7 => format!("{} days ago", days - 1),
        _ => DateTime::<Utc>::from_timestamp_millis(updated_at).map_or_else(
            || "Unknown date".to_string(),
            |date| date.format("%Y-%m-%d").to_string(),
        ),
    }
}

/// Group conversations by [`recency_label`], keeping list order.
///
/// Groups appear in order of first occurrence, so a newest-first list yields
/// newest-first groups.
#[must_use]
pub fn group_by_recency(conversations: &[Conversation], now_ms: i64) -> Vec<HistoryGroup<'_>> {
    let mut groups: Vec<HistoryGroup<'_>> = Vec::new();

    for conversation in conversations {
        let label = recency_label(conversation.updated_at, now_ms);
        match groups.iter_mut().find(|group| group.label == label) {
            Some(group) => group.conversations.push(conversation),
            None => groups.push(HistoryGroup {
                label,
                conversations: vec![conversation],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_717_200_000_000; // 2024-06-01T00:00:00Z

    fn touched(updated_at: i64) -> Conversation {
        let mut conversation = Conversation::new(updated_at);
        conversation.updated_at = updated_at;
        conversation
    }

    #[test]
    fn test_labels() {
        assert_eq!(recency_label(NOW, NOW), "Today");
        assert_eq!(recency_label(NOW - 1, NOW), "Today");
        assert_eq!(recency_label(NOW - DAY_MS, NOW), "Today");
        assert_eq!(recency_label(NOW - DAY_MS - 1, NOW), "Yesterday");
        assert_eq!(recency_label(NOW - 3 * DAY_MS, NOW), "2 days ago");
        assert_eq!(recency_label(NOW - 7 * DAY_MS, NOW), "6 days ago");
        assert_eq!(recency_label(NOW - 8 * DAY_MS, NOW), "2024-05-24");
    }

    #[test]
    fn test_future_timestamps_are_today() {
        assert_eq!(recency_label(NOW + DAY_MS, NOW), "Today");
    }

    #[test]
    fn test_grouping_keeps_order() {
        let list = vec![
            touched(NOW - 10),
            touched(NOW - 20),
            touched(NOW - DAY_MS - 5),
            touched(NOW - 30 * DAY_MS),
        ];
        let groups = group_by_recency(&list, NOW);

        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Today", "Yesterday", "2024-05-02"]);
        assert_eq!(groups[0].conversations.len(), 2);
        assert_eq!(groups[0].conversations[0].id, list[0].id);
        assert_eq!(groups[0].conversations[1].id, list[1].id);
    }

    #[test]
    fn test_empty_history() {
        assert!(group_by_recency(&[], NOW).is_empty());
    }
}
