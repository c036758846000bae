//! Bounding the outgoing message list by an approximate size budget.
//!
//! The default estimate counts characters and divides by a fixed
//! characters-per-token ratio. It is a heuristic, not a tokenizer; plug a real
//! one in through [`SizeEstimator`] if exact boundaries matter.

use std::sync::Arc;

use crate::model::Message;

pub const DEFAULT_TOKEN_LIMIT: usize = 4000;
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Approximates the token size of a message list.
///
/// Sizes are additive: a list measures the sum of its messages' sizes, converted
/// to tokens once at the end.
pub trait SizeEstimator: Send + Sync {
    /// Size of a single message in the estimator's own unit.
    fn message_size(&self, message: &Message) -> usize;

    /// Convert a summed size to tokens.
    fn to_tokens(&self, size: usize) -> usize {
        size
    }

    fn estimate(&self, messages: &[Message]) -> usize {
        self.to_tokens(messages.iter().map(|m| self.message_size(m)).sum())
    }
}

/// Character count divided by a fixed ratio, rounded up.
#[derive(Debug, Clone, Copy)]
pub struct CharCountEstimator {
    chars_per_token: usize,
}

impl CharCountEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharCountEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl SizeEstimator for CharCountEstimator {
    fn message_size(&self, message: &Message) -> usize {
        message.content().chars().count()
    }

    fn to_tokens(&self, chars: usize) -> usize {
        chars.div_ceil(self.chars_per_token)
    }
}

/// Drops the oldest history until `[system] + history + [user]` fits the budget.
#[derive(Clone)]
pub struct HistoryTruncator {
    token_limit: usize,
    estimator: Arc<dyn SizeEstimator>,
}

impl HistoryTruncator {
    pub fn new(token_limit: usize, chars_per_token: usize) -> Self {
        Self::with_estimator(token_limit, CharCountEstimator::new(chars_per_token))
    }

    pub fn with_estimator(token_limit: usize, estimator: impl SizeEstimator + 'static) -> Self {
        Self {
            token_limit,
            estimator: Arc::new(estimator),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn estimate(&self, messages: &[Message]) -> usize {
        self.estimator.estimate(messages)
    }

    pub fn fits(&self, messages: &[Message]) -> bool {
        self.estimate(messages) <= self.token_limit
    }

    /// Assemble the outgoing list. The system message and the new user message are
    /// always kept; when even those two exceed the budget they are sent as-is.
    ///
    /// Runs in one pass over the history; only the kept suffix is cloned.
    pub fn build(&self, system: &Message, history: &[Message], user: &Message) -> Vec<Message> {
        let estimator = &self.estimator;
        let mut size = estimator.message_size(system)
            + estimator.message_size(user)
            + history.iter().map(|m| estimator.message_size(m)).sum::<usize>();

        let mut start = 0;
        while start < history.len() && estimator.to_tokens(size) > self.token_limit {
            size -= estimator.message_size(&history[start]);
            start += 1;
        }

        let kept = &history[start..];
        if start > 0 {
            tracing::debug!(
                dropped = start,
                kept = kept.len(),
                "Truncated history to fit the {} token budget",
                self.token_limit
            );
        }

        let mut messages = Vec::with_capacity(kept.len() + 2);
        messages.push(system.clone());
        messages.extend_from_slice(kept);
        messages.push(user.clone());
        messages
    }
}

impl Default for HistoryTruncator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT, DEFAULT_CHARS_PER_TOKEN)
    }
}

impl std::fmt::Debug for HistoryTruncator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryTruncator")
            .field("token_limit", &self.token_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(turns: usize, len: usize) -> Vec<Message> {
        (0..turns)
            .flat_map(|i| {
                [
                    Message::user(format!("{i}{}", "u".repeat(len))),
                    Message::assistant(format!("{i}{}", "a".repeat(len))),
                ]
            })
            .collect()
    }

    #[test]
    fn test_no_truncation_when_under_budget() {
        let truncator = HistoryTruncator::default();
        let history = history(3, 10);
        let out = truncator.build(&Message::system("sys"), &history, &Message::user("new"));
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_drops_oldest_first() {
        // Each history message is 11 chars; system 3, user 3. Budget 10 tokens * 4 = 40 chars.
        let truncator = HistoryTruncator::new(10, 4);
        let history = history(3, 10);
        let out = truncator.build(&Message::system("sys"), &history, &Message::user("new"));

        assert_eq!(out.first(), Some(&Message::system("sys")));
        assert_eq!(out.last(), Some(&Message::user("new")));
        assert!(truncator.fits(&out));
        // 3 + 3 + 3 * 11 = 39 chars fits, a fourth message would not.
        assert_eq!(out.len(), 5);
        assert_eq!(&out[1..4], &history[3..]);
    }

    #[test]
    fn test_idempotent_once_fitting() {
        let truncator = HistoryTruncator::new(10, 4);
        let system = Message::system("sys");
        let user = Message::user("new");
        let first = truncator.build(&system, &history(5, 10), &user);
        let again = truncator.build(&system, &first[1..first.len() - 1], &user);
        assert_eq!(first, again);
    }

    #[test]
    fn test_protected_messages_survive_tiny_budget() {
        let truncator = HistoryTruncator::new(1, 4);
        let system = Message::system("a long system prompt");
        let user = Message::user("a long user message");
        let out = truncator.build(&system, &history(50, 100), &user);
        assert_eq!(out, vec![system, user]);
    }

    #[test]
    fn test_char_estimate_rounds_up() {
        let estimator = CharCountEstimator::new(4);
        assert_eq!(estimator.estimate(&[Message::user("abcde")]), 2);
        assert_eq!(estimator.estimate(&[Message::user("")]), 0);
        // Multi-byte characters count once.
        assert_eq!(estimator.estimate(&[Message::user("ééééé")]), 2);
    }

    struct PerMessage;

    impl SizeEstimator for PerMessage {
        fn message_size(&self, _message: &Message) -> usize {
            1
        }
    }

    #[test]
    fn test_custom_estimator() {
        let truncator = HistoryTruncator::with_estimator(4, PerMessage);
        let out = truncator.build(&Message::system("s"), &history(3, 1), &Message::user("u"));
        assert_eq!(out.len(), 4);
    }

    /// Counts how often messages are measured.
    struct Counting {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl SizeEstimator for Counting {
        fn message_size(&self, message: &Message) -> usize {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            message.content().chars().count()
        }

        fn to_tokens(&self, chars: usize) -> usize {
            chars.div_ceil(DEFAULT_CHARS_PER_TOKEN)
        }
    }

    #[test]
    fn test_long_history_is_measured_linearly() {
        let estimator = Arc::new(Counting {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let truncator = HistoryTruncator {
            token_limit: DEFAULT_TOKEN_LIMIT,
            estimator: estimator.clone(),
        };
        // 10_000 messages of 201 chars against a 16_000 char budget.
        let history: Vec<Message> = (0..10_000)
            .map(|i| Message::user(format!("{:0>201}", i)))
            .collect();

        let out = truncator.build(&Message::system("sys"), &history, &Message::user("new"));

        // 3 + 3 + 79 * 201 = 15_885 fits; an 80th message would not.
        assert_eq!(out.len(), 79 + 2);
        assert_eq!(&out[1..out.len() - 1], &history[history.len() - 79..]);

        let calls = estimator.calls.load(std::sync::atomic::Ordering::Relaxed);
        assert!(calls <= 2 * history.len() + 2, "measured {calls} times");
        assert!(truncator.fits(&out));
    }
}
