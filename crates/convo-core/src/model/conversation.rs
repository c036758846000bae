use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

const TITLE_WORDS: usize = 10;

/// An ordered chat session.
///
/// Holds at most one system message, and when present it sits at index 0.
/// Every constructor and mutator keeps that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConversationRecord")]
pub struct Conversation {
    id: Uuid,
    messages: Vec<Message>,
    last_interaction: DateTime<Utc>,
}

/// Serialized shape; decoding goes through `Conversation::new` to normalize the system slot.
#[derive(Deserialize)]
struct ConversationRecord {
    id: Uuid,
    messages: Vec<Message>,
    last_interaction: DateTime<Utc>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Conversation::new(
            record.messages,
            Some(record.id),
            Some(record.last_interaction),
        )
    }
}

impl Conversation {
    /// Build a conversation. Without an explicit `id` a fresh one is minted, so
    /// callers round-tripping a snapshot must pass the original id back in.
    pub fn new(
        messages: Vec<Message>,
        id: Option<Uuid>,
        last_interaction: Option<DateTime<Utc>>,
    ) -> Self {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for message in messages {
            if message.is_system() {
                if system.is_none() {
                    system = Some(message);
                }
            } else {
                rest.push(message);
            }
        }

        let mut conversation = Self {
            id: id.unwrap_or_else(Uuid::new_v4),
            messages: rest,
            last_interaction: last_interaction.unwrap_or_else(Utc::now),
        };
        conversation.set_system_message(system);
        conversation
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// All messages, system message first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }

    /// Messages excluding the system message.
    pub fn history_list(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect()
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.is_system())
    }

    pub fn set_system_message(&mut self, message: Option<Message>) {
        self.messages.retain(|m| !m.is_system());
        if let Some(message) = message {
            let message = if message.is_system() {
                message
            } else {
                Message::system(message.content())
            };
            self.messages.insert(0, message);
        }
    }

    /// First words of the most recent message, ellipsized when cut.
    pub fn title(&self) -> String {
        let Some(latest) = self.messages.last() else {
            return "Empty Conversation".to_string();
        };

        match first_words(latest.content(), TITLE_WORDS) {
            Some(prefix) => format!("{prefix}..."),
            None => latest.content().to_string(),
        }
    }

    /// Append a message. A system-role message replaces the current system message.
    pub fn add_message(&mut self, message: Message) {
        if message.is_system() {
            self.set_system_message(Some(message));
        } else {
            self.messages.push(message);
        }
    }

    /// Remove the message at `index` in `messages()`. Out of bounds is a no-op.
    pub fn delete_message(&mut self, index: usize) {
        if index < self.messages.len() {
            self.messages.remove(index);
        }
    }

    /// Replace the message at `index` in `messages()`. Out of bounds is a no-op,
    /// as is placing a system-role message anywhere but the system slot.
    pub fn update_message(&mut self, index: usize, message: Message) {
        let Some(slot) = self.messages.get_mut(index) else {
            return;
        };
        if message.is_system() && !slot.is_system() {
            tracing::debug!(index, "ignoring system message update outside the system slot");
            return;
        }
        *slot = message;
    }

    pub fn add_example_interaction(
        &mut self,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) {
        self.add_message(Message::user(user_text).into_example());
        self.add_message(Message::assistant(assistant_text).into_example());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_interaction = Utc::now();
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of non-system messages.
    pub fn message_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_system()).count()
    }

    pub fn contains_message(&self, message: &Message) -> bool {
        self.messages.iter().any(|m| m == message)
    }
}

/// Prefix of `text` ending after its `n`th word, or `None` if the text has no more than `n` words.
fn first_words(text: &str, n: usize) -> Option<&str> {
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words += 1;
                in_word = false;
                if words == n {
                    return if text[i..].trim().is_empty() {
                        None
                    } else {
                        Some(&text[..i])
                    };
                }
            }
        } else {
            in_word = true;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conversation {
        Conversation::new(
            vec![
                Message::user("u1"),
                Message::system("be brief"),
                Message::assistant("a1"),
                Message::system("ignored"),
            ],
            None,
            None,
        )
    }

    #[test]
    fn test_new_moves_system_message_to_front() {
        let conv = sample();
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.messages()[0], Message::system("be brief"));
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.history_list(), vec![Message::user("u1"), Message::assistant("a1")]);
    }

    #[test]
    fn test_system_message_round_trip() {
        let mut conv = sample();
        let replacement = Message::system("be verbose");
        conv.set_system_message(Some(replacement.clone()));

        assert_eq!(conv.system_message(), Some(&replacement));
        assert_eq!(conv.messages()[0], replacement);
        assert_eq!(conv.messages().iter().filter(|m| m.is_system()).count(), 1);

        conv.set_system_message(None);
        assert!(conv.system_message().is_none());
        assert_eq!(conv.messages().len(), 2);
    }

    #[test]
    fn test_add_system_message_replaces_existing() {
        let mut conv = sample();
        conv.add_message(Message::system("new rules"));
        assert_eq!(conv.messages()[0], Message::system("new rules"));
        assert_eq!(conv.messages().len(), 3);
    }

    #[test]
    fn test_delete_and_update_out_of_bounds_are_noops() {
        let mut conv = sample();
        let before = conv.clone();

        conv.delete_message(10);
        conv.update_message(10, Message::user("x"));
        assert_eq!(conv, before);

        conv.update_message(1, Message::system("sneaky"));
        assert_eq!(conv, before);

        conv.update_message(1, Message::user("edited"));
        assert_eq!(conv.messages()[1], Message::user("edited"));

        conv.delete_message(0);
        assert!(conv.system_message().is_none());
    }

    #[test]
    fn test_title() {
        let empty = Conversation::new(vec![], None, None);
        assert_eq!(empty.title(), "Empty Conversation");

        let short = Conversation::new(vec![Message::user("just a few words")], None, None);
        assert_eq!(short.title(), "just a few words");

        let long = Conversation::new(
            vec![Message::user(
                "one two three four five six seven eight nine ten eleven twelve",
            )],
            None,
            None,
        );
        assert_eq!(long.title(), "one two three four five six seven eight nine ten...");

        let exact = Conversation::new(
            vec![Message::user("one two three four five six seven eight nine ten  ")],
            None,
            None,
        );
        assert_eq!(exact.title(), "one two three four five six seven eight nine ten  ");
    }

    #[test]
    fn test_example_interaction_and_contains() {
        let mut conv = Conversation::new(vec![Message::system("sys")], None, None);
        conv.add_example_interaction("What is 2+2?", "4");
        assert!(conv.history_list().iter().all(|m| m.is_example()));
        assert!(conv.contains_message(&Message::assistant("4")));
        assert!(!conv.contains_message(&Message::user("4")));
        assert_eq!(conv.last_message(), Some(&Message::assistant("4")));

        conv.add_message(Message::user("real question"));
        assert!(!conv.last_message().is_some_and(|m| m.is_example()));
    }

    #[test]
    fn test_serde_keeps_id_and_normalizes() {
        let conv = sample();
        let json = serde_json::to_string(&conv).unwrap();
        let restored: Conversation = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id(), conv.id());
        assert_eq!(restored.messages(), conv.messages());
        assert_eq!(restored.last_interaction(), conv.last_interaction());
    }

    #[test]
    fn test_explicit_id_is_kept() {
        let id = Uuid::new_v4();
        let conv = Conversation::new(vec![], Some(id), None);
        assert_eq!(conv.id(), id);
        assert_ne!(Conversation::new(vec![], None, None).id(), id);
    }
}
