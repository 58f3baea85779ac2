use crate::{
    model::Message,
    types::{MessageId, Timestamp},
};
use std::collections::{BTreeMap, HashSet};

///
/// ChatLog
///
/// Client-side view of a course chat. Messages are kept ordered by
/// `(created_at, id)` whatever order they arrive in, and a repeated id is
/// ignored.
///

#[derive(Clone, Debug, Default)]
pub struct ChatLog {
    messages: BTreeMap<(Timestamp, MessageId), Message>,
    ids: HashSet<MessageId>,
}

impl ChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message`; returns `false` if its id was already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages
            .insert((message.created_at, message.id.clone()), message);

        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.values().next_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Extend<Message> for ChatLog {
    fn extend<I: IntoIterator<Item = Message>>(&mut self, iter: I) {
        for message in iter {
            self.insert(message);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CourseId, PrincipalId};

    fn message(id: &str, at: u64) -> Message {
        Message {
            id: MessageId::new(id),
            course_id: CourseId::new("c1"),
            sender_id: PrincipalId::new("p1"),
            content: id.to_string(),
            created_at: Timestamp::from_seconds(at),
        }
    }

    #[test]
    fn out_of_order_and_duplicate_arrivals_settle() {
        let mut log = ChatLog::new();

        assert!(log.insert(message("b", 20)));
        assert!(log.insert(message("a", 10)));
        assert!(!log.insert(message("b", 20)));
        log.extend([message("d", 20), message("c", 20), message("a", 10)]);

        let ids: Vec<_> = log.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(log.len(), 4);
        assert_eq!(log.last().map(|m| m.id.as_str()), Some("d"));
    }
}
