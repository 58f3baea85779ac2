use crate::{
    db::{Table, advisory::AdvisoryEntity},
    traits::Entity,
    types::{CourseId, MessageId, PrincipalId, Timestamp},
};
use serde::{Deserialize, Serialize};

///
/// Message
///
/// Chat message scoped to a course.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub course_id: CourseId,
    pub sender_id: PrincipalId,
    pub content: String,
    pub created_at: Timestamp,
}

impl Entity for Message {
    const TABLE: Table = Table::Messages;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl AdvisoryEntity for Message {}
