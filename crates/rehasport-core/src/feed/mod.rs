//! Course chat: posting, history and live subscription.
//!
//! Every room is scoped to its course: only admins, the course's instructor
//! and enrolled patients may read or write it.

mod channel;
mod chat;
mod stream;

#[cfg(test)]
mod tests;

pub use channel::{BroadcastChannel, NotificationChannel};
pub use chat::ChatLog;
pub use stream::{DedupStream, MessageStream};

use crate::{
    db::{
        Db, advisory,
        query::{Order, Predicate},
    },
    enrollment::{enrolled_courses, is_enrolled},
    error::{ErrorKind, InternalError},
    model::{Course, Message, Principal, Role},
    obs::{MetricsEvent, SharedSink, global_sink},
    types::{CourseId, MessageId, PrincipalId, Timestamp},
};
use rehasport_config::FeedConfig;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::debug;

///
/// FeedError
///

#[derive(Debug, ThisError)]
pub enum FeedError {
    #[error("course not found: {course_id}")]
    CourseNotFound { course_id: CourseId },

    #[error("{actor} is not a member of course {course_id}")]
    Forbidden {
        actor: PrincipalId,
        course_id: CourseId,
    },

    #[error("message is empty")]
    EmptyMessage,

    #[error("message has {len} characters, at most {max} allowed")]
    MessageTooLong { len: usize, max: usize },

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl FeedError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CourseNotFound { .. } | Self::EmptyMessage | Self::MessageTooLong { .. } => {
                ErrorKind::Validation
            }
            Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::Store(err) => err.kind(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

///
/// MessageService
///

#[derive(Clone)]
pub struct MessageService {
    db: Db,
    channel: Arc<dyn NotificationChannel>,
    max_message_len: usize,
    dedup_capacity: usize,
    sink: SharedSink,
}

impl MessageService {
    #[must_use]
    pub fn new(db: Db, channel: Arc<dyn NotificationChannel>, config: &FeedConfig) -> Self {
        Self {
            db,
            channel,
            max_message_len: config.max_message_len,
            dedup_capacity: config.dedup_capacity,
            sink: global_sink(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Store a message and publish it to the course's subscribers.
    pub async fn post(
        &self,
        sender: &Principal,
        course_id: &CourseId,
        content: &str,
    ) -> Result<Message, FeedError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FeedError::EmptyMessage);
        }
        let len = content.chars().count();
        if len > self.max_message_len {
            return Err(FeedError::MessageTooLong {
                len,
                max: self.max_message_len,
            });
        }
        self.require_member(sender, course_id).await?;

        let message = Message {
            id: MessageId::generate(),
            course_id: course_id.clone(),
            sender_id: sender.id.clone(),
            content: content.to_string(),
            created_at: Timestamp::now(),
        };
        let stored = self.db.insert(&message).await?;

        let receivers = self.channel.publish(&stored.entity);
        debug!(course = %course_id, message = %stored.entity.id, receivers, "message posted");
        self.sink.record(MetricsEvent::MessagePosted);

        Ok(stored.entity)
    }

    /// Stored messages of a course, oldest first. A missing messages table
    /// renders as an empty history.
    pub async fn history(
        &self,
        viewer: &Principal,
        course_id: &CourseId,
    ) -> Result<Vec<Message>, FeedError> {
        self.require_member(viewer, course_id).await?;

        let rows = advisory::find_or_empty::<Message>(
            &self.db,
            &Predicate::all().eq("course_id", course_id.as_str()),
            Some(&Order::asc("created_at")),
        )
        .await?;

        Ok(rows.into_iter().map(|loaded| loaded.entity).collect())
    }

    /// Live, deduplicated messages of a course.
    pub async fn subscribe(
        &self,
        viewer: &Principal,
        course_id: &CourseId,
    ) -> Result<DedupStream<MessageStream>, FeedError> {
        self.require_member(viewer, course_id).await?;

        Ok(self.channel.subscribe(course_id).dedup(self.dedup_capacity))
    }

    /// Courses whose chat `viewer` may open, earliest start first.
    pub async fn rooms(&self, viewer: &Principal) -> Result<Vec<Course>, FeedError> {
        let order = Order::asc("start");

        let mut courses: Vec<Course> = match viewer.role {
            Role::Admin => {
                let rows = self.db.find::<Course>(&Predicate::all(), Some(&order)).await?;

                return Ok(rows.into_iter().map(|loaded| loaded.entity).collect());
            }
            Role::Trainer => self
                .db
                .find::<Course>(
                    &Predicate::all().eq("instructor_id", viewer.id.as_str()),
                    Some(&order),
                )
                .await?
                .into_iter()
                .map(|loaded| loaded.entity)
                .collect(),
            Role::Patient => Vec::new(),
        };

        for course in enrolled_courses(&self.db, &viewer.id).await? {
            if !courses.iter().any(|known| known.id == course.id) {
                courses.push(course);
            }
        }
        courses.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        Ok(courses)
    }

    async fn require_member(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<(), FeedError> {
        let Some(course) = self.db.load::<Course>(course_id.as_str()).await? else {
            return Err(FeedError::CourseNotFound {
                course_id: course_id.clone(),
            });
        };

        let member = principal.role == Role::Admin
            || course.entity.is_instructed_by(&principal.id)
            || is_enrolled(&self.db, course_id, &principal.id).await?;
        if !member {
            debug!(course = %course_id, principal = %principal.id, "chat access denied");
            return Err(FeedError::Forbidden {
                actor: principal.id.clone(),
                course_id: course_id.clone(),
            });
        }

        Ok(())
    }
}
