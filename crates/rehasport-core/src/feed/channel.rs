use crate::{
    feed::stream::MessageStream,
    model::Message,
    obs::{SharedSink, global_sink},
    types::CourseId,
};
use tokio::sync::broadcast;

///
/// NotificationChannel
///
/// Publish/subscribe feed of inserted message rows. Delivery is
/// at-least-once with no ordering guarantee; subscribers key on message id.
///

pub trait NotificationChannel: Send + Sync + 'static {
    /// Publish a stored message. Returns the number of live receivers.
    fn publish(&self, message: &Message) -> usize;

    /// Subscribe to messages of one course, starting from now.
    fn subscribe(&self, course_id: &CourseId) -> MessageStream;
}

///
/// BroadcastChannel
///
/// In-process channel over a tokio broadcast sender. Slow receivers lag
/// and skip the overwritten items.
///

#[derive(Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<Message>,
    sink: SharedSink,
}

impl BroadcastChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            sink: global_sink(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }
}

impl NotificationChannel for BroadcastChannel {
    fn publish(&self, message: &Message) -> usize {
        // No receivers is not an error for a feed.
        self.sender.send(message.clone()).unwrap_or(0)
    }

    fn subscribe(&self, course_id: &CourseId) -> MessageStream {
        MessageStream::new(self.sender.subscribe(), course_id.clone(), self.sink.clone())
    }
}
