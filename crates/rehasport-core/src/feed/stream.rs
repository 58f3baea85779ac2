//! Message streams.
//!
//! [`MessageStream`] filters a broadcast receiver down to one course.
//! [`DedupStream`] suppresses message ids it has already yielded, within a
//! bounded memory of recent ids.

use crate::{
    model::Message,
    obs::{MetricsEvent, SharedSink},
    types::{CourseId, MessageId},
};
use futures::Stream;
use std::{
    collections::{HashSet, VecDeque},
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::warn;

///
/// MessageStream
///
/// Infinite, non-restartable stream of one course's messages. Ends only
/// when every publisher is gone.
///

pub struct MessageStream {
    inner: BroadcastStream<Message>,
    course_id: CourseId,
    sink: SharedSink,
}

impl MessageStream {
    pub(crate) fn new(
        receiver: broadcast::Receiver<Message>,
        course_id: CourseId,
        sink: SharedSink,
    ) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            course_id,
            sink,
        }
    }

    #[must_use]
    pub const fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    /// Drop repeated message ids, remembering up to `capacity` of them.
    #[must_use]
    pub fn dedup(self, capacity: usize) -> DedupStream<Self> {
        let sink = self.sink.clone();

        DedupStream::new(self, capacity).with_sink(sink)
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                None => return Poll::Ready(None),
                Some(Ok(message)) if message.course_id == self.course_id => {
                    return Poll::Ready(Some(message));
                }
                Some(Ok(_)) => {}
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(course = %self.course_id, skipped, "message subscriber lagged");
                    self.sink.record(MetricsEvent::SubscriberLagged { skipped });
                }
            }
        }
    }
}

///
/// DedupStream
///

pub struct DedupStream<S> {
    inner: S,
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
    sink: Option<SharedSink>,
}

impl<S> DedupStream<S> {
    #[must_use]
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            sink: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn remember(&mut self, id: &MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }

        self.order.push_back(id.clone());
        if self.order.len() > self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.seen.remove(&evicted);
        }

        true
    }

    fn record(&self, event: MetricsEvent) {
        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }
}

impl<S> Stream for DedupStream<S>
where
    S: Stream<Item = Message> + Unpin,
{
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        loop {
            let Some(message) = ready!(Pin::new(&mut self.inner).poll_next(cx)) else {
                return Poll::Ready(None);
            };

            if self.remember(&message.id) {
                self.record(MetricsEvent::MessageDelivered);
                return Poll::Ready(Some(message));
            }
            self.record(MetricsEvent::DuplicateDropped);
        }
    }
}

///
/// TESTS
///
