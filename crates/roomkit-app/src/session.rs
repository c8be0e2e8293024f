//! Session trait for abstracting the chat protocol client.
//!
//! The [`Session`] trait decouples the data source from any concrete
//! protocol implementation. Production code wraps a real client; tests use
//! an in-memory simulation. Live updates are pushed into an [`UpdateSink`]
//! from whatever thread the client runs on.

use std::future::Future;

use roomkit_core::{Event, EventId, MessageContent, RoomId, RoomStateSnapshot, UserId};
use tokio::sync::mpsc;

use crate::{
    ImageUpload, SessionError,
    worker::{Job, WorkItem},
};

/// Opaque continuation token for backward pagination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationToken(pub String);

/// One page of history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Events, newest first.
    pub events: Vec<Event>,
    /// Token for the next older page, `None` once the start of the room is
    /// reached.
    pub end: Option<PaginationToken>,
}

/// Live update pushed by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    /// A new event, or a new version of a known one.
    Event(Event),
    /// Users currently typing.
    Typing(Vec<UserId>),
}

/// Handle identifying a subscription for [`Session::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Entry point of the processing queue for live updates.
///
/// Cloneable and callable from any thread. Updates pushed from one thread
/// are applied in push order.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    tx: mpsc::UnboundedSender<Job>,
}

impl UpdateSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self { tx }
    }

    /// Enqueue `update`. Returns `false` once the data source is gone, after
    /// which the session should drop the sink.
    pub fn push(&self, update: RoomUpdate) -> bool {
        let item = match update {
            RoomUpdate::Event(event) => WorkItem::Live(event),
            RoomUpdate::Typing(users) => WorkItem::Typing(users.into_iter().collect()),
        };
        self.tx.send(Job::fire_and_forget(item)).is_ok()
    }

    /// True once the data source stopped draining the queue.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// External chat session.
///
/// # Implementations
///
/// - **Production**: wraps a protocol client
/// - **Simulation**: `roomkit_harness::SimSession`, in-memory with failure
///   injection
pub trait Session: Send + Sync + 'static {
    /// Identifier of the local user.
    fn user_id(&self) -> UserId;

    /// Current state of `room_id`.
    fn room_state(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<RoomStateSnapshot, SessionError>> + Send;

    /// Start delivering live updates for `room_id` into `sink`.
    fn subscribe(&self, room_id: &RoomId, sink: UpdateSink) -> Result<SubscriptionId, SessionError>;

    /// Stop delivering updates for `subscription`. Idempotent.
    fn unsubscribe(&self, room_id: &RoomId, subscription: SubscriptionId);

    /// Fetch up to `limit` events older than `from` (`None` starts at the
    /// live edge).
    fn paginate_back(
        &self,
        room_id: &RoomId,
        from: Option<PaginationToken>,
        limit: usize,
    ) -> impl Future<Output = Result<HistoryPage, SessionError>> + Send;

    /// Persist a message. Resolves with the server-assigned identifier.
    fn send_message(
        &self,
        room_id: &RoomId,
        content: MessageContent,
    ) -> impl Future<Output = Result<EventId, SessionError>> + Send;

    /// Upload and persist an image. Resolves with the server-assigned
    /// identifier.
    fn send_image(
        &self,
        room_id: &RoomId,
        image: ImageUpload,
    ) -> impl Future<Output = Result<EventId, SessionError>> + Send;
}
