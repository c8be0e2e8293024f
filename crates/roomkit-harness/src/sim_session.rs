//! In-memory session.
//!
//! [`SimSession`] implements [`Session`] over a per-room history vector.
//! Tests push live events with [`SimSession::deliver`], queue failures for
//! the next request of a kind, and close gates to hold requests in flight.
//!
//! Pagination tokens are positions in the history: a page ending at index
//! `n` hands out token `n`, and the next page covers the events before it.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use roomkit_app::{
    HistoryPage, ImageUpload, PaginationToken, RoomUpdate, Session, SessionError, SubscriptionId,
    UpdateSink,
};
use roomkit_core::{
    Event, EventId, EventKind, MessageContent, MessageType, RoomId, RoomStateSnapshot, SendState,
    UserId,
};
use tokio::sync::watch;

/// Requests a gate can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    /// `room_state`.
    RoomState,
    /// `paginate_back`.
    Pagination,
    /// `send_message` and `send_image`.
    Send,
}

/// Number of calls served per request kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCalls {
    /// `room_state` calls.
    pub room_state: usize,
    /// `subscribe` calls.
    pub subscribe: usize,
    /// `unsubscribe` calls.
    pub unsubscribe: usize,
    /// `paginate_back` calls.
    pub paginate: usize,
    /// `send_message` and `send_image` calls.
    pub send: usize,
}

/// Holds requests until opened, counting arrivals.
struct Gate {
    open: watch::Sender<bool>,
    arrived: watch::Sender<usize>,
}

impl Gate {
    fn new() -> Self {
        Self { open: watch::Sender::new(true), arrived: watch::Sender::new(0) }
    }

    async fn pass(&self) {
        let mut open = self.open.subscribe();
        self.arrived.send_modify(|n| *n += 1);
        let _ = open.wait_for(|open| *open).await;
    }

    async fn arrivals(&self, count: usize) {
        let mut arrived = self.arrived.subscribe();
        let _ = arrived.wait_for(|n| *n >= count).await;
    }
}

#[derive(Debug, Clone)]
struct SimRoom {
    state: RoomStateSnapshot,
    /// Chronological.
    history: Vec<Event>,
}

#[derive(Default)]
struct Failures {
    room_state: VecDeque<SessionError>,
    subscribe: VecDeque<SessionError>,
    pagination: VecDeque<SessionError>,
    send: VecDeque<SessionError>,
}

#[derive(Default)]
struct SimState {
    rooms: HashMap<RoomId, SimRoom>,
    subscribers: HashMap<SubscriptionId, (RoomId, UpdateSink)>,
    next_subscription: u64,
    next_event: u64,
    failures: Failures,
    calls: SimCalls,
    sent: Vec<Event>,
    echo_sends: bool,
    clock: u64,
}

impl SimState {
    fn room(&self, room_id: &RoomId) -> Result<&SimRoom, SessionError> {
        self.rooms.get(room_id).ok_or_else(|| SessionError::RoomNotFound(room_id.clone()))
    }

    /// Append to history and fan out to subscribers, pruning dead sinks.
    fn deliver(&mut self, event: Event) {
        if let Some(room) = self.rooms.get_mut(&event.room_id) {
            room.state.apply(&event);
            room.history.push(event.clone());
        }
        self.clock = self.clock.max(event.origin_server_ts);
        self.subscribers.retain(|_, (room_id, sink)| {
            room_id != &event.room_id || sink.push(RoomUpdate::Event(event.clone()))
        });
    }
}

/// Simulated chat session.
pub struct SimSession {
    user_id: UserId,
    state: Mutex<SimState>,
    room_state_gate: Gate,
    pagination_gate: Gate,
    send_gate: Gate,
}

impl SimSession {
    /// Session for `user_id` with no rooms.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            state: Mutex::new(SimState::default()),
            room_state_gate: Gate::new(),
            pagination_gate: Gate::new(),
            send_gate: Gate::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, kind: GateKind) -> &Gate {
        match kind {
            GateKind::RoomState => &self.room_state_gate,
            GateKind::Pagination => &self.pagination_gate,
            GateKind::Send => &self.send_gate,
        }
    }

    /// Add a room with `history` (chronological).
    pub fn add_room(&self, state: RoomStateSnapshot, history: Vec<Event>) {
        let mut inner = self.lock();
        let clock = history.iter().map(|e| e.origin_server_ts).max().unwrap_or_default();
        inner.clock = inner.clock.max(clock);
        inner.rooms.insert(state.room_id.clone(), SimRoom { state, history });
    }

    /// Deliver a live event to the room and its subscribers.
    pub fn deliver(&self, event: Event) {
        self.lock().deliver(event);
    }

    /// Deliver a typing notification.
    pub fn deliver_typing(&self, room_id: &RoomId, users: Vec<UserId>) {
        self.lock().subscribers.retain(|_, (room, sink)| {
            room != room_id || sink.push(RoomUpdate::Typing(users.clone()))
        });
    }

    /// Also deliver every sent message live, before the send resolves.
    pub fn echo_sends(&self, enabled: bool) {
        self.lock().echo_sends = enabled;
    }

    /// Fail the next `room_state` call.
    pub fn fail_next_room_state(&self, err: SessionError) {
        self.lock().failures.room_state.push_back(err);
    }

    /// Fail the next `subscribe` call.
    pub fn fail_next_subscribe(&self, err: SessionError) {
        self.lock().failures.subscribe.push_back(err);
    }

    /// Fail the next `paginate_back` call.
    pub fn fail_next_pagination(&self, err: SessionError) {
        self.lock().failures.pagination.push_back(err);
    }

    /// Fail the next send.
    pub fn fail_next_send(&self, err: SessionError) {
        self.lock().failures.send.push_back(err);
    }

    /// Hold requests of `kind` until [`Self::open`].
    pub fn close(&self, kind: GateKind) {
        self.gate(kind).open.send_replace(false);
    }

    /// Release held requests of `kind`.
    pub fn open(&self, kind: GateKind) {
        self.gate(kind).open.send_replace(true);
    }

    /// Wait until `count` requests of `kind` reached their gate.
    pub async fn arrivals(&self, kind: GateKind, count: usize) {
        self.gate(kind).arrivals(count).await;
    }

    /// Calls served so far.
    pub fn calls(&self) -> SimCalls {
        self.lock().calls
    }

    /// Messages persisted by the session, in send order.
    pub fn sent(&self) -> Vec<Event> {
        self.lock().sent.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn persist(&self, room_id: &RoomId, content: MessageContent) -> Result<EventId, SessionError> {
        let mut inner = self.lock();
        if let Some(err) = inner.failures.send.pop_front() {
            return Err(err);
        }
        inner.room(room_id)?;

        inner.next_event += 1;
        inner.clock += 1;
        let event = Event {
            event_id: EventId::new(format!("$sent-{}", inner.next_event)),
            sender: Some(self.user_id.clone()),
            room_id: room_id.clone(),
            kind: EventKind::Message(content),
            origin_server_ts: inner.clock,
            send_state: SendState::Sent,
            redacted: false,
        };
        let event_id = event.event_id.clone();
        inner.sent.push(event.clone());

        if inner.echo_sends {
            inner.deliver(event);
        } else if let Some(room) = inner.rooms.get_mut(room_id) {
            room.history.push(event);
        }
        tracing::trace!(%room_id, %event_id, "sim session persisted message");
        Ok(event_id)
    }
}

impl Session for SimSession {
    fn user_id(&self) -> UserId {
        self.user_id.clone()
    }

    fn room_state(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<RoomStateSnapshot, SessionError>> + Send {
        async move {
            self.lock().calls.room_state += 1;
            self.room_state_gate.pass().await;

            let mut inner = self.lock();
            if let Some(err) = inner.failures.room_state.pop_front() {
                return Err(err);
            }
            inner.room(room_id).map(|room| room.state.clone())
        }
    }

    fn subscribe(&self, room_id: &RoomId, sink: UpdateSink) -> Result<SubscriptionId, SessionError> {
        let mut inner = self.lock();
        inner.calls.subscribe += 1;
        if let Some(err) = inner.failures.subscribe.pop_front() {
            return Err(err);
        }
        inner.room(room_id)?;

        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.subscribers.insert(id, (room_id.clone(), sink));
        Ok(id)
    }

    fn unsubscribe(&self, _room_id: &RoomId, subscription: SubscriptionId) {
        let mut inner = self.lock();
        inner.calls.unsubscribe += 1;
        inner.subscribers.remove(&subscription);
    }

    fn paginate_back(
        &self,
        room_id: &RoomId,
        from: Option<PaginationToken>,
        limit: usize,
    ) -> impl Future<Output = Result<HistoryPage, SessionError>> + Send {
        async move {
            self.lock().calls.paginate += 1;
            self.pagination_gate.pass().await;

            let mut inner = self.lock();
            if let Some(err) = inner.failures.pagination.pop_front() {
                return Err(err);
            }
            let room = inner.room(room_id)?;

            let end = match from {
                None => room.history.len(),
                Some(PaginationToken(token)) => token
                    .parse::<usize>()
                    .map_err(|_| SessionError::Protocol(format!("bad token {token}")))?
                    .min(room.history.len()),
            };
            let start = end.saturating_sub(limit);
            let events = room.history[start..end].iter().rev().cloned().collect();
            let end = (start > 0).then(|| PaginationToken(start.to_string()));
            Ok(HistoryPage { events, end })
        }
    }

    fn send_message(
        &self,
        room_id: &RoomId,
        content: MessageContent,
    ) -> impl Future<Output = Result<EventId, SessionError>> + Send {
        async move {
            self.lock().calls.send += 1;
            self.send_gate.pass().await;
            self.persist(room_id, content)
        }
    }

    fn send_image(
        &self,
        room_id: &RoomId,
        image: ImageUpload,
    ) -> impl Future<Output = Result<EventId, SessionError>> + Send {
        async move {
            self.lock().calls.send += 1;
            self.send_gate.pass().await;
            let content = MessageContent {
                msgtype: MessageType::Image,
                body: Some(image.name),
                url: Some(format!("mxc://sim/{}", image.data.len())),
            };
            self.persist(room_id, content)
        }
    }
}
