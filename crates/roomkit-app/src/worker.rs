//! Processing queue and the worker draining it.
//!
//! The worker owns the bubble list. Every producer (session live updates,
//! pagination and send completions, filter changes) enqueues a [`Job`]; the
//! worker applies jobs one at a time in arrival order and publishes a fresh
//! [`Timeline`] after each one that changed something.
//!
//! A job is applied synchronously once dequeued, so shutdown is only
//! observed between jobs. Jobs still queued at shutdown are discarded and
//! their acknowledgements dropped.

use std::{collections::HashSet, sync::Arc};

use roomkit_core::{
    AggregationContext, BubbleDataKind, BubbleList, Event, EventFilter, EventFormatter, EventId,
    EventKind, RoomStateSnapshot, SendState, UserId,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::{CellIdentifier, CellRegistry, ChangeSet, DataSourceEvent, Timeline};

/// Mutation requested from the worker.
#[derive(Debug)]
pub(crate) enum WorkItem {
    /// Live event from the session.
    Live(Event),
    /// Users currently typing.
    Typing(HashSet<UserId>),
    /// History page, newest first.
    Page(Vec<Event>),
    /// Pending echo of an outgoing message.
    LocalEcho(Event),
    /// Server confirmed the echo `local_id` as `event`.
    Confirm { local_id: EventId, event: Event },
    /// Delivery state of an echo changed.
    SetSendState { event_id: EventId, send_state: SendState },
    /// Drop an event (user removed a failed echo).
    Remove(EventId),
    /// Replace the displayable event types.
    SetFilter(EventFilter),
    /// Reset the unread counter.
    MarkRead,
    /// No-op, acknowledged once every earlier job is applied.
    Barrier,
}

/// Work item plus an optional completion signal.
#[derive(Debug)]
pub(crate) struct Job {
    item: WorkItem,
    ack: Option<oneshot::Sender<()>>,
}

impl Job {
    pub(crate) fn fire_and_forget(item: WorkItem) -> Self {
        Self { item, ack: None }
    }

    pub(crate) fn acked(item: WorkItem) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { item, ack: Some(tx) }, rx)
    }
}

/// What a job changed.
#[derive(Debug, Default)]
struct Outcome {
    bubbles: Option<ChangeSet>,
    metadata: bool,
}

impl Outcome {
    fn bubbles(changes: ChangeSet) -> Self {
        Self { bubbles: Some(changes), metadata: false }
    }

    fn is_empty(&self) -> bool {
        self.bubbles.is_none() && !self.metadata
    }
}

/// Everything the worker needs at spawn time.
pub(crate) struct WorkerSetup {
    pub(crate) local_user: UserId,
    pub(crate) room_state: RoomStateSnapshot,
    pub(crate) filter: EventFilter,
    pub(crate) formatter: Arc<dyn EventFormatter>,
    pub(crate) registry: Arc<CellRegistry>,
    pub(crate) show_redactions: bool,
    pub(crate) merge_adjacent: bool,
    pub(crate) timeline: watch::Sender<Arc<Timeline>>,
    pub(crate) events: broadcast::Sender<DataSourceEvent>,
}

pub(crate) struct Worker {
    local_user: UserId,
    room_state: Arc<RoomStateSnapshot>,
    filter: EventFilter,
    formatter: Arc<dyn EventFormatter>,
    registry: Arc<CellRegistry>,
    show_redactions: bool,
    merge_adjacent: bool,
    bubbles: BubbleList,
    typing: HashSet<UserId>,
    last_message: Option<Event>,
    unread_count: usize,
    timeline: watch::Sender<Arc<Timeline>>,
    events: broadcast::Sender<DataSourceEvent>,
}

impl Worker {
    pub(crate) fn new(setup: WorkerSetup) -> Self {
        Self {
            local_user: setup.local_user,
            room_state: Arc::new(setup.room_state),
            filter: setup.filter,
            formatter: setup.formatter,
            registry: setup.registry,
            show_redactions: setup.show_redactions,
            merge_adjacent: setup.merge_adjacent,
            bubbles: BubbleList::new(),
            typing: HashSet::new(),
            last_message: None,
            unread_count: 0,
            timeline: setup.timeline,
            events: setup.events,
        }
    }

    /// Drain `queue` until every producer is gone or `shutdown` fires.
    pub(crate) async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<Job>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => self.handle(job),
                    None => break,
                },
            }
        }

        queue.close();
        let discarded = std::iter::from_fn(|| queue.try_recv().ok()).count();
        tracing::debug!(discarded, bubbles = self.bubbles.len(), "worker stopped");
    }

    pub(crate) fn handle(&mut self, job: Job) {
        let Job { item, ack } = job;
        let outcome = self.apply(item);

        if !outcome.is_empty() {
            self.publish();
        }
        if let Some(changes) = outcome.bubbles {
            let _ = self.events.send(DataSourceEvent::BubblesChanged(changes));
        }
        if outcome.metadata {
            let _ = self.events.send(DataSourceEvent::MetadataChanged);
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn apply(&mut self, item: WorkItem) -> Outcome {
        let mut outcome = self.apply_item(item);
        // Structural changes can move a typing user's latest bubble.
        if outcome.bubbles.is_some()
            && !self.typing.is_empty()
            && self.bubbles.set_typing(&self.typing)
        {
            outcome.bubbles = Some(ChangeSet::Reload);
        }
        outcome
    }

    fn apply_item(&mut self, item: WorkItem) -> Outcome {
        match item {
            WorkItem::Live(event) => self.apply_live(event),
            WorkItem::Typing(users) => {
                self.typing = users;
                if self.bubbles.set_typing(&self.typing) {
                    Outcome::bubbles(ChangeSet::Reload)
                } else {
                    Outcome::default()
                }
            },
            WorkItem::Page(events) => self.apply_page(events),
            WorkItem::LocalEcho(event) => {
                let index = self.append(event.clone());
                self.last_message = Some(event);
                Outcome { bubbles: Some(ChangeSet::Range(index..index + 1)), metadata: true }
            },
            WorkItem::Confirm { local_id, event } => self.replace(&local_id, event),
            WorkItem::SetSendState { event_id, send_state } => {
                match self.bubbles.event(&event_id) {
                    Some(current) if current.send_state != send_state => {
                        let updated = current.with_send_state(send_state);
                        self.replace(&event_id, updated)
                    },
                    _ => Outcome::default(),
                }
            },
            WorkItem::Remove(event_id) => self.remove(&event_id),
            WorkItem::SetFilter(filter) => {
                tracing::debug!(allowed = filter.allowed().len(), "event filter replaced");
                self.filter = filter;
                Outcome::default()
            },
            WorkItem::MarkRead => {
                let changed = self.unread_count != 0;
                self.unread_count = 0;
                Outcome { bubbles: None, metadata: changed }
            },
            WorkItem::Barrier => Outcome::default(),
        }
    }

    fn apply_live(&mut self, event: Event) -> Outcome {
        if let EventKind::Redaction { redacts } = &event.kind {
            let target = redacts.clone();
            return self.apply_redaction(&target);
        }

        // A known identifier is a new version of a displayed event, typically
        // the server echo of a confirmed local message.
        if self.bubbles.event(&event.event_id).is_some() {
            let event_id = event.event_id.clone();
            return self.replace(&event_id, event);
        }

        Arc::make_mut(&mut self.room_state).apply(&event);
        if !self.filter.is_displayable(&event) {
            return Outcome::default();
        }

        let incoming = self.is_incoming(&event);
        let index = self.append(event.clone());
        self.last_message = Some(event);
        if incoming {
            self.unread_count += 1;
        }
        Outcome { bubbles: Some(ChangeSet::Range(index..index + 1)), metadata: true }
    }

    fn apply_page(&mut self, events: Vec<Event>) -> Outcome {
        let mut applied = 0usize;
        let mut metadata = false;

        for event in events {
            if self.bubbles.event(&event.event_id).is_some() || !self.filter.is_displayable(&event)
            {
                continue;
            }
            if self.last_message.is_none() {
                self.last_message = Some(event.clone());
                metadata = true;
            }
            let kind = self.data_kind(&event);
            let ctx = AggregationContext {
                local_user: &self.local_user,
                formatter: self.formatter.as_ref(),
                kind,
            };
            self.bubbles.prepend_event(event, &self.room_state, &ctx);
            applied += 1;
        }

        tracing::debug!(applied, bubbles = self.bubbles.len(), "history page applied");
        if applied == 0 {
            return Outcome { bubbles: None, metadata };
        }
        Outcome { bubbles: Some(ChangeSet::Reload), metadata }
    }

    fn apply_redaction(&mut self, target: &EventId) -> Outcome {
        let Some(original) = self.bubbles.event(target).cloned() else {
            return Outcome::default();
        };

        let mut outcome = if self.show_redactions {
            self.replace(target, original.redact())
        } else {
            self.remove(target)
        };

        if self.show_redactions
            && self.last_message.as_ref().is_some_and(|last| &last.event_id == target)
        {
            self.last_message = Some(original.redact());
            outcome.metadata = true;
        }
        outcome
    }

    fn replace(&mut self, event_id: &EventId, event: Event) -> Outcome {
        let Some(index) = self.bubbles.index_of(event_id) else {
            return Outcome::default();
        };

        let touches_last = self
            .last_message
            .as_ref()
            .is_some_and(|last| &last.event_id == event_id || last.event_id == event.event_id);
        if touches_last {
            self.last_message = Some(event.clone());
        }

        let before = self.bubbles.len();
        let changes = match self.bubbles.update_event(event_id, event, self.formatter.as_ref()) {
            None => return Outcome::default(),
            Some(_) if self.bubbles.len() != before => ChangeSet::Reload,
            Some(_) => ChangeSet::Range(index..index + 1),
        };
        Outcome { bubbles: Some(changes), metadata: touches_last }
    }

    fn remove(&mut self, event_id: &EventId) -> Outcome {
        if self.bubbles.remove_event(event_id, self.merge_adjacent).is_none() {
            return Outcome::default();
        }

        let was_last = self.last_message.as_ref().is_some_and(|last| &last.event_id == event_id);
        if was_last {
            self.last_message =
                self.bubbles.last().and_then(|bubble| bubble.events().next_back().cloned());
        }
        Outcome { bubbles: Some(ChangeSet::Reload), metadata: was_last }
    }

    fn append(&mut self, event: Event) -> usize {
        let kind = self.data_kind(&event);
        let ctx = AggregationContext {
            local_user: &self.local_user,
            formatter: self.formatter.as_ref(),
            kind,
        };
        self.bubbles.push_event(event, &self.room_state, &ctx)
    }

    fn is_incoming(&self, event: &Event) -> bool {
        event.sender.as_ref() != Some(&self.local_user)
    }

    fn data_kind(&self, event: &Event) -> BubbleDataKind {
        let id = CellIdentifier::new(self.is_incoming(event), event.is_attachment());
        self.registry.data_kind(id)
    }

    fn publish(&self) {
        let timeline = Timeline {
            bubbles: self.bubbles.clone(),
            last_message: self.last_message.clone(),
            unread_count: self.unread_count,
        };
        self.timeline.send_replace(Arc::new(timeline));
    }
}

#[cfg(test)]
mod tests {
    use roomkit_core::{DefaultFormatter, MessageContent};

    use super::*;

    struct Fixture {
        worker: Worker,
        timeline: watch::Receiver<Arc<Timeline>>,
        events: broadcast::Receiver<DataSourceEvent>,
    }

    fn fixture(show_redactions: bool) -> Fixture {
        let (timeline_tx, timeline) = watch::channel(Arc::new(Timeline::default()));
        let (events_tx, events) = broadcast::channel(64);
        let worker = Worker::new(WorkerSetup {
            local_user: UserId::new("@me"),
            room_state: RoomStateSnapshot::new("!r".into()),
            filter: EventFilter::default(),
            formatter: Arc::new(DefaultFormatter),
            registry: Arc::new(CellRegistry::new()),
            show_redactions,
            merge_adjacent: false,
            timeline: timeline_tx,
            events: events_tx,
        });
        Fixture { worker, timeline, events }
    }

    fn text(id: &str, sender: &str, ts: u64) -> Event {
        Event::message(id, sender, "!r", MessageContent::text(id), ts)
    }

    fn run(worker: &mut Worker, item: WorkItem) {
        worker.handle(Job::fire_and_forget(item));
    }

    #[test]
    fn live_events_publish_and_notify() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));

        let timeline = f.timeline.borrow().clone();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.unread_count, 1);
        assert_eq!(
            f.events.try_recv().ok(),
            Some(DataSourceEvent::BubblesChanged(ChangeSet::Range(0..1)))
        );
        assert_eq!(f.events.try_recv().ok(), Some(DataSourceEvent::MetadataChanged));
    }

    #[test]
    fn undisplayable_live_event_is_silent() {
        let mut f = fixture(false);
        let topic = Event {
            kind: EventKind::Topic { topic: "news".into() },
            ..text("$t", "@bob", 1)
        };
        run(&mut f.worker, WorkItem::Live(topic));

        assert!(f.timeline.borrow().is_empty());
        assert!(f.events.try_recv().is_err());
    }

    #[test]
    fn page_prepends_in_chronological_order() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$3", "@bob", 3)));
        run(&mut f.worker, WorkItem::Page(vec![text("$2", "@alice", 2), text("$1", "@bob", 1)]));

        let timeline = f.timeline.borrow().clone();
        let ids: Vec<_> = timeline
            .bubbles
            .iter()
            .flat_map(|b| b.events().map(|e| e.event_id.to_string()).collect::<Vec<_>>())
            .collect();
        assert_eq!(ids, ["$1", "$2", "$3"]);
        // History does not count as unread.
        assert_eq!(timeline.unread_count, 1);
    }

    #[test]
    fn page_skips_events_already_displayed() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$2", "@bob", 2)));
        run(&mut f.worker, WorkItem::Page(vec![text("$2", "@bob", 2), text("$1", "@bob", 1)]));

        let timeline = f.timeline.borrow().clone();
        assert_eq!(timeline.bubbles.event_count(), 2);
    }

    #[test]
    fn redaction_removes_by_default() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        let redaction = Event {
            kind: EventKind::Redaction { redacts: "$1".into() },
            ..text("$r", "@bob", 2)
        };
        run(&mut f.worker, WorkItem::Live(redaction));

        let timeline = f.timeline.borrow().clone();
        assert!(timeline.is_empty());
        assert_eq!(timeline.last_message, None);
    }

    #[test]
    fn redaction_strips_in_place_when_shown() {
        let mut f = fixture(true);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        let redaction = Event {
            kind: EventKind::Redaction { redacts: "$1".into() },
            ..text("$r", "@bob", 2)
        };
        run(&mut f.worker, WorkItem::Live(redaction));

        let timeline = f.timeline.borrow().clone();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.bubble(0).map(|b| b.text().to_owned()), Some("<redacted>".into()));
        assert!(timeline.last_message.as_ref().is_some_and(|e| e.redacted));
    }

    #[test]
    fn send_state_change_keeps_position() {
        let mut f = fixture(false);
        let echo = Event::local_echo(
            EventId::local(1),
            UserId::new("@me"),
            "!r".into(),
            MessageContent::text("hi"),
            5,
        );
        run(&mut f.worker, WorkItem::LocalEcho(echo));
        run(
            &mut f.worker,
            WorkItem::SetSendState { event_id: EventId::local(1), send_state: SendState::Failed },
        );

        let timeline = f.timeline.borrow().clone();
        assert_eq!(
            timeline.bubbles.event(&EventId::local(1)).map(|e| e.send_state),
            Some(SendState::Failed)
        );
    }

    #[test]
    fn mark_read_resets_counter_once() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        run(&mut f.worker, WorkItem::MarkRead);
        while f.events.try_recv().is_ok() {}

        run(&mut f.worker, WorkItem::MarkRead);
        assert_eq!(f.timeline.borrow().unread_count, 0);
        assert!(f.events.try_recv().is_err());
    }

    #[test]
    fn own_live_messages_are_not_unread() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@me", 1)));
        assert_eq!(f.timeline.borrow().unread_count, 0);
    }

    #[test]
    fn typing_flag_follows_new_bubbles() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        run(&mut f.worker, WorkItem::Typing([UserId::new("@bob")].into_iter().collect()));
        run(&mut f.worker, WorkItem::Live(text("$2", "@alice", 2)));
        while f.events.try_recv().is_ok() {}

        run(&mut f.worker, WorkItem::Live(text("$3", "@bob", 3)));

        let flags: Vec<bool> = f.timeline.borrow().bubbles.iter().map(|b| b.is_typing()).collect();
        assert_eq!(flags, [false, false, true]);
        assert_eq!(f.events.try_recv().ok(), Some(DataSourceEvent::BubblesChanged(ChangeSet::Reload)));
    }

    #[test]
    fn typing_flag_moves_back_when_latest_bubble_is_removed() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        run(&mut f.worker, WorkItem::Live(text("$2", "@alice", 2)));
        run(&mut f.worker, WorkItem::Live(text("$3", "@bob", 3)));
        run(&mut f.worker, WorkItem::Typing([UserId::new("@bob")].into_iter().collect()));

        run(&mut f.worker, WorkItem::Remove("$3".into()));

        let flags: Vec<bool> = f.timeline.borrow().bubbles.iter().map(|b| b.is_typing()).collect();
        assert_eq!(flags, [true, false]);
    }

    #[test]
    fn attachment_replacement_splits_bubble() {
        let mut f = fixture(false);
        run(&mut f.worker, WorkItem::Live(text("$1", "@bob", 1)));
        run(&mut f.worker, WorkItem::Live(text("$2", "@bob", 2)));
        while f.events.try_recv().is_ok() {}

        let image = Event::message("$2", "@bob", "!r", MessageContent::image("a.png", "mxc://a"), 2);
        run(&mut f.worker, WorkItem::Live(image));

        let timeline = f.timeline.borrow().clone();
        assert_eq!(timeline.len(), 2);
        assert!(timeline.bubble(1).is_some_and(|b| b.is_attachment() && b.event_count() == 1));
        assert_eq!(f.events.try_recv().ok(), Some(DataSourceEvent::BubblesChanged(ChangeSet::Reload)));
    }

    #[test]
    fn ack_fires_after_apply() {
        let mut f = fixture(false);
        let (job, mut done) = Job::acked(WorkItem::Barrier);
        f.worker.handle(job);
        assert!(done.try_recv().is_ok());
    }
}
