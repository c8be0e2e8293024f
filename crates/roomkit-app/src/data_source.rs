//! Room data source.
//!
//! [`RoomDataSource`] is the object a list view holds. It drives the
//! lifecycle (`prepare`, `destroy`), forwards history and send requests to
//! the [`Session`], and hands every resulting mutation to the worker. Reads
//! are served from the last published [`Timeline`] and never block on the
//! worker.
//!
//! # Lifecycle
//!
//! ```text
//! Unknown ──prepare──▶ Preparing ──▶ Ready
//!                          │
//!                          └──▶ Failed
//! (any) ──destroy──▶ Unknown (disposed, one-way)
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use roomkit_core::{
    Bubble, DefaultFormatter, Environment, Event, EventFilter, EventFormatter, EventId,
    MessageContent, MessageType, RoomId, SendState, UserId,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    CellAction, CellRegistry, DataSourceConfig, DataSourceError, DataSourceEvent,
    DataSourceState, Rect, Session, SessionError, SubscriptionId, Timeline, UpdateSink,
    worker::{Job, WorkItem, Worker, WorkerSetup},
};

/// Image handed to the session for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// File name, shown until the upload completes.
    pub name: String,
    /// MIME type.
    pub mimetype: String,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// Result of a back-pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationOutcome {
    /// Events received from the session.
    pub events: usize,
    /// The start of the room was reached.
    pub exhausted: bool,
}

/// Payload of an outgoing message. Failed echoes keep theirs so they can
/// be retried.
#[derive(Debug, Clone)]
enum Outgoing {
    Message(MessageContent),
    Image(ImageUpload),
}

impl Outgoing {
    fn echo_content(&self) -> MessageContent {
        match self {
            Self::Message(content) => content.clone(),
            Self::Image(image) => MessageContent {
                msgtype: MessageType::Image,
                body: Some(image.name.clone()),
                url: None,
            },
        }
    }
}

#[derive(Debug, Default)]
struct HistoryCursor {
    token: Option<crate::PaginationToken>,
    exhausted: bool,
}

/// Live connection between the data source and its worker.
struct Pipeline {
    queue: mpsc::UnboundedSender<Job>,
    subscription: SubscriptionId,
}

/// Clears the pagination flag on drop.
struct PaginationGuard<'a>(&'a AtomicBool);

impl<'a> PaginationGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, DataSourceError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| DataSourceError::PaginationInProgress)
    }
}

impl Drop for PaginationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Data source for one room.
///
/// All methods take `&self`; share it behind an `Arc` to call from several
/// tasks. Dropping the data source destroys it.
pub struct RoomDataSource<S: Session, E: Environment> {
    session: Arc<S>,
    env: E,
    room_id: RoomId,
    local_user: UserId,
    config: DataSourceConfig,
    registry: Arc<CellRegistry>,
    formatter: Arc<dyn EventFormatter>,
    filter: Mutex<EventFilter>,
    state: watch::Sender<DataSourceState>,
    timeline: Mutex<Option<watch::Receiver<Arc<Timeline>>>>,
    timeline_tx: Mutex<Option<watch::Sender<Arc<Timeline>>>>,
    events: Mutex<Option<broadcast::Sender<DataSourceEvent>>>,
    pipeline: Mutex<Option<Pipeline>>,
    shutdown: CancellationToken,
    requests: Mutex<CancellationToken>,
    paginating: AtomicBool,
    history: Mutex<HistoryCursor>,
    outgoing: Mutex<HashMap<EventId, Outgoing>>,
    echo_counter: AtomicU64,
    disposed: AtomicBool,
}

impl<S: Session, E: Environment> RoomDataSource<S, E> {
    /// Create a data source for `room_id`. It stays
    /// [`DataSourceState::Unknown`] until [`Self::prepare`].
    pub fn new(session: Arc<S>, room_id: RoomId, env: E, config: DataSourceConfig) -> Self {
        let (timeline_tx, timeline) = watch::channel(Arc::new(Timeline::default()));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shutdown = CancellationToken::new();
        let local_user = session.user_id();

        Self {
            session,
            env,
            room_id,
            local_user,
            filter: Mutex::new(config.filter.clone()),
            config,
            registry: Arc::new(CellRegistry::default()),
            formatter: Arc::new(DefaultFormatter),
            state: watch::Sender::new(DataSourceState::Unknown),
            timeline: Mutex::new(Some(timeline)),
            timeline_tx: Mutex::new(Some(timeline_tx)),
            events: Mutex::new(Some(events)),
            pipeline: Mutex::new(None),
            requests: Mutex::new(shutdown.child_token()),
            shutdown,
            paginating: AtomicBool::new(false),
            history: Mutex::new(HistoryCursor::default()),
            outgoing: Mutex::new(HashMap::new()),
            echo_counter: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Use `registry` to pick bubble-data variants and renderers.
    #[must_use]
    pub fn with_registry(mut self, registry: CellRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Use `formatter` to compose bubble text.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn EventFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Room served by this data source.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Configuration in effect.
    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DataSourceState {
        *self.state.borrow()
    }

    /// Receiver observing lifecycle changes.
    pub fn watch_state(&self) -> watch::Receiver<DataSourceState> {
        self.state.subscribe()
    }

    /// Receiver observing published timelines, `None` once disposed.
    pub fn watch_timeline(&self) -> Option<watch::Receiver<Arc<Timeline>>> {
        lock(&self.timeline).clone()
    }

    /// Subscribe to delegate notifications. The receiver closes when the
    /// data source is destroyed.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<DataSourceEvent>, DataSourceError> {
        lock(&self.events).as_ref().map(broadcast::Sender::subscribe).ok_or(DataSourceError::Disposed)
    }

    /// Subscribe to the session and load the first page of history.
    ///
    /// # Errors
    ///
    /// - `Disposed` after [`Self::destroy`]
    /// - `InvalidState` unless the state is [`DataSourceState::Unknown`]
    /// - `Initialization` if the session cannot serve the room; the data
    ///   source is then [`DataSourceState::Failed`] and no longer
    ///   subscribed
    pub async fn prepare(&self) -> Result<(), DataSourceError> {
        self.ensure_alive()?;
        let started = self.state.send_if_modified(|state| {
            let idle = *state == DataSourceState::Unknown;
            if idle {
                *state = DataSourceState::Preparing;
            }
            idle
        });
        if !started {
            return Err(DataSourceError::InvalidState { state: self.state(), operation: "prepare" });
        }
        self.notify(DataSourceEvent::StateChanged(DataSourceState::Preparing));
        tracing::debug!(room = %self.room_id, "preparing data source");

        match self.initialize().await {
            Ok(()) => {
                self.transition(DataSourceState::Ready);
                tracing::info!(room = %self.room_id, "data source ready");
                Ok(())
            },
            Err(err) => {
                tracing::warn!(room = %self.room_id, %err, "data source initialization failed");
                self.release_pipeline();
                self.transition(DataSourceState::Failed);
                Err(err)
            },
        }
    }

    async fn initialize(&self) -> Result<(), DataSourceError> {
        let room_state = self
            .session
            .room_state(&self.room_id)
            .await
            .map_err(DataSourceError::Initialization)?;

        let timeline = lock(&self.timeline_tx).take().ok_or(DataSourceError::Disposed)?;
        let events = lock(&self.events).clone().ok_or(DataSourceError::Disposed)?;

        let (queue, jobs) = mpsc::unbounded_channel();
        let subscription = self
            .session
            .subscribe(&self.room_id, UpdateSink::new(queue.clone()))
            .map_err(DataSourceError::Initialization)?;

        let worker = Worker::new(WorkerSetup {
            local_user: self.local_user.clone(),
            room_state,
            filter: self.event_filter(),
            formatter: Arc::clone(&self.formatter),
            registry: Arc::clone(&self.registry),
            show_redactions: self.config.show_redactions,
            merge_adjacent: self.config.merge_adjacent_after_removal,
            timeline,
            events,
        });
        tokio::spawn(worker.run(jobs, self.shutdown.clone()));

        {
            let mut pipeline = lock(&self.pipeline);
            if self.disposed.load(Ordering::Acquire) {
                drop(pipeline);
                self.session.unsubscribe(&self.room_id, subscription);
                return Err(DataSourceError::Disposed);
            }
            *pipeline = Some(Pipeline { queue, subscription });
        }
        self.notify(DataSourceEvent::SessionAdded(self.local_user.clone()));

        if self.config.initial_page_size > 0 {
            self.fetch_page(self.config.initial_page_size).await.map_err(|err| match err {
                DataSourceError::Pagination(cause) => DataSourceError::Initialization(cause),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Tear down the data source: unsubscribe, cancel requests, stop the
    /// worker (queued updates are discarded) and close the delegate channel.
    ///
    /// Every later operation fails with `Disposed`; reads return `None`.
    pub fn destroy(&self) -> Result<(), DataSourceError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(DataSourceError::Disposed);
        }

        self.release_pipeline();
        lock(&self.outgoing).clear();
        lock(&self.timeline).take();
        lock(&self.timeline_tx).take();

        self.state.send_replace(DataSourceState::Unknown);
        self.notify(DataSourceEvent::StateChanged(DataSourceState::Unknown));
        lock(&self.events).take();

        tracing::info!(room = %self.room_id, "data source destroyed");
        Ok(())
    }

    /// Stop the worker and detach from the session.
    fn release_pipeline(&self) {
        self.shutdown.cancel();
        let pipeline = lock(&self.pipeline).take();
        if let Some(pipeline) = pipeline {
            self.session.unsubscribe(&self.room_id, pipeline.subscription);
            self.notify(DataSourceEvent::SessionRemoved(self.local_user.clone()));
        }
    }

    /// Abort in-flight pagination and sends. Pending echoes of aborted
    /// sends are marked failed.
    pub fn cancel_all_requests(&self) {
        let previous = std::mem::replace(&mut *lock(&self.requests), self.shutdown.child_token());
        previous.cancel();
        tracing::debug!(room = %self.room_id, "in-flight requests cancelled");
    }

    /// Load `count` older events.
    ///
    /// # Errors
    ///
    /// - `NotReady` without contacting the session unless
    ///   [`DataSourceState::Ready`]
    /// - `PaginationInProgress` if another pagination is outstanding
    /// - `Pagination` or `Cancelled` if the request fails
    pub async fn paginate_back(&self, count: usize) -> Result<PaginationOutcome, DataSourceError> {
        self.ensure_ready()?;
        let _guard = PaginationGuard::acquire(&self.paginating)?;
        self.fetch_page(count).await
    }

    /// Load pages of `fill_page_size` until the estimated height of the
    /// bubbles covers `rect`, or history is exhausted.
    pub async fn paginate_back_to_fill(
        &self,
        rect: Rect,
    ) -> Result<PaginationOutcome, DataSourceError> {
        self.ensure_ready()?;
        let _guard = PaginationGuard::acquire(&self.paginating)?;

        let mut total = PaginationOutcome::default();
        while self.estimated_height(rect.width) < rect.height {
            let page = self.fetch_page(self.config.fill_page_size).await?;
            total.events += page.events;
            total.exhausted = page.exhausted;
            if page.exhausted || page.events == 0 {
                break;
            }
        }
        Ok(total)
    }

    async fn fetch_page(&self, limit: usize) -> Result<PaginationOutcome, DataSourceError> {
        let from = {
            let cursor = lock(&self.history);
            if cursor.exhausted {
                return Ok(PaginationOutcome { events: 0, exhausted: true });
            }
            cursor.token.clone()
        };

        let cancel = self.request_token();
        tracing::debug!(room = %self.room_id, limit, "paginating back");
        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DataSourceError::Cancelled),
            page = self.session.paginate_back(&self.room_id, from, limit) => {
                page.map_err(DataSourceError::Pagination)?
            },
        };

        let exhausted = page.end.is_none();
        {
            let mut cursor = lock(&self.history);
            cursor.token = page.end;
            cursor.exhausted = exhausted;
        }

        let events = page.events.len();
        self.submit(WorkItem::Page(page.events)).await?;
        Ok(PaginationOutcome { events, exhausted })
    }

    /// Estimated height of every bubble laid out `width` points wide.
    pub fn estimated_height(&self, width: f32) -> f32 {
        let Some(timeline) = self.current() else { return 0.0 };
        timeline
            .bubbles
            .iter()
            .map(|bubble| {
                self.registry.renderer_for(bubble).estimated_height(
                    bubble,
                    width,
                    &self.config.metrics,
                )
            })
            .sum()
    }

    /// Send a text message. A pending echo is displayed immediately and
    /// replaced in place once the server confirms it.
    ///
    /// # Errors
    ///
    /// `Send` or `Cancelled` if delivery fails; the echo stays in the list,
    /// marked [`SendState::Failed`].
    pub async fn send_text_message(
        &self,
        text: impl Into<String>,
    ) -> Result<EventId, DataSourceError> {
        self.send(Outgoing::Message(MessageContent::text(text))).await
    }

    /// Send an image. Behaves like [`Self::send_text_message`].
    pub async fn send_image(&self, image: ImageUpload) -> Result<EventId, DataSourceError> {
        self.send(Outgoing::Image(image)).await
    }

    async fn send(&self, outgoing: Outgoing) -> Result<EventId, DataSourceError> {
        self.ensure_ready()?;
        let local_id = EventId::local(self.echo_counter.fetch_add(1, Ordering::Relaxed) + 1);
        let echo = Event::local_echo(
            local_id.clone(),
            self.local_user.clone(),
            self.room_id.clone(),
            outgoing.echo_content(),
            self.env.now_millis(),
        );

        self.submit(WorkItem::LocalEcho(echo.clone())).await?;
        self.deliver(local_id, echo, outgoing).await
    }

    /// Retry a failed local echo in place.
    ///
    /// # Errors
    ///
    /// `UnknownEcho` unless `event_id` is a displayed echo in
    /// [`SendState::Failed`] that no other resend or removal has claimed.
    pub async fn resend_event(&self, event_id: &EventId) -> Result<EventId, DataSourceError> {
        self.ensure_ready()?;
        let echo = self.failed_echo(event_id)?;
        let outgoing = self.claim(event_id)?;

        tracing::debug!(room = %self.room_id, %event_id, "resending");
        self.submit(WorkItem::SetSendState {
            event_id: event_id.clone(),
            send_state: SendState::Pending,
        })
        .await?;
        self.deliver(event_id.clone(), echo.with_send_state(SendState::Pending), outgoing).await
    }

    /// Drop a failed local echo.
    pub async fn remove_local_echo(&self, event_id: &EventId) -> Result<(), DataSourceError> {
        self.ensure_ready()?;
        self.failed_echo(event_id)?;
        self.claim(event_id)?;
        self.submit(WorkItem::Remove(event_id.clone())).await
    }

    fn failed_echo(&self, event_id: &EventId) -> Result<Event, DataSourceError> {
        self.current()
            .and_then(|timeline| {
                timeline
                    .bubbles
                    .event(event_id)
                    .filter(|event| event.send_state == SendState::Failed)
                    .cloned()
            })
            .ok_or_else(|| DataSourceError::UnknownEcho(event_id.clone()))
    }

    /// Take the payload of a failed echo. Only one caller wins; the payload
    /// is put back if the retry fails again.
    fn claim(&self, event_id: &EventId) -> Result<Outgoing, DataSourceError> {
        lock(&self.outgoing)
            .remove(event_id)
            .ok_or_else(|| DataSourceError::UnknownEcho(event_id.clone()))
    }

    async fn deliver(
        &self,
        local_id: EventId,
        echo: Event,
        outgoing: Outgoing,
    ) -> Result<EventId, DataSourceError> {
        let cancel = self.request_token();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DataSourceError::Cancelled),
            result = self.persist(&outgoing) => result.map_err(DataSourceError::Send),
        };

        match result {
            Ok(event_id) => {
                tracing::debug!(room = %self.room_id, %local_id, %event_id, "message sent");
                let confirmed =
                    Event { event_id: event_id.clone(), send_state: SendState::Sent, ..echo };
                self.submit(WorkItem::Confirm { local_id, event: confirmed }).await?;
                Ok(event_id)
            },
            Err(err) => {
                tracing::warn!(room = %self.room_id, %local_id, %err, "send failed");
                if !self.disposed.load(Ordering::Acquire) {
                    lock(&self.outgoing).insert(local_id.clone(), outgoing);
                }
                self.submit(WorkItem::SetSendState {
                    event_id: local_id,
                    send_state: SendState::Failed,
                })
                .await?;
                Err(err)
            },
        }
    }

    async fn persist(&self, outgoing: &Outgoing) -> Result<EventId, SessionError> {
        match outgoing {
            Outgoing::Message(content) => {
                self.session.send_message(&self.room_id, content.clone()).await
            },
            Outgoing::Image(image) => self.session.send_image(&self.room_id, image.clone()).await,
        }
    }

    /// Current event filter.
    pub fn event_filter(&self) -> EventFilter {
        lock(&self.filter).clone()
    }

    /// Replace the displayable event types. Applies to events processed
    /// after every update already queued.
    pub async fn set_event_filter(&self, filter: EventFilter) -> Result<(), DataSourceError> {
        self.ensure_alive()?;
        *lock(&self.filter) = filter.clone();
        if lock(&self.pipeline).is_none() {
            return Ok(());
        }
        self.submit(WorkItem::SetFilter(filter)).await
    }

    /// Reset the unread counter.
    pub async fn mark_all_as_read(&self) -> Result<(), DataSourceError> {
        self.ensure_ready()?;
        self.submit(WorkItem::MarkRead).await
    }

    /// Wait until every update queued so far is applied and published.
    pub async fn flush(&self) -> Result<(), DataSourceError> {
        self.ensure_alive()?;
        self.submit(WorkItem::Barrier).await
    }

    /// Forward a cell interaction to the delegate.
    pub fn report_cell_action(&self, action: CellAction) -> Result<(), DataSourceError> {
        self.ensure_alive()?;
        tracing::debug!(kind = ?action.kind, index = action.bubble_index, "cell action");
        self.notify(DataSourceEvent::CellAction(action));
        Ok(())
    }

    /// Last published timeline, `None` once disposed.
    pub fn snapshot(&self) -> Option<Arc<Timeline>> {
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }
        self.current()
    }

    fn current(&self) -> Option<Arc<Timeline>> {
        lock(&self.timeline).as_ref().map(|timeline| timeline.borrow().clone())
    }

    /// Bubble at `index`.
    pub fn cell_data_at(&self, index: usize) -> Option<Arc<Bubble>> {
        self.snapshot()?.bubble(index)
    }

    /// Bubble hosting `event_id`.
    pub fn cell_data_for_event(&self, event_id: &EventId) -> Option<Arc<Bubble>> {
        self.snapshot()?.bubble_of(event_id)
    }

    /// Number of bubbles.
    pub fn bubble_count(&self) -> usize {
        self.snapshot().map_or(0, |timeline| timeline.len())
    }

    /// Most recent displayable event.
    pub fn last_message(&self) -> Option<Event> {
        self.snapshot()?.last_message.clone()
    }

    /// Incoming live messages since the last [`Self::mark_all_as_read`].
    pub fn unread_count(&self) -> usize {
        self.snapshot().map_or(0, |timeline| timeline.unread_count)
    }

    async fn submit(&self, item: WorkItem) -> Result<(), DataSourceError> {
        let (job, done) = Job::acked(item);
        let queued = {
            let pipeline = lock(&self.pipeline);
            match pipeline.as_ref() {
                Some(pipeline) => pipeline.queue.send(job).is_ok(),
                None if self.disposed.load(Ordering::Acquire) => false,
                None => return Err(DataSourceError::NotReady(self.state())),
            }
        };
        if !queued {
            return Err(DataSourceError::Disposed);
        }
        done.await.map_err(|_| DataSourceError::Disposed)
    }

    fn request_token(&self) -> CancellationToken {
        lock(&self.requests).clone()
    }

    fn transition(&self, next: DataSourceState) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.state.send_replace(next);
        self.notify(DataSourceEvent::StateChanged(next));
    }

    fn notify(&self, event: DataSourceEvent) {
        if let Some(events) = lock(&self.events).as_ref() {
            let _ = events.send(event);
        }
    }

    fn ensure_alive(&self) -> Result<(), DataSourceError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DataSourceError::Disposed);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), DataSourceError> {
        self.ensure_alive()?;
        match self.state() {
            DataSourceState::Ready => Ok(()),
            state => Err(DataSourceError::NotReady(state)),
        }
    }
}

impl<S: Session, E: Environment> Drop for RoomDataSource<S, E> {
    fn drop(&mut self) {
        let _ = self.destroy();
    }
}
