//! Room data source for roomkit
//!
//! Orchestrates a live chat session and a scrolling list view: subscribes to
//! a room, back-paginates history, inserts local echoes for outgoing
//! messages, and serially aggregates everything into bubbles on one worker
//! task.
//!
//! # Components
//!
//! - [`RoomDataSource`]: state machine and public operations
//! - [`Session`]: trait for the external protocol client
//! - [`Timeline`]: immutable snapshot published after every mutation
//! - [`DataSourceEvent`]: delegate notifications broadcast to the UI layer
//! - [`CellRegistry`]: identifier to bubble-data/renderer factory table
//! - [`DataSourceConfig`]: page sizes, redaction policy, render metrics
//!
//! # Concurrency
//!
//! Every bubble-list mutation happens on the worker, which drains a FIFO
//! shared by the session's live updates and the data source's own
//! pagination and send completions. Readers see only complete snapshots.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod data_source;
mod error;
mod event;
mod registry;
mod session;
mod state;
mod system_env;
mod worker;

pub use config::{DataSourceConfig, RenderMetrics};
pub use data_source::{ImageUpload, PaginationOutcome, RoomDataSource};
pub use error::{DataSourceError, SessionError};
pub use event::{CellAction, CellActionKind, ChangeSet, DataSourceEvent};
pub use registry::{CellFactories, CellIdentifier, CellRegistry, Rect, RendererKind};
pub use session::{HistoryPage, PaginationToken, RoomUpdate, Session, SubscriptionId, UpdateSink};
pub use state::{DataSourceState, Timeline};
pub use system_env::SystemEnv;
