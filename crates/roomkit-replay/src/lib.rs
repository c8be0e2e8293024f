//! Transcript replay for roomkit.
//!
//! Loads a recorded room, prepares a [`RoomDataSource`] over the in-memory
//! session, delivers the recorded live events, sends the recorded messages
//! and renders the final timeline as plain text.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{path::Path, sync::Arc};

use roomkit_app::{DataSourceConfig, DataSourceError, RoomDataSource};
use roomkit_harness::{InvariantRegistry, SimEnv, Transcript, render_timeline};
use thiserror::Error;

/// Errors from a replay run.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Transcript file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Transcript is not valid JSON for the expected shape.
    #[error("invalid transcript: {0}")]
    Parse(#[from] serde_json::Error),

    /// A data source operation failed.
    #[error("data source: {0}")]
    DataSource(#[from] DataSourceError),

    /// The resulting timeline broke a structural invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Knobs for a replay run.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Data source configuration.
    pub config: DataSourceConfig,
    /// Back-paginate the whole history after preparing.
    pub full_history: bool,
    /// Check the standard invariants on the final timeline.
    pub check_invariants: bool,
}

/// Read and replay the transcript at `path`.
pub async fn replay_file(path: &Path, options: &ReplayOptions) -> Result<String, ReplayError> {
    let json = std::fs::read_to_string(path)
        .map_err(|source| ReplayError::Read { path: path.display().to_string(), source })?;
    let transcript = Transcript::from_json(&json)?;
    replay(&transcript, options).await
}

/// Replay `transcript` and render the resulting timeline.
pub async fn replay(transcript: &Transcript, options: &ReplayOptions) -> Result<String, ReplayError> {
    let session = Arc::new(transcript.session());
    let ds = RoomDataSource::new(
        Arc::clone(&session),
        transcript.room_id.clone(),
        SimEnv::default(),
        options.config.clone(),
    );

    ds.prepare().await?;
    tracing::info!(
        room = %transcript.room_id,
        history = transcript.history.len(),
        bubbles = ds.bubble_count(),
        "data source ready"
    );

    if options.full_history {
        let page = options.config.fill_page_size.max(1);
        while !ds.paginate_back(page).await?.exhausted {}
    }

    for event in &transcript.live {
        session.deliver(event.clone());
    }
    ds.flush().await?;

    for body in &transcript.send {
        if let Err(err) = ds.send_text_message(body.clone()).await {
            tracing::warn!(%err, "send failed");
        }
    }

    let timeline = ds.snapshot().ok_or(DataSourceError::Disposed)?;
    if options.check_invariants {
        InvariantRegistry::standard().check_all(&timeline).map_err(|violations| {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            ReplayError::Invariant(messages.join("; "))
        })?;
    }

    ds.destroy()?;
    Ok(render_timeline(&timeline))
}
