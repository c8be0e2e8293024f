//! Roomkit transcript replay binary.
//!
//! # Usage
//!
//! ```bash
//! # Render the timeline of a recorded room
//! roomkit-replay room.json
//!
//! # Fetch the whole history, show redacted events, verify invariants
//! roomkit-replay room.json --full-history --show-redactions --check
//! ```

use std::{io::Write, path::PathBuf};

use clap::Parser;
use roomkit_app::DataSourceConfig;
use roomkit_replay::{ReplayOptions, replay_file};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomkit transcript replay
#[derive(Parser, Debug)]
#[command(name = "roomkit-replay")]
#[command(about = "Replay a room transcript and print the bubble timeline")]
#[command(version)]
struct Args {
    /// Transcript file (JSON)
    transcript: PathBuf,

    /// Events fetched while preparing
    #[arg(long, default_value = "20")]
    initial_page_size: usize,

    /// Events per request when paginating
    #[arg(long, default_value = "30")]
    page_size: usize,

    /// Paginate until the history is exhausted
    #[arg(long)]
    full_history: bool,

    /// Keep redacted events as stripped placeholders
    #[arg(long)]
    show_redactions: bool,

    /// Merge same-sender neighbours after a removal
    #[arg(long)]
    merge_adjacent: bool,

    /// Fail if the final timeline breaks an invariant
    #[arg(long)]
    check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let options = ReplayOptions {
        config: DataSourceConfig {
            initial_page_size: args.initial_page_size,
            fill_page_size: args.page_size,
            show_redactions: args.show_redactions,
            merge_adjacent_after_removal: args.merge_adjacent,
            ..DataSourceConfig::default()
        },
        full_history: args.full_history,
        check_invariants: args.check,
    };

    tracing::info!(transcript = %args.transcript.display(), "replaying");
    let rendered = replay_file(&args.transcript, &options).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;

    Ok(())
}
