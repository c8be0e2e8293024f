//! Data source configuration.

use roomkit_core::EventFilter;

/// Layout constants used to estimate bubble heights.
///
/// Heights are estimates only: the list view measures real cells. The data
/// source needs them to decide how much history fills a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderMetrics {
    /// Height of one text line.
    pub line_height: f32,
    /// Average glyph advance.
    pub char_width: f32,
    /// Height of the sender name row.
    pub header_height: f32,
    /// Height of an attachment thumbnail.
    pub attachment_height: f32,
    /// Vertical padding around each bubble.
    pub bubble_padding: f32,
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self {
            line_height: 18.0,
            char_width: 8.0,
            header_height: 20.0,
            attachment_height: 120.0,
            bubble_padding: 8.0,
        }
    }
}

/// Configuration for a [`crate::RoomDataSource`].
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    /// Events requested by the backfill that runs during `prepare`. Zero
    /// skips the backfill.
    pub initial_page_size: usize,

    /// Events requested per page by `paginate_back_to_fill`.
    pub fill_page_size: usize,

    /// Keep redacted events as stripped bubbles instead of removing them.
    pub show_redactions: bool,

    /// Concatenate two same-sender bubbles made adjacent by a removal.
    pub merge_adjacent_after_removal: bool,

    /// Capacity of the delegate broadcast channel. Slow subscribers lag
    /// rather than block the worker.
    pub event_capacity: usize,

    /// Initial set of displayable event types.
    pub filter: EventFilter,

    /// Height estimation constants.
    pub metrics: RenderMetrics,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            initial_page_size: 20,
            fill_page_size: 30,
            show_redactions: false,
            merge_adjacent_after_removal: false,
            event_capacity: 256,
            filter: EventFilter::default(),
            metrics: RenderMetrics::default(),
        }
    }
}
