//! Cell registry.
//!
//! Maps each [`CellIdentifier`] to the factories producing its bubble-data
//! variant and its renderer. The data source consults the registry whenever
//! it seeds a bubble, so swapping an entry changes aggregation for every
//! bubble created afterwards.

use std::collections::HashMap;

use roomkit_core::{Bubble, BubbleDataKind};

use crate::RenderMetrics;

/// Direction and content class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellIdentifier {
    /// Text from another user.
    IncomingText,
    /// Attachment from another user.
    IncomingAttachment,
    /// Text from the local user.
    OutgoingText,
    /// Attachment from the local user.
    OutgoingAttachment,
}

impl CellIdentifier {
    /// All identifiers, in registration order.
    pub const ALL: [Self; 4] =
        [Self::IncomingText, Self::IncomingAttachment, Self::OutgoingText, Self::OutgoingAttachment];

    /// Identifier for a direction and content class.
    pub fn new(incoming: bool, attachment: bool) -> Self {
        match (incoming, attachment) {
            (true, false) => Self::IncomingText,
            (true, true) => Self::IncomingAttachment,
            (false, false) => Self::OutgoingText,
            (false, true) => Self::OutgoingAttachment,
        }
    }

    /// Identifier of the cell rendering `bubble`.
    pub fn for_bubble(bubble: &Bubble) -> Self {
        Self::new(bubble.is_incoming(), bubble.is_attachment())
    }
}

/// Renderer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    /// Wrapped text with an optional sender header.
    Text,
    /// Fixed-size thumbnail.
    Attachment,
}

impl RendererKind {
    /// Estimated height of `bubble` laid out `width` points wide.
    pub fn estimated_height(self, bubble: &Bubble, width: f32, metrics: &RenderMetrics) -> f32 {
        let header =
            if bubble.is_same_sender_as_previous() { 0.0 } else { metrics.header_height };
        let body = match self {
            Self::Attachment => metrics.attachment_height,
            Self::Text => {
                let per_line = (width / metrics.char_width).floor().max(1.0);
                let lines: f32 = bubble
                    .text()
                    .split('\n')
                    .map(|line| (line.chars().count() as f32 / per_line).ceil().max(1.0))
                    .sum();
                lines * metrics.line_height
            },
        };
        header + body + metrics.bubble_padding
    }
}

/// Viewport dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Viewport width.
    pub width: f32,
    /// Viewport height.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Factories registered for one identifier.
#[derive(Debug, Clone, Copy)]
pub struct CellFactories {
    /// Bubble-data variant used when seeding a bubble.
    pub data: fn() -> BubbleDataKind,
    /// Renderer used to lay the bubble out.
    pub renderer: fn() -> RendererKind,
}

impl CellFactories {
    /// Standard merging with a text renderer.
    pub fn text() -> Self {
        Self { data: BubbleDataKind::standard, renderer: || RendererKind::Text }
    }

    /// Standard merging with an attachment renderer.
    pub fn attachment() -> Self {
        Self { data: BubbleDataKind::standard, renderer: || RendererKind::Attachment }
    }
}

/// Identifier to factory table.
#[derive(Debug, Clone)]
pub struct CellRegistry {
    entries: HashMap<CellIdentifier, CellFactories>,
}

impl Default for CellRegistry {
    fn default() -> Self {
        let entries = CellIdentifier::ALL
            .into_iter()
            .map(|id| {
                let factories = match id {
                    CellIdentifier::IncomingText | CellIdentifier::OutgoingText => {
                        CellFactories::text()
                    },
                    CellIdentifier::IncomingAttachment | CellIdentifier::OutgoingAttachment => {
                        CellFactories::attachment()
                    },
                };
                (id, factories)
            })
            .collect();
        Self { entries }
    }
}

impl CellRegistry {
    /// Registry with the default entry for every identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the factories for `id`.
    pub fn register(&mut self, id: CellIdentifier, factories: CellFactories) {
        self.entries.insert(id, factories);
    }

    /// Factories registered for `id`.
    pub fn factories(&self, id: CellIdentifier) -> Option<CellFactories> {
        self.entries.get(&id).copied()
    }

    /// Bubble-data variant for `id`, standard if nothing is registered.
    pub fn data_kind(&self, id: CellIdentifier) -> BubbleDataKind {
        self.factories(id).map_or_else(BubbleDataKind::standard, |f| (f.data)())
    }

    /// Renderer for `bubble`. Attachments fall back to the attachment
    /// renderer, everything else to text.
    pub fn renderer_for(&self, bubble: &Bubble) -> RendererKind {
        let id = CellIdentifier::for_bubble(bubble);
        match self.factories(id) {
            Some(f) => (f.renderer)(),
            None if bubble.is_attachment() => RendererKind::Attachment,
            None => RendererKind::Text,
        }
    }
}
