//! Undo/redo interface.
//!
//! The engine does not own an undo ledger; it produces [`HistoryEntry`]
//! records describing the state before and after an edit and hands them to
//! the host through a [`HistorySink`]. [`SnapshotDebounce`] coalesces the
//! per-stroke snapshots of a long drawing session into one entry, driven by
//! the frame loop rather than timers.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::document::Document;
use crate::surface::Surface;

/// One restorable piece of layer state.
#[derive(Clone)]
pub enum HistoryState {
    Source(Surface),
    Mask(Option<Surface>),
    Bounds { left: f32, top: f32 },
    MaskOffset { x: f32, y: f32 },
}

/// Matched undo/redo pair for a single edit on a single layer.
pub struct HistoryEntry {
    pub layer_id: Uuid,
    pub description: String,
    pub undo: HistoryState,
    pub redo: HistoryState,
}

impl HistoryEntry {
    fn apply(state: &HistoryState, document: &mut Document, layer_id: Uuid) {
        let Some(layer) = document.layer_mut(layer_id) else {
            crate::log_warn!("history target layer {} no longer exists", layer_id);
            return;
        };
        match state {
            HistoryState::Source(surface) => layer.replace_source(surface.clone()),
            HistoryState::Mask(mask) => layer.mask = mask.clone(),
            HistoryState::Bounds { left, top } => {
                layer.left = *left;
                layer.top = *top;
            }
            HistoryState::MaskOffset { x, y } => {
                layer.mask_x = *x;
                layer.mask_y = *y;
            }
        }
    }

    pub fn apply_undo(&self, document: &mut Document) {
        Self::apply(&self.undo, document, self.layer_id);
    }

    pub fn apply_redo(&self, document: &mut Document) {
        Self::apply(&self.redo, document, self.layer_id);
    }
}

/// Host-side receiver of history entries.
pub trait HistorySink {
    fn enqueue(&mut self, entry: HistoryEntry);
}

/// Vec-backed sink with replay, for tests and simple hosts.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn undo(&mut self, document: &mut Document) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.entries[self.cursor].apply_undo(document);
        true
    }

    pub fn redo(&mut self, document: &mut Document) -> bool {
        if self.cursor >= self.entries.len() {
            return false;
        }
        self.entries[self.cursor].apply_redo(document);
        self.cursor += 1;
        true
    }
}

impl HistorySink for MemoryHistory {
    fn enqueue(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        self.cursor = self.entries.len();
    }
}

/// How long a drawing session may idle before its snapshot is committed.
pub const SNAPSHOT_DEBOUNCE: Duration = Duration::from_secs(5);
/// Re-arm window used while the brush is still down.
pub const SNAPSHOT_REARM: Duration = Duration::from_secs(1);

/// Deadline-based debounce handle, ticked by the frame loop. No timers:
/// the owner polls `due(now)` and tears the handle down on dispose.
#[derive(Default)]
pub struct SnapshotDebounce {
    deadline: Option<Instant>,
}

impl SnapshotDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + SNAPSHOT_DEBOUNCE);
    }

    /// Push the deadline out while drawing continues.
    pub fn re_arm(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.deadline = Some(now + SNAPSHOT_REARM);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarm and report whether a snapshot was pending, for immediate
    /// flushing on tool switches.
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Layer;
    use image::Rgba;

    #[test]
    fn undo_redo_replays_source_snapshots() {
        let mut doc = Document::new(4, 4);
        let id = doc.add_layer(Layer::new("paint", 4, 4));

        let before = doc.layer(id).unwrap().source.clone();
        let mut after = before.clone();
        after.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
        doc.layer_mut(id).unwrap().replace_source(after.clone());

        let mut history = MemoryHistory::new();
        history.enqueue(HistoryEntry {
            layer_id: id,
            description: String::from("brush stroke"),
            undo: HistoryState::Source(before.clone()),
            redo: HistoryState::Source(after.clone()),
        });

        assert!(history.undo(&mut doc));
        assert_eq!(doc.layer(id).unwrap().source, before);
        assert!(history.redo(&mut doc));
        assert_eq!(doc.layer(id).unwrap().source, after);
        assert!(!history.redo(&mut doc));
    }

    #[test]
    fn entry_for_removed_layer_is_skipped() {
        let mut doc = Document::new(4, 4);
        let entry = HistoryEntry {
            layer_id: Uuid::new_v4(),
            description: String::from("orphan"),
            undo: HistoryState::Bounds { left: 0.0, top: 0.0 },
            redo: HistoryState::Bounds { left: 5.0, top: 5.0 },
        };
        // no panic, the entry degrades to a no-op
        entry.apply_undo(&mut doc);
    }

    #[test]
    fn debounce_fires_after_the_deadline() {
        let now = Instant::now();
        let mut debounce = SnapshotDebounce::new();
        debounce.arm(now);
        assert!(!debounce.due(now + Duration::from_secs(4)));
        assert!(debounce.due(now + Duration::from_secs(6)));
    }

    #[test]
    fn re_arm_shortens_while_armed_only() {
        let now = Instant::now();
        let mut debounce = SnapshotDebounce::new();
        debounce.re_arm(now);
        assert!(!debounce.is_armed());
        debounce.arm(now);
        debounce.re_arm(now);
        assert!(debounce.due(now + Duration::from_secs(2)));
        assert!(debounce.take());
        assert!(!debounce.is_armed());
    }
}
