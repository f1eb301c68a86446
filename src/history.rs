use std::collections::VecDeque;

use uuid::Uuid;

use crate::color::Rgba;
use crate::document::{Document, DocumentSnapshot, Layer, LayerGroup};

// ============================================================================
// DIFF-BASED HISTORY — undo/redo without per-step full-grid snapshots
// ============================================================================
//
// Protocol: the document stashes a deep "before" snapshot at the start of a
// logical action (every mutating operation arms it automatically); `commit`
// diffs that snapshot against live state and stores only the delta. Undo
// applies the delta inverted, redo applies it forward, and the two are exact
// inverses of each other — no fuzzy resynthesis.

/// One changed pixel, scoped to a layer id (each layer owns its own grid, so
/// the coordinate is unambiguous).
#[derive(Clone, Debug, PartialEq)]
pub struct PixelChange {
    pub layer_id: Uuid,
    pub x: u32,
    pub y: u32,
    pub old: Option<Rgba>,
    pub new: Option<Rgba>,
}

#[derive(Clone, Debug)]
pub enum LayerChange {
    /// Layer exists only in the "after" state. The clone carries the pixels
    /// it had at the end of the action.
    Added(Layer),
    /// Layer exists only in the "before" state.
    Removed(Layer),
    /// Metadata changed. Pixels inside these clones are ignored on replay;
    /// pixel-level deltas are recorded separately and applied first.
    Updated { old: Layer, new: Layer },
}

#[derive(Clone, Debug)]
pub enum GroupChange {
    Added(LayerGroup),
    Removed(LayerGroup),
    Updated { old: LayerGroup, new: LayerGroup },
}

/// The delta of one logical user action. An entry with all three lists
/// empty is never recorded.
#[derive(Clone, Debug, Default)]
pub struct HistoryEntry {
    pub pixel_changes: Vec<PixelChange>,
    pub layer_changes: Vec<LayerChange>,
    pub group_changes: Vec<GroupChange>,
}

impl HistoryEntry {
    pub fn is_empty(&self) -> bool {
        self.pixel_changes.is_empty()
            && self.layer_changes.is_empty()
            && self.group_changes.is_empty()
    }

    /// Approximate retained bytes, for the history memory cap.
    fn memory_bytes(&self) -> usize {
        let grid_bytes = |l: &Layer| (l.pixels.width() * l.pixels.height()) as usize * 5;
        let layer_bytes: usize = self
            .layer_changes
            .iter()
            .map(|c| match c {
                LayerChange::Added(l) | LayerChange::Removed(l) => grid_bytes(l),
                LayerChange::Updated { old, new } => grid_bytes(old) + grid_bytes(new),
            })
            .sum();
        self.pixel_changes.len() * std::mem::size_of::<PixelChange>()
            + layer_bytes
            + self.group_changes.len() * std::mem::size_of::<GroupChange>()
    }

    fn touched_layer_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.pixel_changes.iter().map(|c| c.layer_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Bounded undo/redo list with a cursor. Entries past the cursor are the
/// redo tail; pushing a new entry truncates them.
pub struct History {
    entries: VecDeque<HistoryEntry>,
    /// Number of entries currently applied to the document.
    applied: usize,
    max_entries: usize,
    max_memory_bytes: Option<usize>,
    total_memory: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            applied: 0,
            max_entries,
            max_memory_bytes: Some(32 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the next entry to undo; `None` at the start of history.
    pub fn cursor(&self) -> Option<usize> {
        self.applied.checked_sub(1)
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.applied = 0;
        self.total_memory = 0;
    }

    /// Diff the document's pending snapshot against its live state and push
    /// the delta. Returns `false` (and records nothing) when the action
    /// turned out to be a no-op.
    pub fn commit(&mut self, doc: &mut Document) -> bool {
        let Some(snapshot) = doc.take_pending_snapshot() else { return false };
        let entry = diff(&snapshot, doc);
        if entry.is_empty() {
            return false;
        }

        // Truncate the redo tail.
        while self.entries.len() > self.applied {
            if let Some(dropped) = self.entries.pop_back() {
                self.total_memory = self.total_memory.saturating_sub(dropped.memory_bytes());
            }
        }

        self.total_memory += entry.memory_bytes();
        self.entries.push_back(entry);
        self.applied += 1;
        self.prune();
        true
    }

    /// Apply the inverse of the entry at the cursor. No-op at the start of
    /// history.
    pub fn undo(&mut self, doc: &mut Document) -> bool {
        if self.applied == 0 {
            return false;
        }
        // An uncommitted snapshot predates the replay and no longer pairs
        // with any state; it must not feed a later diff.
        doc.take_pending_snapshot();
        self.applied -= 1;
        let entry = self.entries[self.applied].clone();
        apply(doc, &entry, Direction::Backward);
        true
    }

    /// Re-apply the entry just past the cursor. No-op at the end of history.
    pub fn redo(&mut self, doc: &mut Document) -> bool {
        if self.applied >= self.entries.len() {
            return false;
        }
        doc.take_pending_snapshot();
        let entry = self.entries[self.applied].clone();
        self.applied += 1;
        apply(doc, &entry, Direction::Forward);
        true
    }

    fn prune(&mut self) {
        while self.entries.len() > self.max_entries {
            if let Some(dropped) = self.entries.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(dropped.memory_bytes());
                self.applied = self.applied.saturating_sub(1);
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.entries.len() > 1 {
                if let Some(dropped) = self.entries.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(dropped.memory_bytes());
                    self.applied = self.applied.saturating_sub(1);
                }
            }
        }
    }
}

// ============================================================================
// DIFF COMPUTATION
// ============================================================================

fn diff(before: &DocumentSnapshot, doc: &Document) -> HistoryEntry {
    let mut entry = HistoryEntry::default();

    for layer in doc.layers() {
        match before.layers.iter().find(|l| l.id == layer.id) {
            Some(old) => {
                diff_pixels(old, layer, &mut entry.pixel_changes);
                if !old.metadata_eq(layer) {
                    entry.layer_changes.push(LayerChange::Updated {
                        old: old.clone(),
                        new: layer.clone(),
                    });
                }
            }
            None => entry.layer_changes.push(LayerChange::Added(layer.clone())),
        }
    }
    for old in &before.layers {
        if doc.layer(old.id).is_none() {
            entry.layer_changes.push(LayerChange::Removed(old.clone()));
        }
    }

    for group in doc.groups() {
        match before.groups.iter().find(|g| g.id == group.id) {
            Some(old) => {
                if old != group {
                    entry.group_changes.push(GroupChange::Updated {
                        old: old.clone(),
                        new: group.clone(),
                    });
                }
            }
            None => entry.group_changes.push(GroupChange::Added(group.clone())),
        }
    }
    for old in &before.groups {
        if doc.group(old.id).is_none() {
            entry.group_changes.push(GroupChange::Removed(old.clone()));
        }
    }

    entry
}

fn diff_pixels(old: &Layer, new: &Layer, out: &mut Vec<PixelChange>) {
    let w = new.pixels.width().max(old.pixels.width());
    let h = new.pixels.height().max(old.pixels.height());
    for y in 0..h {
        for x in 0..w {
            let before = old.pixels.get(x, y);
            let after = new.pixels.get(x, y);
            if before != after {
                out.push(PixelChange { layer_id: new.id, x, y, old: before, new: after });
            }
        }
    }
}

// ============================================================================
// REPLAY
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Forward,
    Backward,
}

/// Replay order matters: pixel deltas first (scoped per layer id), then
/// layer add/remove/metadata against the already-pixel-corrected layers,
/// then groups. Afterwards every touched grid is pushed whole to the
/// offload mirror — rebuilds replace, they never forward incrementally.
fn apply(doc: &mut Document, entry: &HistoryEntry, dir: Direction) {
    for change in &entry.pixel_changes {
        let value = match dir {
            Direction::Forward => change.new,
            Direction::Backward => change.old,
        };
        doc.set_layer_pixel_silent(change.layer_id, change.x, change.y, value);
    }

    for change in &entry.layer_changes {
        match (dir, change) {
            (Direction::Forward, LayerChange::Added(layer)) => {
                doc.insert_layer_raw(layer.clone());
            }
            (Direction::Forward, LayerChange::Removed(layer)) => {
                doc.remove_layer_raw(layer.id);
            }
            (Direction::Forward, LayerChange::Updated { new, .. }) => {
                doc.apply_layer_metadata(new);
            }
            (Direction::Backward, LayerChange::Added(layer)) => {
                doc.remove_layer_raw(layer.id);
            }
            (Direction::Backward, LayerChange::Removed(layer)) => {
                doc.insert_layer_raw(layer.clone());
            }
            (Direction::Backward, LayerChange::Updated { old, .. }) => {
                doc.apply_layer_metadata(old);
            }
        }
    }

    for change in &entry.group_changes {
        match (dir, change) {
            (Direction::Forward, GroupChange::Added(group)) => {
                doc.insert_group_raw(group.clone());
            }
            (Direction::Forward, GroupChange::Removed(group)) => {
                doc.remove_group_raw(group.id);
            }
            (Direction::Forward, GroupChange::Updated { new, .. }) => {
                doc.apply_group_metadata(new);
            }
            (Direction::Backward, GroupChange::Added(group)) => {
                doc.remove_group_raw(group.id);
            }
            (Direction::Backward, GroupChange::Removed(group)) => {
                doc.insert_group_raw(group.clone());
            }
            (Direction::Backward, GroupChange::Updated { old, .. }) => {
                doc.apply_group_metadata(old);
            }
        }
    }

    for id in entry.touched_layer_ids() {
        doc.push_layer_to_mirror(id);
    }
    doc.mark_dirty();
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::document::{LayerType, NoiseSettings};

    fn snapshot(doc: &Document) -> (Vec<Layer>, Vec<LayerGroup>) {
        (doc.layers().to_vec(), doc.groups().to_vec())
    }

    #[test]
    fn pixel_edits_round_trip_exactly() {
        let mut doc = Document::default();
        let mut history = History::default();

        doc.drawing_color = Rgba::opaque(10, 10, 10);
        doc.set_pixel(0, 0);
        doc.set_pixel(1, 0);
        history.commit(&mut doc);
        let after_first = snapshot(&doc);

        doc.drawing_color = Rgba::opaque(200, 0, 0);
        doc.set_pixel(1, 0);
        doc.set_pixel(2, 0);
        history.commit(&mut doc);
        let after_second = snapshot(&doc);

        assert!(history.undo(&mut doc));
        assert_eq!(snapshot(&doc), after_first);
        assert!(history.undo(&mut doc));
        assert!(doc.layers().is_empty());
        assert!(!history.undo(&mut doc));

        assert!(history.redo(&mut doc));
        assert_eq!(snapshot(&doc), after_first);
        assert!(history.redo(&mut doc));
        assert_eq!(snapshot(&doc), after_second);
        assert!(!history.redo(&mut doc));
    }

    #[test]
    fn noop_actions_are_suppressed() {
        let mut doc = Document::default();
        let mut history = History::default();

        doc.drawing_color = Rgba::opaque(5, 5, 5);
        doc.set_pixel(0, 0);
        assert!(history.commit(&mut doc));
        assert_eq!(history.len(), 1);

        // Re-painting the same color produces an empty diff.
        doc.set_pixel(0, 0);
        assert!(!history.commit(&mut doc));
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), Some(0));

        // Setting visibility to its current value is also a no-op.
        let id = doc.layers()[0].id;
        doc.set_layer_visible(id, true);
        assert!(!history.commit(&mut doc));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn metadata_updates_round_trip() {
        let mut doc = Document::default();
        let mut history = History::default();

        let id = doc.add_layer("skin".into(), Rgba::opaque(1, 2, 3), LayerType::Direct);
        history.commit(&mut doc);

        doc.set_layer_opacity(id, 40);
        doc.rename_layer(id, "skin-tinted".into());
        history.commit(&mut doc);

        history.undo(&mut doc);
        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.opacity, 100);
        assert_eq!(layer.name, "skin");

        history.redo(&mut doc);
        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.opacity, 40);
        assert_eq!(layer.name, "skin-tinted");
    }

    #[test]
    fn removed_layers_are_reinserted_with_their_pixels() {
        let mut doc = Document::default();
        let mut history = History::default();

        doc.drawing_color = Rgba::opaque(42, 42, 42);
        doc.set_pixel(5, 5);
        history.commit(&mut doc);
        let id = doc.layers()[0].id;

        doc.remove_layer(id);
        history.commit(&mut doc);
        assert!(doc.layers().is_empty());

        history.undo(&mut doc);
        assert_eq!(doc.layer(id).unwrap().pixels.get(5, 5), Some(Rgba::opaque(42, 42, 42)));
    }

    #[test]
    fn group_changes_round_trip() {
        let mut doc = Document::default();
        let mut history = History::default();

        let lid = doc.add_layer("a".into(), Rgba::opaque(0, 0, 0), LayerType::Direct);
        history.commit(&mut doc);

        let gid = doc.add_group("arms".into());
        doc.move_layer_to_group(lid, Some(gid));
        history.commit(&mut doc);

        doc.set_group_visible(gid, false);
        history.commit(&mut doc);

        history.undo(&mut doc);
        assert!(doc.group(gid).unwrap().visible);
        history.undo(&mut doc);
        assert!(doc.group(gid).is_none());
        assert_eq!(doc.layer(lid).unwrap().group_id, None);

        history.redo(&mut doc);
        assert_eq!(doc.layer(lid).unwrap().group_id, Some(gid));
        history.redo(&mut doc);
        assert!(!doc.group(gid).unwrap().visible);
    }

    #[test]
    fn undo_discards_an_uncommitted_snapshot() {
        let mut doc = Document::default();
        let mut history = History::default();

        doc.drawing_color = Rgba::opaque(1, 1, 1);
        doc.set_pixel(0, 0);
        history.commit(&mut doc);

        // An edit arms a snapshot but is undone before ever committing.
        doc.set_pixel(1, 0);
        assert!(history.undo(&mut doc));

        // The stale snapshot must not diff against post-undo state.
        assert!(!history.commit(&mut doc));
        assert_eq!(history.len(), 1);
        assert!(history.can_redo());
    }

    #[test]
    fn new_action_truncates_redo_tail() {
        let mut doc = Document::default();
        let mut history = History::default();

        doc.drawing_color = Rgba::opaque(1, 1, 1);
        doc.set_pixel(0, 0);
        history.commit(&mut doc);
        doc.set_pixel(1, 0);
        history.commit(&mut doc);

        history.undo(&mut doc);
        assert!(history.can_redo());

        doc.drawing_color = Rgba::opaque(2, 2, 2);
        doc.set_pixel(3, 0);
        history.commit(&mut doc);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut doc = Document::default();
        let mut history = History::new(4);
        doc.drawing_color = Rgba::opaque(9, 9, 9);
        for i in 0..10u32 {
            doc.set_pixel(i % 64, i / 64);
            history.commit(&mut doc);
        }
        assert_eq!(history.len(), 4);
        // Only four undos are possible; the oldest six were dropped.
        let mut undos = 0;
        while history.undo(&mut doc) {
            undos += 1;
        }
        assert_eq!(undos, 4);
    }

    #[test]
    fn noise_settings_update_round_trips() {
        let mut doc = Document::default();
        let mut history = History::default();
        let id = doc.add_layer("hair".into(), Rgba::opaque(80, 60, 20), LayerType::Direct);
        history.commit(&mut doc);

        let noise = NoiseSettings { brightness: 30, hue: 10, material: crate::color::Material::Hair };
        doc.set_layer_noise(id, noise);
        history.commit(&mut doc);

        history.undo(&mut doc);
        assert_eq!(doc.layer(id).unwrap().noise, NoiseSettings::default());
        history.redo(&mut doc);
        assert_eq!(doc.layer(id).unwrap().noise, noise);
    }
}
