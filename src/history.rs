use crate::store::ProofInProgress;

/// A bounded, strictly linear history of proof snapshots with a cursor.
///
/// Every successful mutating command pushes a deep copy of the store. A push
/// after an undo discards the redo tail irrevocably; when the capacity is
/// exceeded the oldest snapshot is evicted. Boundary undo/redo is a no-op
/// reported by the caller, never a failure.
///
/// # Example
/// ```
/// use mmpa::{History, ProofInProgress};
///
/// let mut history = History::new(3, ProofInProgress::new(1, 0));
/// history.push(ProofInProgress::new(2, 0));
/// history.push(ProofInProgress::new(3, 0));
/// assert_eq!(history.undo().unwrap().len(), 2);
/// assert_eq!(history.redo().unwrap().len(), 3);
/// assert!(history.redo().is_none());
/// // a push after undo discards the redo tail
/// history.undo();
/// history.push(ProofInProgress::new(4, 0));
/// assert!(history.redo().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct History {
    snapshots: Vec<ProofInProgress>,
    cursor: usize,
    capacity: usize,
    /// Cursor position at the last save; `None` once it has been evicted or
    /// truncated away.
    saved: Option<usize>,
}

impl History {
    /// Creates a history seeded with the session's initial state. `capacity`
    /// counts snapshots beyond the seed; it is clamped to at least 1.
    pub fn new(capacity: usize, initial: ProofInProgress) -> Self {
        History {
            snapshots: vec![initial],
            cursor: 0,
            capacity: capacity.max(1),
            saved: Some(0),
        }
    }

    /// Appends a snapshot, truncating any redo tail past the cursor and
    /// evicting the oldest snapshot on overflow.
    pub fn push(&mut self, snapshot: ProofInProgress) {
        self.snapshots.truncate(self.cursor + 1);
        if self.saved.map_or(false, |s| s > self.cursor) {
            self.saved = None;
        }
        self.snapshots.push(snapshot);
        if self.snapshots.len() > self.capacity + 1 {
            self.snapshots.remove(0);
            self.saved = match self.saved {
                Some(0) | None => None,
                Some(s) => Some(s - 1),
            };
        } else {
            self.cursor += 1;
        }
    }

    /// Steps the cursor back and returns that snapshot, or `None` at the
    /// bottom.
    pub fn undo(&mut self) -> Option<ProofInProgress> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.snapshots[self.cursor].clone())
    }

    /// Steps the cursor forward and returns that snapshot, or `None` at the
    /// top.
    pub fn redo(&mut self) -> Option<ProofInProgress> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.snapshots[self.cursor].clone())
    }

    /// True iff the current state differs from the last saved (or initial)
    /// one.
    pub fn has_unsaved_changes(&self) -> bool {
        self.saved != Some(self.cursor)
    }

    /// Marks the current state as saved.
    pub fn mark_saved(&mut self) {
        self.saved = Some(self.cursor);
    }

    /// Rebuilds the history with a new capacity, reseeding with the current
    /// state.
    pub fn resize(&mut self, capacity: usize) {
        let current = self.snapshots[self.cursor].clone();
        *self = History::new(capacity, current);
    }

    /// Number of undoable steps from the current cursor.
    pub fn depth(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;

    fn snap(n: usize) -> ProofInProgress {
        ProofInProgress::new(n, 0)
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut h = History::new(10, snap(1));
        for n in 2..=6 {
            h.push(snap(n));
        }
        let final_state = snap(6);
        for _ in 0..5 {
            assert!(h.undo().is_some());
        }
        assert!(h.undo().is_none());
        let mut last = None;
        for _ in 0..5 {
            last = h.redo();
        }
        assert_eq!(last.unwrap(), final_state);
        assert!(h.redo().is_none());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut h = History::new(2, snap(1));
        h.push(snap(2));
        h.push(snap(3));
        h.push(snap(4));
        assert_eq!(h.undo().unwrap(), snap(3));
        assert_eq!(h.undo().unwrap(), snap(2));
        assert!(h.undo().is_none());
    }

    #[test]
    fn save_marker_tracks_cursor() {
        let mut h = History::new(5, snap(1));
        h.push(snap(2));
        assert!(h.has_unsaved_changes());
        h.mark_saved();
        assert!(!h.has_unsaved_changes());
        h.undo();
        assert!(h.has_unsaved_changes());
        h.redo();
        assert!(!h.has_unsaved_changes());
        // editing past the saved point discards the marker
        h.undo();
        h.push(snap(3));
        assert!(h.has_unsaved_changes());
    }

    #[test]
    fn resize_reseeds_with_current() {
        let mut h = History::new(5, snap(1));
        h.push(snap(2));
        h.resize(3);
        assert!(!h.has_unsaved_changes());
        assert!(h.undo().is_none());
    }

    quickcheck! {
        /// After any operation sequence, an undo can be reverted by a redo
        /// and the depth is restored; at the bottom the depth is zero.
        fn undo_is_reverted_by_redo(ops: Vec<u8>) -> bool {
            let mut h = History::new(4, snap(0));
            let mut n = 1;
            for op in ops {
                match op % 3 {
                    0 => {
                        h.push(snap(n));
                        n += 1;
                    }
                    1 => {
                        h.undo();
                    }
                    _ => {
                        h.redo();
                    }
                }
            }
            let depth = h.depth();
            match h.undo() {
                Some(_) => h.redo().is_some() && h.depth() == depth,
                None => depth == 0,
            }
        }

        /// The depth never exceeds the capacity.
        fn depth_is_bounded(pushes: u8) -> bool {
            let mut h = History::new(4, snap(0));
            for n in 0..pushes as usize {
                h.push(snap(n + 1));
            }
            h.depth() <= 4
        }
    }
}
