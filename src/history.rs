//! In-memory history stack.
//!
//! The index of the current entry is the *position cursor* the direction
//! classifier compares: pushing moves to `current + 1`, replacing stays at
//! `current`, going back or forward moves by `delta`.

use crate::route::NavigationType;

/// Navigation history stack
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    current: usize,
}

/// Where a navigation will land in the history stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryMove {
    /// Position of the target entry once committed.
    pub position: usize,
    /// How the move travels through history.
    pub navigation_type: NavigationType,
}

impl History {
    /// Create an empty history (no entries until the first commit).
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the initial entry has been committed
    pub fn is_started(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Current entry, if any
    pub fn current_location(&self) -> Option<&str> {
        self.entries.get(self.current).map(String::as_str)
    }

    /// Current position, if any entry exists
    pub fn position(&self) -> Option<usize> {
        self.is_started().then_some(self.current)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plan a push.
    pub fn plan_push(&self) -> HistoryMove {
        if self.is_started() {
            HistoryMove {
                position: self.current + 1,
                navigation_type: NavigationType::Push,
            }
        } else {
            Self::initial_move()
        }
    }

    /// Plan a replace of the current entry.
    pub fn plan_replace(&self) -> HistoryMove {
        if self.is_started() {
            HistoryMove {
                position: self.current,
                navigation_type: NavigationType::Replace,
            }
        } else {
            Self::initial_move()
        }
    }

    /// Plan a move by `delta` entries; `None` when the target does not exist.
    pub fn plan_go(&self, delta: isize) -> Option<(HistoryMove, &str)> {
        if delta == 0 || !self.is_started() {
            return None;
        }
        let target = self.current.checked_add_signed(delta)?;
        let location = self.entries.get(target)?;
        Some((
            HistoryMove {
                position: target,
                navigation_type: NavigationType::Pop,
            },
            location.as_str(),
        ))
    }

    /// Commit a planned move for `location`.
    pub fn commit(&mut self, planned: HistoryMove, location: String) {
        match planned.navigation_type {
            NavigationType::Initial => {
                self.entries = vec![location];
                self.current = 0;
            }
            NavigationType::Push => {
                self.entries.truncate(self.current + 1);
                self.entries.push(location);
                self.current = self.entries.len() - 1;
            }
            NavigationType::Replace => {
                self.entries[self.current] = location;
            }
            NavigationType::Pop => {
                self.current = planned.position;
            }
        }
    }

    fn initial_move() -> HistoryMove {
        HistoryMove {
            position: 0,
            navigation_type: NavigationType::Initial,
        }
    }
}
