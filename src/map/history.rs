use std::collections::VecDeque;

use crate::geo::GeoExtent;

/// Back/forward history of view extents.
///
/// Recording after moving back drops the forward entries. Extent changes
/// made by navigating the history itself are not recorded: [`ExtentHistory::back`]
/// and [`ExtentHistory::forward`] arm a one-shot flag that makes the next
/// [`ExtentHistory::push`] a no-op.
#[derive(Debug)]
pub struct ExtentHistory {
    entries: VecDeque<GeoExtent>,
    index: usize,
    limit: usize,
    suppress_next: bool,
}

impl ExtentHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            limit: limit.max(1),
            suppress_next: false,
        }
    }

    /// Record `extent` as the new current entry. Returns false if the push was
    /// swallowed by a pending navigation or repeats the current entry.
    pub fn push(&mut self, extent: GeoExtent) -> bool {
        if std::mem::take(&mut self.suppress_next) {
            return false;
        }
        if self.current() == Some(extent) {
            return false;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push_back(extent);
        if self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
        true
    }

    /// Step back. `None` at the oldest entry, leaving the index unchanged.
    pub fn back(&mut self) -> Option<GeoExtent> {
        if !self.can_go_back() {
            return None;
        }
        self.index -= 1;
        self.suppress_next = true;
        self.current()
    }

    /// Step forward. `None` at the newest entry, leaving the index unchanged.
    pub fn forward(&mut self) -> Option<GeoExtent> {
        if !self.can_go_forward() {
            return None;
        }
        self.index += 1;
        self.suppress_next = true;
        self.current()
    }

    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty() && self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn current(&self) -> Option<GeoExtent> {
        self.entries.get(self.index).copied()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the current entry from `from` to `to` without moving through
    /// the history. Returns false if the current entry is not `from`.
    pub fn replace_current(&mut self, from: GeoExtent, to: GeoExtent) -> bool {
        match self.entries.get_mut(self.index) {
            Some(entry) if *entry == from => {
                *entry = to;
                true
            }
            _ => false,
        }
    }

    /// Cancel a pending suppression, e.g. when the navigated extent could not be applied
    pub fn clear_suppression(&mut self) {
        self.suppress_next = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(x: f64) -> GeoExtent {
        GeoExtent::new(x, 0.0, x + 1.0, 1.0)
    }

    #[test]
    fn test_back_and_forward_bounds_are_noops() {
        let mut h = ExtentHistory::new(10);
        assert_eq!(h.back(), None);
        h.push(e(0.0));
        h.push(e(1.0));
        assert_eq!(h.forward(), None);
        assert_eq!(h.current(), Some(e(1.0)));

        assert_eq!(h.back(), Some(e(0.0)));
        h.push(e(0.0)); // the navigation's own extent change
        assert_eq!(h.back(), None);
        assert_eq!(h.current(), Some(e(0.0)));
        assert_eq!(h.index(), 0);
    }

    #[test]
    fn test_navigation_does_not_pollute_history() {
        let mut h = ExtentHistory::new(10);
        for x in 0..3 {
            h.push(e(x as f64));
        }
        assert_eq!(h.back(), Some(e(1.0)));
        assert!(!h.push(e(1.0)));
        assert_eq!(h.len(), 3);
        assert_eq!(h.forward(), Some(e(2.0)));
    }

    #[test]
    fn test_push_after_back_truncates_forward() {
        let mut h = ExtentHistory::new(10);
        for x in 0..4 {
            h.push(e(x as f64));
        }
        h.back();
        h.clear_suppression();
        h.back();
        h.clear_suppression();
        assert!(h.push(e(9.0)));
        assert_eq!(h.len(), 3);
        assert!(!h.can_go_forward());
        assert_eq!(h.back(), Some(e(1.0)));
    }

    #[test]
    fn test_replace_current_keeps_position() {
        let mut h = ExtentHistory::new(10);
        h.push(e(0.0));
        h.push(e(400.0));
        assert!(!h.replace_current(e(0.0), e(40.0)));
        assert!(h.replace_current(e(400.0), e(40.0)));
        assert_eq!((h.len(), h.index()), (2, 1));
        assert_eq!(h.current(), Some(e(40.0)));
        assert_eq!(h.back(), Some(e(0.0)));
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut h = ExtentHistory::new(3);
        for x in 0..5 {
            h.push(e(x as f64));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.index(), 2);
        h.back();
        h.clear_suppression();
        assert_eq!(h.back(), Some(e(2.0)));
        assert_eq!(h.back(), None);
    }
}
