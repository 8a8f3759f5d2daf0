use std::collections::VecDeque;

use crate::geo::GeoExtent;
use crate::map::PixelRect;

/// Notifications from a map frame to its host
#[derive(Clone, Debug, PartialEq)]
pub enum MapEvent {
    /// These regions of the composite changed and should be repainted
    BufferChanged(Vec<PixelRect>),
    ViewExtentsChanged(GeoExtent),
    /// A back/forward request hit the end of the history
    NavigationUnavailable,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<MapEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: MapEvent) {
        // Consecutive extent changes collapse into the latest one
        if let MapEvent::ViewExtentsChanged(extent) = &event {
            if let Some(MapEvent::ViewExtentsChanged(last)) = self.events.back_mut() {
                *last = *extent;
                return;
            }
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<MapEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_changes_coalesce() {
        let mut q = EventQueue::default();
        q.push(MapEvent::ViewExtentsChanged(GeoExtent::new(0.0, 0.0, 1.0, 1.0)));
        q.push(MapEvent::ViewExtentsChanged(GeoExtent::new(0.0, 0.0, 2.0, 2.0)));
        q.push(MapEvent::NavigationUnavailable);
        assert_eq!(
            q.drain(),
            vec![
                MapEvent::ViewExtentsChanged(GeoExtent::new(0.0, 0.0, 2.0, 2.0)),
                MapEvent::NavigationUnavailable,
            ]
        );
        assert!(q.is_empty());
    }
}
