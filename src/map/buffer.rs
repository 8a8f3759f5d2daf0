use std::rc::Rc;

use crate::geo::GeoExtent;
use crate::map::{PixelRect, Transform};
use crate::raster::Raster;

/// Published snapshot of a layer's last completed draw
#[derive(Clone, Debug)]
pub struct Stencil {
    pub raster: Rc<Raster>,
    pub extent: GeoExtent,
    pub rect: PixelRect,
}

/// Double-buffered raster cache for one layer.
///
/// Drawing goes into the back buffer; [`LayerBuffer::finish_drawing`] publishes
/// it as the new stencil in one handle swap. The compositor only ever reads
/// stencils, so a draw in progress is never visible half-done unless a host
/// peeks at the back buffer through a buffer-changed notification.
#[derive(Debug, Default)]
pub struct LayerBuffer {
    back: Option<Raster>,
    back_extent: Option<GeoExtent>,
    back_rect: PixelRect,
    front: Option<Stencil>,
}

impl LayerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a full redraw: a fresh transparent back buffer sized to the transform
    pub fn begin_full(&mut self, t: &Transform) -> &mut Raster {
        let size = PixelRect::sized(t.rect.width, t.rect.height);
        // Reuse the allocation when the size is unchanged
        let back = match self.back.take() {
            Some(mut r) if r.size() == (size.width, size.height) => {
                r.clear(crate::raster::Color::TRANSPARENT);
                r
            }
            _ => Raster::new(size.width, size.height),
        };
        self.back_extent = Some(t.extent);
        self.back_rect = size;
        self.back.insert(back)
    }

    /// Start an incremental redraw after a pan of (`dx`, `dy`) pixels at the
    /// same scale: the back buffer starts as the stencil moved by that delta,
    /// so only the exposed strips need drawing. Falls back to a full redraw
    /// (returning `false`) when there is no stencil of matching size.
    pub fn begin_shifted(&mut self, t: &Transform, dx: i32, dy: i32) -> bool {
        let Some(front) = &self.front else {
            self.begin_full(t);
            return false;
        };
        if (front.rect.width, front.rect.height) != (t.rect.width, t.rect.height) {
            self.begin_full(t);
            return false;
        }
        self.back = Some(front.raster.shifted(dx, dy));
        self.back_extent = Some(t.extent);
        self.back_rect = PixelRect::sized(t.rect.width, t.rect.height);
        true
    }

    pub fn back(&self) -> Option<&Raster> {
        self.back.as_ref()
    }

    pub fn back_mut(&mut self) -> Option<&mut Raster> {
        self.back.as_mut()
    }

    pub fn is_drawing(&self) -> bool {
        self.back.is_some()
    }

    /// Publish the back buffer as the stencil. The previous stencil is released
    /// once no compositor still holds its handle.
    pub fn finish_drawing(&mut self) -> bool {
        let (Some(raster), Some(extent)) = (self.back.take(), self.back_extent.take()) else {
            return false;
        };
        self.front = Some(Stencil {
            raster: Rc::new(raster),
            extent,
            rect: self.back_rect,
        });
        true
    }

    /// Drop the in-progress back buffer, keeping the last stencil
    pub fn discard(&mut self) {
        self.back = None;
        self.back_extent = None;
    }

    /// Forget everything, e.g. after the layer's data changed
    pub fn invalidate(&mut self) {
        self.discard();
        self.front = None;
    }

    pub fn stencil(&self) -> Option<&Stencil> {
        self.front.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Canvas, Color};

    fn transform(w: i32, h: i32) -> Transform {
        Transform::new(GeoExtent::new(0.0, 0.0, w as f64, h as f64), PixelRect::sized(w, h)).unwrap()
    }

    #[test]
    fn test_finish_publishes_back_buffer() {
        let mut buf = LayerBuffer::new();
        assert!(buf.stencil().is_none());
        buf.begin_full(&transform(4, 4)).set(1, 1, Color::BLACK);
        assert!(buf.stencil().is_none(), "back buffer must stay private until finished");
        assert!(buf.finish_drawing());
        let stencil = buf.stencil().unwrap();
        assert_eq!(stencil.raster.get(1, 1), Some(Color::BLACK));
        assert!(!buf.is_drawing());
    }

    #[test]
    fn test_swap_releases_previous_stencil() {
        let mut buf = LayerBuffer::new();
        buf.begin_full(&transform(4, 4));
        buf.finish_drawing();
        let held = buf.stencil().unwrap().raster.clone();
        assert_eq!(Rc::strong_count(&held), 2);
        buf.begin_full(&transform(4, 4));
        buf.finish_drawing();
        assert_eq!(Rc::strong_count(&held), 1, "old stencil only kept alive by its reader");
    }

    #[test]
    fn test_discard_keeps_last_stencil() {
        let mut buf = LayerBuffer::new();
        buf.begin_full(&transform(4, 4)).set(0, 0, Color::WHITE);
        buf.finish_drawing();
        buf.begin_full(&transform(4, 4)).set(0, 0, Color::BLACK);
        buf.discard();
        assert!(!buf.finish_drawing());
        assert_eq!(buf.stencil().unwrap().raster.get(0, 0), Some(Color::WHITE));
    }

    #[test]
    fn test_begin_shifted_moves_stencil_content() {
        let mut buf = LayerBuffer::new();
        buf.begin_full(&transform(6, 6)).set(2, 2, Color::BLACK);
        buf.finish_drawing();
        assert!(buf.begin_shifted(&transform(6, 6), -1, 0));
        assert_eq!(buf.back().unwrap().get(1, 2), Some(Color::BLACK));
        // Size change forces a full redraw
        assert!(!buf.begin_shifted(&transform(8, 6), -1, 0));
        assert_eq!(buf.back().unwrap().width(), 8);
    }
}
