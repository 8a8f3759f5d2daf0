use glam::DVec2;
use log::{debug, info};

use crate::config::RenderConfig;
use crate::geo::GeoExtent;
use crate::map::chunked::RenderHost;
use crate::map::events::MapEvent;
use crate::map::frame::{MapFrame, RenderOutcome};
use crate::map::layer::SharedLayers;
use crate::map::PixelRect;
use crate::raster::{Color, Raster};

/// How the viewport is divided while the view crosses the antimeridian
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DatelineSplit {
    /// Visible part east of the view's left edge, up to +180
    pub primary_extent: GeoExtent,
    /// Overflow past +180, shifted into [-180, ..]
    pub secondary_extent: GeoExtent,
    pub primary_clip: PixelRect,
    pub secondary_clip: PixelRect,
}

impl DatelineSplit {
    /// Split a normalized extent shown in `view`. `None` when the extent does
    /// not cross the antimeridian.
    pub fn compute(extent: &GeoExtent, view: PixelRect) -> Option<Self> {
        if !extent.crosses_dateline() || extent.width() <= 0.0 {
            return None;
        }
        let primary_width = (180.0 - extent.min_x).clamp(0.0, extent.width());
        let boundary = view.x + (view.width as f64 * primary_width / extent.width()).round() as i32;
        let boundary = boundary.clamp(view.x, view.right());
        Some(Self {
            primary_extent: GeoExtent::new(extent.min_x, extent.min_y, 180.0, extent.max_y),
            secondary_extent: GeoExtent::new(-180.0, extent.min_y, extent.max_x - 360.0, extent.max_y),
            primary_clip: PixelRect::new(view.x, view.y, boundary - view.x, view.height),
            secondary_clip: PixelRect::new(boundary, view.y, view.right() - boundary, view.height),
        })
    }
}

/// Two frames drawn as one map when the view wraps the antimeridian.
///
/// Both frames share the layer list and the full viewport. The secondary
/// frame shows the primary's extent shifted by -360° so the overflow lands on
/// the western data; each frame draws and composites only its clip rectangle.
/// After every change the split is recomputed from the primary's extent: the
/// view moves against the content on a pan while the clip boundary, pinned
/// to the antimeridian, moves with it. When the view stops crossing, the
/// secondary frame is suppressed but kept for reuse.
pub struct DatelineCompositor {
    primary: MapFrame,
    secondary: MapFrame,
    split: Option<DatelineSplit>,
    composite: Raster,
    background: Color,
}

impl DatelineCompositor {
    pub fn new(layers: SharedLayers, width: i32, height: i32, config: RenderConfig) -> Self {
        let background = config.background;
        let primary = MapFrame::new(layers.clone(), width, height, config.clone());
        let mut secondary = MapFrame::new(layers, width, height, config);
        secondary.set_suppressed(true);
        let mut compositor = Self {
            primary,
            secondary,
            split: None,
            composite: Raster::filled(width, height, background),
            background,
        };
        compositor.normalize_primary();
        compositor.sync(None);
        compositor
    }

    pub fn primary(&self) -> &MapFrame {
        &self.primary
    }

    pub fn secondary(&self) -> &MapFrame {
        &self.secondary
    }

    /// Mutable access to the primary frame for operations without a wrapper here.
    /// Call [`DatelineCompositor::resync`] afterwards.
    pub fn primary_mut(&mut self) -> &mut MapFrame {
        &mut self.primary
    }

    pub fn split(&self) -> Option<&DatelineSplit> {
        self.split.as_ref()
    }

    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    pub fn composite(&self) -> &Raster {
        &self.composite
    }

    pub fn view_extent(&self) -> GeoExtent {
        self.primary.view_extent()
    }

    pub fn set_view_extent(&mut self, extent: GeoExtent) {
        self.primary.set_view_extent(extent.normalize_lon());
        self.normalize_primary();
        self.sync(None);
    }

    pub fn pan_pixels(&mut self, dx: i32, dy: i32) {
        self.primary.pan_pixels(dx, dy);
        if self.normalize_primary() {
            self.sync(None);
        } else {
            self.sync(Some((dx, dy)));
        }
    }

    pub fn zoom_in(&mut self) {
        self.primary.zoom_in();
        self.resync();
    }

    pub fn zoom_out(&mut self) {
        self.primary.zoom_out();
        self.resync();
    }

    pub fn zoom_at(&mut self, anchor: DVec2, factor: f64) {
        self.primary.zoom_at(anchor, factor);
        self.resync();
    }

    pub fn zoom_to_max_extent(&mut self) {
        self.primary.zoom_to_max_extent();
        self.resync();
    }

    pub fn zoom_previous(&mut self) -> bool {
        let moved = self.primary.zoom_previous();
        self.resync();
        moved
    }

    pub fn zoom_next(&mut self) -> bool {
        let moved = self.primary.zoom_next();
        self.resync();
        moved
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        self.primary.resize(width, height);
        self.secondary.resize(width, height);
        self.composite = Raster::filled(width.max(0), height.max(0), self.background);
        self.resync();
    }

    /// Re-derive the secondary frame and clip rectangles after the primary changed
    pub fn resync(&mut self) {
        self.normalize_primary();
        self.sync(None);
    }

    /// Wrap the primary's extent back into [-180, 180) after it drifted out.
    /// Returns true if the extent changed.
    fn normalize_primary(&mut self) -> bool {
        let current = self.primary.view_extent();
        let normalized = current.normalize_lon();
        if normalized == current {
            return false;
        }
        debug!("view extent {current} normalized to {normalized}");
        self.primary.rebase_extent(normalized);
        true
    }

    fn sync(&mut self, pan: Option<(i32, i32)>) {
        let extent = self.primary.view_extent();
        let view = self.primary.view_rect();
        let split = DatelineSplit::compute(&extent, view);
        match &split {
            Some(s) => {
                let mirrored = extent.translate(-360.0, 0.0);
                match pan {
                    Some((dx, dy)) if self.split.is_some() => {
                        self.secondary.pan_pixels(dx, dy);
                        if !extents_match(&self.secondary.view_extent(), &mirrored) {
                            self.secondary.sync_extent(mirrored);
                        }
                    }
                    _ => self.secondary.sync_extent(mirrored),
                }
                self.primary.set_clip(s.primary_clip);
                self.secondary.set_clip(s.secondary_clip);
                self.secondary.set_suppressed(false);
                if self.split.is_none() {
                    info!("view crosses the antimeridian: {} | {}", s.primary_extent, s.secondary_extent);
                }
            }
            None => {
                self.primary.set_clip(view);
                if self.split.is_some() {
                    info!("view no longer crosses the antimeridian");
                }
                self.secondary.set_suppressed(true);
            }
        }
        self.split = split;
    }

    /// Render both frames and join them side by side
    pub fn render(&mut self, host: &mut dyn RenderHost) -> RenderOutcome {
        let primary = self.primary.render(host);
        if primary == RenderOutcome::Cancelled {
            return primary;
        }
        let secondary = self.secondary.render(host);
        if secondary == RenderOutcome::Cancelled {
            return secondary;
        }
        if primary == RenderOutcome::Unchanged && matches!(secondary, RenderOutcome::Unchanged | RenderOutcome::Suppressed) {
            return RenderOutcome::Unchanged;
        }
        if primary == RenderOutcome::Suppressed {
            return primary;
        }
        self.composite.clear(self.background);
        let full = self.primary.view_rect();
        self.composite.blit_clipped(self.primary.composite(), 0, 0, self.primary.clip());
        if let Some(s) = &self.split {
            self.composite.blit_clipped(self.secondary.composite(), 0, 0, s.secondary_clip);
        }
        debug!("dateline composite {}x{}", full.width, full.height);
        RenderOutcome::Completed
    }

    pub fn needs_render(&self) -> bool {
        self.primary.needs_render() || (!self.secondary.is_suppressed() && self.secondary.needs_render())
    }

    /// Events of the primary frame. The secondary's buffer changes are
    /// reported with it; its extent changes are internal.
    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        let mut events = self.primary.drain_events();
        events.extend(
            self.secondary
                .drain_events()
                .into_iter()
                .filter(|e| matches!(e, MapEvent::BufferChanged(_))),
        );
        events
    }
}

fn extents_match(a: &GeoExtent, b: &GeoExtent) -> bool {
    let tol = 1e-9 * a.width().abs().max(1.0);
    (a.min_x - b.min_x).abs() < tol
        && (a.max_x - b.max_x).abs() < tol
        && (a.min_y - b.min_y).abs() < tol
        && (a.max_y - b.max_y).abs() < tol
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::chunked::NullHost;
    use crate::map::feature::Feature;
    use crate::map::geometry::Geometry;
    use crate::map::layer::{FeatureLayer, LayerStack};
    use crate::map::symbology::{Symbology, Symbolizer};
    use crate::raster::Color;

    const EAST: Color = Color::rgb(255, 0, 0);
    const WEST: Color = Color::rgb(0, 0, 255);

    fn layers() -> SharedLayers {
        let mut stack = LayerStack::new();
        stack.push(FeatureLayer::new(
            "east",
            vec![Feature::new(1, Geometry::point(175.0, 0.0))],
            Symbology::single(Symbolizer::point(EAST, 2.0)),
        ));
        stack.push(FeatureLayer::new(
            "west",
            vec![Feature::new(2, Geometry::point(-175.0, 0.0))],
            Symbology::single(Symbolizer::point(WEST, 2.0)),
        ));
        stack.shared()
    }

    fn count(r: &Raster, c: Color) -> usize {
        r.pixels().iter().filter(|p| **p == c).count()
    }

    #[test]
    fn test_split_of_crossing_extent() {
        let e = GeoExtent::new(170.0, -10.0, 200.0, 10.0);
        let s = DatelineSplit::compute(&e, PixelRect::sized(300, 200)).unwrap();
        assert_eq!(s.primary_extent, GeoExtent::new(170.0, -10.0, 180.0, 10.0));
        assert_eq!(s.secondary_extent, GeoExtent::new(-180.0, -10.0, -160.0, 10.0));
        assert_eq!(s.primary_clip, PixelRect::new(0, 0, 100, 200));
        assert_eq!(s.secondary_clip, PixelRect::new(100, 0, 200, 200));

        let overflow = e.max_x - 180.0;
        assert!(s.secondary_extent.max_x <= 180.0 - overflow);
        assert!((s.primary_extent.width() + s.secondary_extent.width() - e.width()).abs() < 1e-9);
        assert!(DatelineSplit::compute(&GeoExtent::new(0.0, 0.0, 10.0, 10.0), PixelRect::sized(10, 10)).is_none());
    }

    #[test]
    fn test_wide_extent_normalizes_without_split() {
        let mut c = DatelineCompositor::new(layers(), 200, 100, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(-400.0, -200.0, 400.0, 200.0));
        let e = c.view_extent();
        assert!(e.width() <= 360.0 + 1e-9);
        assert!(!c.is_split());
        assert!(c.secondary().is_suppressed());
    }

    #[test]
    fn test_crossing_view_draws_both_sides() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(170.0, -10.0, 200.0, 10.0));
        assert!(c.is_split());
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        // 175 sits in the primary part, -175 (= 185) in the secondary part
        assert!(count(c.composite(), EAST) > 0);
        assert!(count(c.composite(), WEST) > 0);
        assert!(c.composite().get(250, 100).is_some_and(|p| p != WEST));
        assert_eq!(c.composite().get(150, 100), Some(WEST));
        assert_eq!(c.composite().get(50, 100), Some(EAST));
    }

    #[test]
    fn test_pan_keeps_frames_in_step() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(170.0, -10.0, 200.0, 10.0));
        c.render(&mut NullHost);
        let before = c.split().copied().unwrap();
        c.pan_pixels(30, 0);
        let after = c.split().copied().unwrap();
        // View moved west by 3°, the antimeridian boundary followed the content
        assert_eq!(after.primary_clip.width, before.primary_clip.width + 30);
        assert_eq!(after.secondary_clip.x, before.secondary_clip.x + 30);
        let mirrored = c.view_extent().translate(-360.0, 0.0);
        assert!(extents_match(&c.secondary().view_extent(), &mirrored));
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        assert_eq!(c.composite().get(180, 100), Some(WEST));
    }

    #[test]
    fn test_leaving_the_dateline_suppresses_secondary() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(170.0, -10.0, 200.0, 10.0));
        c.render(&mut NullHost);
        c.set_view_extent(GeoExtent::new(140.0, -10.0, 170.0, 10.0));
        assert!(!c.is_split());
        assert!(c.secondary().is_suppressed());
        assert_eq!(c.primary().clip(), PixelRect::sized(300, 200));
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        assert_eq!(count(c.composite(), WEST), 0);
    }

    #[test]
    fn test_panning_past_the_antimeridian_wraps() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(175.0, -10.0, 205.0, 10.0));
        // Move the view 10° east: content shifts 100 px left
        c.pan_pixels(-100, 0);
        let e = c.view_extent();
        assert!((e.min_x - -175.0).abs() < 1e-9, "{e}");
        assert!(!c.is_split());
    }

    #[test]
    fn test_history_records_wrapped_extent() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(175.0, -10.0, 205.0, 10.0));
        let recorded = c.primary().history().len();
        c.pan_pixels(-100, 0);
        let history = c.primary().history();
        assert_eq!(history.current(), Some(c.view_extent()));
        assert!(history.current().is_some_and(|e| e.min_x < 180.0));
        assert_eq!(history.len(), recorded + 1);
    }

    #[test]
    fn test_sliver_left_of_antimeridian() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(150.0, -10.0, 180.0, 10.0));
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        assert!(count(c.composite(), EAST) > 0);

        c.set_view_extent(GeoExtent::new(179.999, -10.0, 209.999, 10.0));
        assert_eq!(c.primary().clip().width, 0);
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        assert_eq!(count(c.composite(), EAST), 0);
        assert_eq!(c.composite().get(50, 100), Some(WEST));
    }

    #[test]
    fn test_sliver_right_of_antimeridian() {
        let mut c = DatelineCompositor::new(layers(), 300, 200, RenderConfig::default());
        c.set_view_extent(GeoExtent::new(150.001, -10.0, 180.001, 10.0));
        assert!(c.is_split());
        assert_eq!(c.primary().clip().width, 300);
        assert_eq!(c.render(&mut NullHost), RenderOutcome::Completed);
        assert_eq!(c.composite().get(250, 100), Some(EAST));
        assert_eq!(count(c.composite(), WEST), 0);
    }
}
