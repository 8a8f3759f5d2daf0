use std::collections::HashMap;
use std::rc::Rc;

use glam::DVec2;
use log::{debug, info};

use crate::config::RenderConfig;
use crate::error::Result;
use crate::geo::GeoExtent;
use crate::map::buffer::LayerBuffer;
use crate::map::chunked::{Flow, RenderHost};
use crate::map::events::{EventQueue, MapEvent};
use crate::map::history::ExtentHistory;
use crate::map::labels::ExistingLabels;
use crate::map::layer::{Layer, LayerId, SharedLayers};
use crate::map::{PixelRect, Transform};
use crate::raster::{Canvas, Raster};

/// Pixels added around a redrawn region when selecting features
const SYMBOL_MARGIN_PX: i32 = 16;

/// What the next render pass has to redraw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Redraw {
    Nothing,
    Full,
    /// Content moved by this many pixels at unchanged scale
    Shift { dx: i32, dy: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    /// Nothing changed since the last pass
    Unchanged,
    /// The host cancelled at a chunk boundary; back buffers were discarded
    Cancelled,
    /// Viewport too small or frame switched off
    Suppressed,
}

/// State shared by every layer drawn during one render pass
pub struct RenderPass {
    pub transform: Transform,
    pub labels: ExistingLabels,
}

impl RenderPass {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            labels: ExistingLabels::new(),
        }
    }
}

/// One map view: a view extent shown in a pixel viewport, drawing a shared
/// layer list through per-layer cached buffers.
///
/// Layer buffers are keyed by layer id and owned by the frame, so several
/// frames can draw the same layers at different extents. Each render pass
/// redraws what changed, publishes the layer buffers and composites their
/// stencils bottom to top, with all labels on top.
pub struct MapFrame {
    layers: SharedLayers,
    config: RenderConfig,
    view_extent: GeoExtent,
    view: PixelRect,
    /// Part of the view this frame draws and composites
    clip: PixelRect,
    buffers: HashMap<LayerId, LayerBuffer>,
    label_buffer: LayerBuffer,
    composite: Raster,
    history: ExtentHistory,
    events: EventQueue,
    redraw: Redraw,
    layers_revision: u64,
    suppressed: bool,
}

impl MapFrame {
    pub fn new(layers: SharedLayers, width: i32, height: i32, config: RenderConfig) -> Self {
        let initial = layers.borrow().max_extent().unwrap_or_else(GeoExtent::world);
        let revision = layers.borrow().revision();
        let view = PixelRect::sized(width.max(0), height.max(0));
        let mut frame = Self {
            layers,
            history: ExtentHistory::new(config.history_limit),
            composite: Raster::filled(view.width, view.height, config.background),
            config,
            view_extent: initial,
            view,
            clip: view,
            buffers: HashMap::new(),
            label_buffer: LayerBuffer::new(),
            events: EventQueue::default(),
            redraw: Redraw::Full,
            layers_revision: revision,
            suppressed: false,
        };
        frame.apply_extent(initial, true);
        frame
    }

    pub fn layers(&self) -> &SharedLayers {
        &self.layers
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn view_extent(&self) -> GeoExtent {
        self.view_extent
    }

    pub fn view_rect(&self) -> PixelRect {
        self.view
    }

    pub fn clip(&self) -> PixelRect {
        self.clip
    }

    /// Restrict drawing and compositing to `clip` (clamped to the view)
    pub fn set_clip(&mut self, clip: PixelRect) {
        let clip = clip.intersection(&self.view).unwrap_or(PixelRect::new(clip.x, clip.y, 0, 0));
        if clip != self.clip {
            self.clip = clip;
            self.redraw = Redraw::Full;
        }
    }

    pub fn history(&self) -> &ExtentHistory {
        &self.history
    }

    pub fn composite(&self) -> &Raster {
        &self.composite
    }

    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        self.events.drain()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// A suppressed frame keeps its state but does not render
    pub fn set_suppressed(&mut self, suppressed: bool) {
        if self.suppressed != suppressed {
            debug!("frame {}", if suppressed { "suppressed" } else { "resumed" });
        }
        self.suppressed = suppressed;
    }

    /// Viewport large enough to render into
    pub fn is_usable(&self) -> bool {
        self.view.width >= self.config.min_viewport_px && self.view.height >= self.config.min_viewport_px
    }

    /// Transform for the current view
    pub fn transform(&self) -> Result<Transform> {
        Transform::clamped(self.view_extent, self.view, self.config.extent_epsilon)
    }

    pub fn needs_render(&self) -> bool {
        self.redraw != Redraw::Nothing || self.layers.borrow().revision() != self.layers_revision
    }

    /// Force a full redraw on the next pass
    pub fn invalidate(&mut self) {
        self.redraw = Redraw::Full;
    }

    /// Show `extent`, expanded to the viewport's aspect ratio, and record it in history
    pub fn set_view_extent(&mut self, extent: GeoExtent) {
        self.apply_extent(extent, true);
    }

    /// Show `extent` without recording it (used to keep linked frames in step)
    pub fn sync_extent(&mut self, extent: GeoExtent) {
        self.apply_extent(extent, false);
    }

    /// Move to `extent`, an equivalent of the current view such as the same
    /// area a full turn of longitude away. The current history entry is
    /// rewritten instead of a new one being recorded.
    pub fn rebase_extent(&mut self, extent: GeoExtent) {
        let before = self.view_extent;
        self.sync_extent(extent);
        self.history.replace_current(before, self.view_extent);
    }

    fn fitted(&self, extent: GeoExtent) -> GeoExtent {
        let e = extent.clamp_degenerate(self.config.extent_epsilon);
        if self.view.is_empty() {
            return e;
        }
        e.fit_aspect(self.view.width as f64, self.view.height as f64)
    }

    fn apply_extent(&mut self, extent: GeoExtent, record: bool) {
        if !extent.is_finite() {
            debug!("ignoring non-finite extent {extent}");
            return;
        }
        let fitted = self.fitted(extent);
        if record {
            self.history.push(fitted);
        }
        if fitted != self.view_extent {
            self.view_extent = fitted;
            self.redraw = Redraw::Full;
            self.events.push(MapEvent::ViewExtentsChanged(fitted));
        }
    }

    /// Move the map content by (`dx`, `dy`) pixels, keeping the scale
    pub fn pan_pixels(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let Ok(t) = self.transform() else {
            return;
        };
        let moved = self.view_extent.translate(-dx as f64 / t.dx, dy as f64 / t.dy);
        self.history.push(moved);
        self.view_extent = moved;
        self.redraw = match self.redraw {
            Redraw::Nothing => Redraw::Shift { dx, dy },
            Redraw::Shift { dx: ax, dy: ay } => Redraw::Shift { dx: ax + dx, dy: ay + dy },
            Redraw::Full => Redraw::Full,
        };
        if let Redraw::Shift { dx, dy } = self.redraw {
            if dx.abs() >= self.view.width || dy.abs() >= self.view.height || !self.config.extend_buffer {
                self.redraw = Redraw::Full;
            }
        }
        self.events.push(MapEvent::ViewExtentsChanged(moved));
    }

    pub fn zoom_in(&mut self) {
        let f = 1.0 / self.config.zoom_factor;
        self.set_view_extent(self.view_extent.scale(f));
    }

    pub fn zoom_out(&mut self) {
        let f = self.config.zoom_factor;
        self.set_view_extent(self.view_extent.scale(f));
    }

    /// Scale the view by `factor` (< 1 zooms in) keeping the geographic point
    /// under the pixel `anchor` fixed
    pub fn zoom_at(&mut self, anchor: DVec2, factor: f64) {
        let Ok(t) = self.transform() else {
            return;
        };
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let g = t.to_geo(anchor);
        let w = self.view_extent.width() * factor;
        let h = self.view_extent.height() * factor;
        let fx = (anchor.x - t.rect.x as f64) / t.rect.width as f64;
        let fy = (anchor.y - t.rect.y as f64) / t.rect.height as f64;
        let min_x = g.x - fx * w;
        let max_y = g.y + fy * h;
        self.set_view_extent(GeoExtent::new(min_x, max_y - h, min_x + w, max_y));
    }

    pub fn zoom_to_max_extent(&mut self) {
        let extent = self.layers.borrow().max_extent().unwrap_or_else(GeoExtent::world);
        self.set_view_extent(extent);
    }

    pub fn zoom_previous(&mut self) -> bool {
        match self.history.back() {
            Some(e) => {
                self.set_view_extent(e);
                true
            }
            None => {
                self.events.push(MapEvent::NavigationUnavailable);
                false
            }
        }
    }

    pub fn zoom_next(&mut self) -> bool {
        match self.history.forward() {
            Some(e) => {
                self.set_view_extent(e);
                true
            }
            None => {
                self.events.push(MapEvent::NavigationUnavailable);
                false
            }
        }
    }

    /// Change the viewport size, keeping the view centre and scale
    pub fn resize(&mut self, width: i32, height: i32) {
        let view = PixelRect::sized(width.max(0), height.max(0));
        if view == self.view {
            return;
        }
        let extent = match self.transform() {
            Ok(t) if !view.is_empty() => {
                GeoExtent::from_center(self.view_extent.center(), view.width as f64 / t.dx, view.height as f64 / t.dy)
            }
            _ => self.view_extent,
        };
        let full_clip = self.clip == self.view;
        self.view = view;
        self.clip = if full_clip { view } else { self.clip.intersection(&view).unwrap_or(view) };
        self.composite = Raster::filled(view.width, view.height, self.config.background);
        for buffer in self.buffers.values_mut() {
            buffer.invalidate();
        }
        self.label_buffer.invalidate();
        self.redraw = Redraw::Full;
        self.sync_extent(extent);
        if !self.is_usable() {
            debug!("viewport {}x{} below minimum, rendering suspended", view.width, view.height);
        }
    }

    /// Bring the buffers up to date and recomposite.
    ///
    /// The host is notified between chunks and may cancel there; a cancelled
    /// pass discards its back buffers and the next pass starts over.
    ///
    /// An empty clip completes with a blank composite; the frame is visible
    /// nowhere, so there is nothing to draw.
    pub fn render(&mut self, host: &mut dyn RenderHost) -> RenderOutcome {
        if self.suppressed || !self.is_usable() {
            return RenderOutcome::Suppressed;
        }
        let Ok(transform) = self.transform() else {
            return RenderOutcome::Suppressed;
        };
        if self.clip.is_empty() {
            if self.redraw == Redraw::Nothing {
                return RenderOutcome::Unchanged;
            }
            // Shifted content cannot be reused once the clip grows again
            for buffer in self.buffers.values_mut() {
                buffer.invalidate();
            }
            self.label_buffer.invalidate();
            self.composite.clear(self.config.background);
            self.redraw = Redraw::Nothing;
            return RenderOutcome::Completed;
        }

        let layers = Rc::clone(&self.layers);
        let stack = layers.borrow();
        if stack.revision() != self.layers_revision {
            self.layers_revision = stack.revision();
            let live: Vec<LayerId> = stack.ids();
            self.buffers.retain(|id, _| live.contains(id));
            for buffer in self.buffers.values_mut() {
                buffer.invalidate();
            }
            self.redraw = Redraw::Full;
        }
        let shift = match self.redraw {
            Redraw::Nothing => return RenderOutcome::Unchanged,
            Redraw::Full => None,
            Redraw::Shift { dx, dy } => Some((dx, dy)),
        };
        debug!("render pass: extent {} view {}x{} shift {:?}", self.view_extent, self.view.width, self.view.height, shift);

        for (id, layer) in stack.iter() {
            let buffer = self.buffers.entry(id).or_default();
            if !layer.visible() {
                buffer.invalidate();
                continue;
            }
            if draw_layer(layer, buffer, &transform, shift, self.clip, &self.config, host) == Flow::Cancel {
                self.cancel();
                return RenderOutcome::Cancelled;
            }
            buffer.finish_drawing();
        }

        // Labels are placed over the whole clip every pass
        let mut pass = RenderPass::new(transform);
        let label_target = self.label_buffer.begin_full(&transform);
        label_target.set_clip(Some(self.clip));
        let region = transform.rect_to_geo(&self.clip);
        for (_, layer) in stack.iter().filter(|(_, l)| l.visible() && l.has_labels()) {
            let Some(fl) = layer.as_feature() else {
                continue;
            };
            let flow = fl.draw_labels(label_target, &pass.transform, &region, &self.config, &mut pass.labels, host);
            if flow == Flow::Cancel {
                self.cancel();
                return RenderOutcome::Cancelled;
            }
        }
        label_target.set_clip(None);
        self.label_buffer.finish_drawing();
        debug!("placed {} labels", pass.labels.len());

        self.compose(&stack.ids());
        self.redraw = Redraw::Nothing;
        self.events.push(MapEvent::BufferChanged(vec![self.clip]));
        RenderOutcome::Completed
    }

    fn cancel(&mut self) {
        info!("render pass cancelled");
        for buffer in self.buffers.values_mut() {
            buffer.discard();
        }
        self.label_buffer.discard();
        // Some layers may already hold shifted content; only a full pass is safe now
        self.redraw = Redraw::Full;
    }

    /// Composite layer stencils bottom to top, then labels
    fn compose(&mut self, order: &[LayerId]) {
        self.composite.clear(self.config.background);
        for id in order {
            if let Some(stencil) = self.buffers.get(id).and_then(|b| b.stencil()) {
                self.composite.blit_clipped(&stencil.raster, 0, 0, self.clip);
            }
        }
        if let Some(stencil) = self.label_buffer.stencil() {
            self.composite.blit_clipped(&stencil.raster, 0, 0, self.clip);
        }
    }

    /// Render straight onto `canvas` inside `target`, bypassing the layer
    /// buffers. `extent` defaults to the current view and is fitted to the
    /// target's aspect ratio.
    pub fn draw_snapshot(&self, canvas: &mut dyn Canvas, target: PixelRect, extent: Option<GeoExtent>) -> Result<()> {
        let extent = extent
            .unwrap_or(self.view_extent)
            .clamp_degenerate(self.config.extent_epsilon)
            .fit_aspect(target.width as f64, target.height as f64);
        let transform = Transform::with_epsilon(extent, target, self.config.extent_epsilon)?;
        canvas.fill_rect(target.to_screen(), self.config.background);

        let stack = self.layers.borrow();
        let regions = [extent];
        let threshold = self.config.linear_scan_threshold;
        for (_, layer) in stack.iter().filter(|(_, l)| l.visible()) {
            match layer {
                Layer::Feature(fl) => {
                    let indices = fl.drawable_in(&regions, threshold);
                    fl.draw_features(canvas, &transform, &indices);
                }
                Layer::Image(il) => {
                    il.draw_regions(canvas, &transform, &regions);
                }
            }
        }

        let mut pass = RenderPass::new(transform);
        for (_, layer) in stack.iter().filter(|(_, l)| l.visible()) {
            let Some(fl) = layer.as_feature() else {
                continue;
            };
            let Some(labels) = fl.labels.as_ref().filter(|l| l.visible) else {
                continue;
            };
            let jobs = labels.jobs(fl.features(), &fl.label_candidates(&extent, threshold));
            labels.draw_jobs(canvas, &pass.transform, fl.features(), &jobs, &mut pass.labels);
        }
        Ok(())
    }
}

/// Redraw one layer into its back buffer. With a pan shift the stencil is
/// moved and only the exposed strips are drawn.
fn draw_layer(
    layer: &Layer,
    buffer: &mut LayerBuffer,
    transform: &Transform,
    shift: Option<(i32, i32)>,
    clip: PixelRect,
    config: &RenderConfig,
    host: &mut dyn RenderHost,
) -> Flow {
    let strips: Vec<PixelRect> = match shift {
        Some((dx, dy)) if buffer.begin_shifted(transform, dx, dy) => exposed_strips(transform.rect, dx, dy)
            .into_iter()
            .filter_map(|s| s.intersection(&clip))
            .collect(),
        Some(_) => vec![clip],
        None => {
            buffer.begin_full(transform);
            vec![clip]
        }
    };
    let Some(raster) = buffer.back_mut() else {
        return Flow::Continue;
    };
    for strip in strips {
        raster.set_clip(Some(strip));
        // Symbols centred just outside the strip can still reach into it
        let padded = PixelRect::new(
            strip.x - SYMBOL_MARGIN_PX,
            strip.y - SYMBOL_MARGIN_PX,
            strip.width + 2 * SYMBOL_MARGIN_PX,
            strip.height + 2 * SYMBOL_MARGIN_PX,
        );
        let region = transform.rect_to_geo(&padded);
        let flow = match layer {
            Layer::Feature(fl) => fl.draw_regions(raster, transform, &[region], config, host),
            Layer::Image(il) => {
                il.draw_regions(raster, transform, &[region]);
                Flow::Continue
            }
        };
        if flow == Flow::Cancel {
            raster.set_clip(None);
            return Flow::Cancel;
        }
    }
    raster.set_clip(None);
    Flow::Continue
}

/// Pixel regions of `view` left uncovered after moving its content by
/// (`dx`, `dy`). The strips do not overlap.
pub fn exposed_strips(view: PixelRect, dx: i32, dy: i32) -> Vec<PixelRect> {
    let mut strips = Vec::new();
    let (w, h) = (view.width, view.height);
    let (mut x0, mut x1) = (0, w);
    if dx > 0 {
        strips.push(PixelRect::new(view.x, view.y, dx.min(w), h));
        x0 = dx.min(w);
    } else if dx < 0 {
        let n = (-dx).min(w);
        strips.push(PixelRect::new(view.x + w - n, view.y, n, h));
        x1 = w - n;
    }
    if x1 > x0 {
        if dy > 0 {
            strips.push(PixelRect::new(view.x + x0, view.y, x1 - x0, dy.min(h)));
        } else if dy < 0 {
            let n = (-dy).min(h);
            strips.push(PixelRect::new(view.x + x0, view.y + h - n, x1 - x0, n));
        }
    }
    strips
}
