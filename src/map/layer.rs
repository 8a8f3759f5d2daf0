use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, warn};

use crate::config::RenderConfig;
use crate::error::{MapError, Result};
use crate::geo::GeoExtent;
use crate::map::chunked::{ChunkedRenderer, Flow, RenderHost};
use crate::map::feature::{Feature, FeatureId};
use crate::map::labels::{ExistingLabels, LabelLayer};
use crate::map::spatial::FeatureGrid;
use crate::map::symbology::{DrawnStates, Symbology};
use crate::map::{PixelRect, Transform};
use crate::raster::{Canvas, Raster};

/// Stable handle of a layer within a [`LayerStack`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

/// Vector features with their symbology, selection and labels
pub struct FeatureLayer {
    pub name: String,
    pub visible: bool,
    /// Edit mode bypasses the spatial index, which may be stale while editing
    pub edit_mode: bool,
    pub labels: Option<LabelLayer>,
    features: Vec<Feature>,
    grid: FeatureGrid,
    extent: Option<GeoExtent>,
    symbology: Symbology,
    selection: HashSet<FeatureId>,
    states: DrawnStates,
}

impl FeatureLayer {
    pub fn new(name: &str, features: Vec<Feature>, symbology: Symbology) -> Self {
        let envelopes: Vec<Option<GeoExtent>> = features
            .iter()
            .map(|f| match f.geometry.envelope() {
                Ok(e) => Some(e),
                Err(fault) => {
                    warn!("layer '{}': feature {} not indexed: {}", name, f.id, fault.reason());
                    None
                }
            })
            .collect();
        let extent = envelopes.iter().flatten().copied().reduce(|a, b| a.union(&b));
        let grid = FeatureGrid::build(envelopes);
        let selection = HashSet::new();
        let states = DrawnStates::build(&features, &symbology, &selection);
        debug!("layer '{}': {} features, extent {:?}", name, features.len(), extent);
        Self {
            name: name.to_string(),
            visible: true,
            edit_mode: false,
            labels: None,
            features,
            grid,
            extent,
            symbology,
            selection,
            states,
        }
    }

    pub fn with_labels(mut self, labels: LabelLayer) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn extent(&self) -> Option<GeoExtent> {
        self.extent
    }

    pub fn symbology(&self) -> &Symbology {
        &self.symbology
    }

    pub fn set_symbology(&mut self, symbology: Symbology) {
        self.symbology = symbology;
        self.rebuild_states();
    }

    pub fn selection(&self) -> &HashSet<FeatureId> {
        &self.selection
    }

    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = FeatureId>) {
        self.selection = ids.into_iter().collect();
        self.rebuild_states();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.rebuild_states();
    }

    pub fn states(&self) -> &DrawnStates {
        &self.states
    }

    fn rebuild_states(&mut self) {
        self.states = DrawnStates::build(&self.features, &self.symbology, &self.selection);
    }

    /// Indices of features whose envelopes intersect any of `regions`, sorted.
    /// Small layers and edit mode scan linearly instead of using the index.
    pub fn query(&self, regions: &[GeoExtent], linear_scan_threshold: usize) -> Vec<usize> {
        if self.edit_mode || self.features.len() < linear_scan_threshold {
            return self
                .features
                .iter()
                .enumerate()
                .filter(|(_, f)| {
                    f.geometry
                        .envelope()
                        .is_ok_and(|e| regions.iter().any(|r| r.intersects(&e)))
                })
                .map(|(i, _)| i)
                .collect();
        }
        self.grid.query(regions)
    }

    /// Visible features intersecting `regions`, in paint order
    pub fn drawable_in(&self, regions: &[GeoExtent], linear_scan_threshold: usize) -> Vec<usize> {
        self.paint_order(self.query(regions, linear_scan_threshold))
    }

    /// Visible feature indices in paint order: unselected first, so selected
    /// features end up on top
    fn paint_order(&self, indices: Vec<usize>) -> Vec<usize> {
        let (mut selected, mut rest): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .filter(|&i| {
                self.features
                    .get(i)
                    .and_then(|f| self.states.get(f.id))
                    .is_some_and(|s| s.visible)
            })
            .partition(|&i| self.selection.contains(&self.features[i].id));
        rest.append(&mut selected);
        rest
    }

    /// Draw the features at `indices`. Returns the pixel rectangles touched.
    /// Features with malformed geometry are logged and skipped.
    pub fn draw_features(&self, canvas: &mut dyn Canvas, transform: &Transform, indices: &[usize]) -> Vec<PixelRect> {
        let mut touched = Vec::new();
        for &idx in indices {
            let Some(feature) = self.features.get(idx) else {
                continue;
            };
            let Some(state) = self.states.get(feature.id) else {
                continue;
            };
            let Some(symbol) = state
                .category
                .and_then(|c| self.symbology.category(c))
                .and_then(|c| c.symbol_for(state.selected))
            else {
                continue;
            };
            match symbol.draw(canvas, transform, &feature.geometry) {
                Ok(Some(bounds)) => touched.push(bounds.to_pixel_rect()),
                Ok(None) => {}
                Err(fault) => {
                    let err = MapError::MalformedGeometry {
                        feature: feature.id,
                        reason: fault.reason(),
                    };
                    warn!("layer '{}': {}", self.name, err);
                }
            }
        }
        touched
    }

    /// Draw every visible feature intersecting `regions` into `target`,
    /// chunked per `config`
    pub fn draw_regions(
        &self,
        target: &mut Raster,
        transform: &Transform,
        regions: &[GeoExtent],
        config: &RenderConfig,
        host: &mut dyn RenderHost,
    ) -> Flow {
        let indices = self.drawable_in(regions, config.linear_scan_threshold);
        let chunker = ChunkedRenderer::new(config.feature_chunk_size, config.use_chunking);
        chunker.draw(&indices, target, host, |raster, chunk| self.draw_features(raster, transform, chunk))
    }

    /// Label candidates around `region`. The query is grown by the region's
    /// own size so labels of features just outside can overflow into view.
    pub fn label_candidates(&self, region: &GeoExtent, linear_scan_threshold: usize) -> Vec<usize> {
        let grown = region.expand_by(region.width(), region.height());
        self.drawable_in(&[grown], linear_scan_threshold)
    }

    /// Place and paint this layer's labels over `region`
    pub fn draw_labels(
        &self,
        target: &mut Raster,
        transform: &Transform,
        region: &GeoExtent,
        config: &RenderConfig,
        existing: &mut ExistingLabels,
        host: &mut dyn RenderHost,
    ) -> Flow {
        let Some(labels) = self.labels.as_ref().filter(|l| l.visible) else {
            return Flow::Continue;
        };
        let candidates = self.label_candidates(region, config.linear_scan_threshold);
        let jobs = labels.jobs(&self.features, &candidates);
        let chunker = ChunkedRenderer::new(config.label_chunk_size, config.use_chunking);
        chunker.draw(&jobs, target, host, |raster, chunk| {
            labels.draw_jobs(raster, transform, &self.features, chunk, existing)
        })
    }
}

/// A georeferenced image. `None` means the tile's data is unavailable.
#[derive(Clone, Debug)]
pub struct ImageTile {
    pub extent: GeoExtent,
    pub image: Option<Raster>,
}

/// Raster layer made of georeferenced tiles
pub struct ImageLayer {
    pub name: String,
    pub visible: bool,
    pub tiles: Vec<ImageTile>,
}

impl ImageLayer {
    pub fn new(name: &str, tiles: Vec<ImageTile>) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            tiles,
        }
    }

    pub fn extent(&self) -> Option<GeoExtent> {
        self.tiles.iter().map(|t| t.extent).reduce(|a, b| a.union(&b))
    }

    /// Draw tiles intersecting `regions`; tiles without data are left as background
    pub fn draw_regions(&self, canvas: &mut dyn Canvas, transform: &Transform, regions: &[GeoExtent]) -> Vec<PixelRect> {
        let mut touched = Vec::new();
        for (i, tile) in self.tiles.iter().enumerate() {
            if !regions.iter().any(|r| r.intersects(&tile.extent)) {
                continue;
            }
            let Some(image) = &tile.image else {
                debug!("layer '{}': tile {} has no data, skipped", self.name, i);
                continue;
            };
            let dest = transform.extent_to_screen(&tile.extent);
            canvas.draw_image(image, dest);
            touched.push(dest.to_pixel_rect());
        }
        touched
    }
}

pub enum Layer {
    Feature(FeatureLayer),
    Image(ImageLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Feature(l) => &l.name,
            Layer::Image(l) => &l.name,
        }
    }

    pub fn visible(&self) -> bool {
        match self {
            Layer::Feature(l) => l.visible,
            Layer::Image(l) => l.visible,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        match self {
            Layer::Feature(l) => l.visible = visible,
            Layer::Image(l) => l.visible = visible,
        }
    }

    pub fn extent(&self) -> Option<GeoExtent> {
        match self {
            Layer::Feature(l) => l.extent(),
            Layer::Image(l) => l.extent(),
        }
    }

    pub fn as_feature(&self) -> Option<&FeatureLayer> {
        match self {
            Layer::Feature(l) => Some(l),
            Layer::Image(_) => None,
        }
    }

    pub fn has_labels(&self) -> bool {
        self.as_feature()
            .and_then(|l| l.labels.as_ref())
            .is_some_and(|l| l.visible)
    }
}

impl From<FeatureLayer> for Layer {
    fn from(l: FeatureLayer) -> Self {
        Layer::Feature(l)
    }
}

impl From<ImageLayer> for Layer {
    fn from(l: ImageLayer) -> Self {
        Layer::Image(l)
    }
}

/// Ordered layers, bottom first. The revision increases on every change so
/// frames sharing the stack can tell when their buffers are stale.
#[derive(Default)]
pub struct LayerStack {
    layers: Vec<(LayerId, Layer)>,
    next_id: u32,
    revision: u64,
}

/// Layer list shared by the frames drawing it
pub type SharedLayers = Rc<RefCell<LayerStack>>;

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLayers {
        Rc::new(RefCell::new(self))
    }

    /// Add on top of the stack
    pub fn push(&mut self, layer: impl Into<Layer>) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.push((id, layer.into()));
        self.revision += 1;
        id
    }

    pub fn remove(&mut self, id: LayerId) -> Result<Layer> {
        let pos = self.position(id)?;
        self.revision += 1;
        Ok(self.layers.remove(pos).1)
    }

    /// Move a layer to `index` in the z-order (0 = bottom)
    pub fn reorder(&mut self, id: LayerId, index: usize) -> Result<()> {
        let pos = self.position(id)?;
        let entry = self.layers.remove(pos);
        let index = index.min(self.layers.len());
        self.layers.insert(index, entry);
        self.revision += 1;
        Ok(())
    }

    fn position(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|(i, _)| *i == id)
            .ok_or(MapError::UnknownLayer(id.0))
    }

    pub fn get(&self, id: LayerId) -> Result<&Layer> {
        self.position(id).map(|p| &self.layers[p].1)
    }

    /// Mutable access; counts as a change
    pub fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        let pos = self.position(id)?;
        self.revision += 1;
        Ok(&mut self.layers[pos].1)
    }

    /// Layers bottom to top
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().map(|(id, l)| (*id, l))
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|(id, _)| *id).collect()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Union of the extents of all layers
    pub fn max_extent(&self) -> Option<GeoExtent> {
        self.layers
            .iter()
            .filter_map(|(_, l)| l.extent())
            .reduce(|a, b| a.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::chunked::NullHost;
    use crate::map::geometry::Geometry;
    use crate::map::symbology::Symbolizer;
    use crate::raster::Color;
    use glam::DVec2;

    fn points(n: usize) -> Vec<Feature> {
        (0..n)
            .map(|i| Feature::new(i as u64, Geometry::point(i as f64 + 0.25, 0.5)))
            .collect()
    }

    fn transform() -> Transform {
        Transform::new(GeoExtent::new(0.0, 0.0, 100.0, 1.0), PixelRect::sized(100, 10)).unwrap()
    }

    #[test]
    fn test_index_and_linear_scan_agree() {
        let mut layer = FeatureLayer::new("pts", points(100), Symbology::single(Symbolizer::point(Color::WHITE, 0.0)));
        let region = [GeoExtent::new(10.0, 0.0, 20.0, 1.0)];
        let indexed = layer.query(&region, 0);
        let linear = layer.query(&region, usize::MAX);
        assert_eq!(indexed, linear);
        assert_eq!(indexed, (10..20).collect::<Vec<_>>());
        layer.edit_mode = true;
        assert_eq!(layer.query(&region, 0), linear);
    }

    #[test]
    fn test_malformed_feature_skipped_not_fatal() {
        let mut features = points(3);
        features.push(Feature::new(99, Geometry::Line(vec![vec![DVec2::new(f64::NAN, 0.0), DVec2::ZERO]])));
        let layer = FeatureLayer::new("mixed", features, Symbology::single(Symbolizer::point(Color::WHITE, 0.0)));
        let mut raster = Raster::new(100, 10);
        let touched = layer.draw_features(&mut raster, &transform(), &[0, 1, 2, 3]);
        assert_eq!(touched.len(), 3);
        assert_eq!(layer.extent(), Some(GeoExtent::new(0.25, 0.5, 2.25, 0.5)));
    }

    #[test]
    fn test_selected_features_paint_last() {
        let mut layer = FeatureLayer::new("pts", points(4), Symbology::single(Symbolizer::point(Color::WHITE, 0.0)));
        layer.set_selection([1]);
        assert_eq!(layer.paint_order(vec![0, 1, 2, 3]), vec![0, 2, 3, 1]);
        assert!(layer.states().get(1).unwrap().selected);
    }

    #[test]
    fn test_draw_regions_chunks() {
        struct Count(usize);
        impl RenderHost for Count {
            fn buffer_changed(&mut self, _: &Raster, _: &[PixelRect]) {
                self.0 += 1;
            }
        }
        let layer = FeatureLayer::new("pts", points(100), Symbology::single(Symbolizer::point(Color::WHITE, 0.0)));
        let config = RenderConfig {
            feature_chunk_size: 30,
            ..RenderConfig::default()
        };
        let mut raster = Raster::new(100, 10);
        let mut host = Count(0);
        let flow = layer.draw_regions(&mut raster, &transform(), &[GeoExtent::new(0.0, 0.0, 100.0, 1.0)], &config, &mut host);
        assert_eq!(flow, Flow::Continue);
        assert_eq!(host.0, 3);
        assert_eq!(raster.coverage(), 100);
    }

    #[test]
    fn test_missing_tile_is_skipped() {
        let layer = ImageLayer::new(
            "img",
            vec![
                ImageTile { extent: GeoExtent::new(0.0, 0.0, 50.0, 1.0), image: None },
                ImageTile { extent: GeoExtent::new(50.0, 0.0, 100.0, 1.0), image: Some(Raster::filled(2, 2, Color::WHITE)) },
            ],
        );
        let mut raster = Raster::new(100, 10);
        let touched = layer.draw_regions(&mut raster, &transform(), &[GeoExtent::new(0.0, 0.0, 100.0, 1.0)]);
        assert_eq!(touched.len(), 1);
        assert_eq!(raster.coverage(), 500);
        assert_eq!(raster.get(10, 5), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_stack_ids_order_and_revision() {
        let mut stack = LayerStack::new();
        let a = stack.push(FeatureLayer::new("a", points(1), Symbology::single(Symbolizer::point(Color::WHITE, 1.0))));
        let b = stack.push(ImageLayer::new("b", Vec::new()));
        let rev = stack.revision();
        stack.reorder(b, 0).unwrap();
        assert_eq!(stack.ids(), vec![b, a]);
        assert!(stack.revision() > rev);
        assert!(matches!(stack.get(LayerId(42)), Err(MapError::UnknownLayer(42))));
        assert_eq!(stack.max_extent(), Some(GeoExtent::new(0.25, 0.5, 0.25, 0.5)));
        stack.remove(a).unwrap();
        assert_eq!(stack.len(), 1);
    }
}
