//! Label placement: text from attribute templates, anchors per geometry
//! kind, nine-way alignment and collision avoidance shared across layers.

mod anchor;
mod expression;
mod paint;
mod placement;

pub use anchor::{anchors, PartMethod, PlacementMethod};
pub use expression::LabelExpression;
pub use paint::{paint_label, PlacedLabel};
pub use placement::{ContentAlignment, ExistingLabels, LabelRotation, LabelSymbolizer};

use log::{debug, warn};

use crate::map::feature::Feature;
use crate::map::symbology::FeatureFilter;
use crate::map::{PixelRect, Transform};
use crate::raster::Canvas;

/// A group of features labelled the same way.
/// A category without a symbolizer labels nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelCategory {
    pub name: String,
    pub filter: FeatureFilter,
    pub symbolizer: Option<LabelSymbolizer>,
}

impl LabelCategory {
    pub fn new(name: &str, filter: FeatureFilter, symbolizer: LabelSymbolizer) -> Self {
        Self {
            name: name.to_string(),
            filter,
            symbolizer: Some(symbolizer),
        }
    }
}

/// One feature queued for labelling with the category it falls in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelJob {
    /// Index into the layer's feature list
    pub feature: usize,
    pub category: usize,
}

/// Labels attached to a feature layer
#[derive(Clone, Debug, PartialEq)]
pub struct LabelLayer {
    pub categories: Vec<LabelCategory>,
    pub visible: bool,
}

impl LabelLayer {
    pub fn new(categories: Vec<LabelCategory>) -> Self {
        Self {
            categories,
            visible: true,
        }
    }

    /// Label every feature with one symbolizer
    pub fn single(symbolizer: LabelSymbolizer) -> Self {
        Self::new(vec![LabelCategory::new("default", FeatureFilter::All, symbolizer)])
    }

    /// Group `candidates` (indices into `features`) by category, in category
    /// order, each group sorted by its priority field.
    ///
    /// Collision-preventing categories put high priority first so it claims
    /// contested space. Other categories put it last so it paints over the
    /// lower-priority labels drawn before it.
    pub fn jobs(&self, features: &[Feature], candidates: &[usize]) -> Vec<LabelJob> {
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.categories.len()];
        for &idx in candidates {
            let Some(feature) = features.get(idx) else {
                continue;
            };
            if let Some(cat) = self.categories.iter().position(|c| c.filter.matches(feature)) {
                groups[cat].push(idx);
            }
        }

        let mut jobs = Vec::with_capacity(candidates.len());
        for (cat, mut members) in groups.into_iter().enumerate() {
            let Some(sym) = self.categories[cat].symbolizer.as_ref() else {
                if !members.is_empty() {
                    debug!("label category '{}' has no symbolizer, skipped", self.categories[cat].name);
                }
                continue;
            };
            if let Some(field) = &sym.priority_field {
                let prevent = sym.prevent_collision;
                members.sort_by(|&a, &b| {
                    let va = features[a].attribute(field).cloned().unwrap_or_default();
                    let vb = features[b].attribute(field).cloned().unwrap_or_default();
                    let ord = va.priority_cmp(&vb);
                    if prevent {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            jobs.extend(members.into_iter().map(|feature| LabelJob { feature, category: cat }));
        }
        jobs
    }

    /// Place and paint labels for `jobs`, returning the pixel rectangles painted.
    ///
    /// Candidates entirely outside the canvas are dropped. For categories that
    /// prevent collisions a candidate is accepted only when its footprint is
    /// free in `existing`, and is then recorded there.
    pub fn draw_jobs(
        &self,
        canvas: &mut dyn Canvas,
        transform: &Transform,
        features: &[Feature],
        jobs: &[LabelJob],
        existing: &mut ExistingLabels,
    ) -> Vec<PixelRect> {
        let image = canvas.bounds().to_screen();
        let mut painted = Vec::new();
        for job in jobs {
            let (Some(feature), Some(category)) = (features.get(job.feature), self.categories.get(job.category)) else {
                continue;
            };
            let Some(sym) = &category.symbolizer else {
                continue;
            };
            let text = sym.expression.evaluate(feature);
            if text.trim().is_empty() {
                continue;
            }
            let points = match anchors(&feature.geometry, sym.placement, sym.parts) {
                Ok(points) => points,
                Err(fault) => {
                    warn!("label skipped for feature {}: {}", feature.id, fault.reason());
                    continue;
                }
            };
            let angle = rotation(sym, feature);
            let size = sym.text_size(&text);
            for geo in points {
                let anchor = transform.to_pixel(geo);
                let rect = sym.label_rect(anchor, size);
                let footprint = sym.footprint(&rect, anchor, angle);
                if !footprint.intersects(&image) {
                    continue;
                }
                if sym.prevent_collision && !existing.try_insert(footprint) {
                    continue;
                }
                let label = PlacedLabel {
                    text: text.clone(),
                    rect,
                    anchor,
                    angle,
                };
                paint_label(canvas, &label, sym);
                painted.push(footprint.to_pixel_rect());
            }
        }
        painted
    }
}

fn rotation(sym: &LabelSymbolizer, feature: &Feature) -> f64 {
    match &sym.rotation {
        LabelRotation::Fixed(a) => *a,
        LabelRotation::Field(f) => feature
            .attribute(f)
            .and_then(|v| v.as_f64())
            .filter(|a| a.is_finite())
            .unwrap_or(0.0),
    }
}
