use std::collections::{HashMap, HashSet};

use glam::DVec2;

use crate::map::feature::{Feature, FeatureId};
use crate::map::geometry::{Geometry, GeometryFault};
use crate::map::{ScreenRect, Transform};
use crate::raster::{clip_segment, Canvas, Color};

/// Colour used for selected features when a category has no selection symbolizer
pub const SELECTION_COLOR: Color = Color::rgb(0, 255, 255);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointShape {
    Circle,
    Square,
    Cross,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointSymbolizer {
    pub color: Color,
    /// Radius in pixels
    pub size: f64,
    pub shape: PointShape,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineSymbolizer {
    pub color: Color,
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolygonSymbolizer {
    pub fill: Color,
    pub outline: Color,
    pub outline_width: f64,
}

/// How one category of features is drawn
#[derive(Clone, Debug, PartialEq)]
pub enum Symbolizer {
    Point(PointSymbolizer),
    Line(LineSymbolizer),
    Polygon(PolygonSymbolizer),
}

impl Symbolizer {
    pub fn point(color: Color, size: f64) -> Self {
        Symbolizer::Point(PointSymbolizer { color, size, shape: PointShape::Circle })
    }

    pub fn line(color: Color, width: f64) -> Self {
        Symbolizer::Line(LineSymbolizer { color, width })
    }

    pub fn polygon(fill: Color, outline: Color) -> Self {
        Symbolizer::Polygon(PolygonSymbolizer { fill, outline, outline_width: 1.0 })
    }

    /// Same symbol painted in the selection colour
    pub fn highlighted(&self, color: Color) -> Symbolizer {
        match self {
            Symbolizer::Point(p) => Symbolizer::Point(PointSymbolizer { color, ..p.clone() }),
            Symbolizer::Line(l) => Symbolizer::Line(LineSymbolizer { color, ..l.clone() }),
            Symbolizer::Polygon(p) => Symbolizer::Polygon(PolygonSymbolizer {
                fill: p.fill,
                outline: color,
                outline_width: p.outline_width.max(2.0),
            }),
        }
    }

    /// Draw `geometry` with this symbol. Returns the pixel bounds touched, or
    /// `None` when nothing fell on the canvas.
    pub fn draw(
        &self,
        canvas: &mut dyn Canvas,
        transform: &Transform,
        geometry: &Geometry,
    ) -> Result<Option<ScreenRect>, GeometryFault> {
        geometry.validate()?;
        let bounds = match geometry {
            Geometry::Point(points) => draw_points(canvas, transform, points, self),
            Geometry::Line(parts) => draw_lines(canvas, transform, parts, self),
            Geometry::Polygon(polys) => draw_polygons(canvas, transform, polys, self),
        };
        let view = canvas.bounds().to_screen();
        Ok(bounds.filter(|b| b.intersects(&view) || view_contains(&view, b)))
    }
}

fn view_contains(view: &ScreenRect, b: &ScreenRect) -> bool {
    b.min.x >= view.min.x && b.max.x <= view.max.x && b.min.y >= view.min.y && b.max.y <= view.max.y
}

fn grow(acc: Option<ScreenRect>, r: ScreenRect) -> Option<ScreenRect> {
    Some(match acc {
        Some(a) => ScreenRect::new(a.min.min(r.min), a.max.max(r.max)),
        None => r,
    })
}

fn draw_points(canvas: &mut dyn Canvas, t: &Transform, points: &[DVec2], sym: &Symbolizer) -> Option<ScreenRect> {
    let (color, size, shape) = match sym {
        Symbolizer::Point(p) => (p.color, p.size, p.shape),
        Symbolizer::Line(l) => (l.color, l.width, PointShape::Circle),
        Symbolizer::Polygon(p) => (p.fill, 2.0, PointShape::Square),
    };
    let mut bounds = None;
    for g in points {
        let p = t.to_pixel(*g);
        let half = DVec2::splat(size.max(0.5));
        let r = ScreenRect::new(p - half, p + half);
        match shape {
            PointShape::Circle => canvas.dot(p, size, color),
            PointShape::Square => canvas.fill_rect(r, color),
            PointShape::Cross => {
                canvas.line(DVec2::new(r.min.x, p.y), DVec2::new(r.max.x, p.y), color, 1.0);
                canvas.line(DVec2::new(p.x, r.min.y), DVec2::new(p.x, r.max.y), color, 1.0);
            }
        }
        bounds = grow(bounds, r);
    }
    bounds
}

fn draw_lines(canvas: &mut dyn Canvas, t: &Transform, parts: &[Vec<DVec2>], sym: &Symbolizer) -> Option<ScreenRect> {
    let (color, width) = match sym {
        Symbolizer::Line(l) => (l.color, l.width),
        Symbolizer::Polygon(p) => (p.outline, p.outline_width),
        Symbolizer::Point(p) => (p.color, 1.0),
    };
    let view = canvas.bounds().to_screen();
    let mut bounds = None;
    for part in parts {
        let pixels: Vec<DVec2> = part.iter().map(|g| t.to_pixel(*g)).collect();
        for w in pixels.windows(2) {
            stroke(canvas, view, w[0], w[1], color, width);
        }
        if let Some(b) = ScreenRect::bounding(&pixels) {
            bounds = grow(bounds, b);
        }
    }
    bounds
}

/// Draw the part of segment `a`-`b` that can reach `view`
fn stroke(canvas: &mut dyn Canvas, view: ScreenRect, a: DVec2, b: DVec2, color: Color, width: f64) {
    if let Some((a, b)) = clip_segment(a, b, view.inflate(width.max(1.0) + 1.0)) {
        canvas.line(a, b, color, width);
    }
}

fn draw_polygons(
    canvas: &mut dyn Canvas,
    t: &Transform,
    polys: &[Vec<Vec<DVec2>>],
    sym: &Symbolizer,
) -> Option<ScreenRect> {
    let (fill, outline, width) = match sym {
        Symbolizer::Polygon(p) => (p.fill, p.outline, p.outline_width),
        Symbolizer::Line(l) => (Color::TRANSPARENT, l.color, l.width),
        Symbolizer::Point(p) => (p.color, Color::TRANSPARENT, 1.0),
    };
    let mut bounds = None;
    for rings in polys {
        let pixel_rings: Vec<Vec<DVec2>> = rings
            .iter()
            .map(|ring| ring.iter().map(|g| t.to_pixel(*g)).collect())
            .collect();
        if !fill.is_transparent() {
            canvas.fill_polygon(&pixel_rings, fill);
        }
        if !outline.is_transparent() {
            let view = canvas.bounds().to_screen();
            for ring in &pixel_rings {
                for i in 0..ring.len() {
                    stroke(canvas, view, ring[i], ring[(i + 1) % ring.len()], outline, width);
                }
            }
        }
        if let Some(b) = pixel_rings.first().and_then(|r| ScreenRect::bounding(r)) {
            bounds = grow(bounds, b);
        }
    }
    bounds
}

/// Which features a category applies to
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureFilter {
    All,
    /// Attribute rendered as text equals the value
    FieldEquals { field: String, value: String },
    /// Numeric attribute within `[min, max)`
    FieldRange { field: String, min: f64, max: f64 },
}

impl FeatureFilter {
    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            FeatureFilter::All => true,
            FeatureFilter::FieldEquals { field, value } => feature
                .attribute(field)
                .is_some_and(|v| v.to_string() == *value),
            FeatureFilter::FieldRange { field, min, max } => feature
                .attribute(field)
                .and_then(|v| v.as_f64())
                .is_some_and(|n| n >= *min && n < *max),
        }
    }
}

/// A symbol category: filter plus the symbol drawn for matching features.
/// A category without a symbolizer is skipped when drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolCategory {
    pub name: String,
    pub filter: FeatureFilter,
    pub symbolizer: Option<Symbolizer>,
    pub selection_symbolizer: Option<Symbolizer>,
    pub visible: bool,
}

impl SymbolCategory {
    pub fn new(name: &str, filter: FeatureFilter, symbolizer: Symbolizer) -> Self {
        Self {
            name: name.to_string(),
            filter,
            symbolizer: Some(symbolizer),
            selection_symbolizer: None,
            visible: true,
        }
    }

    /// Symbol to draw for a feature in this category
    pub fn symbol_for(&self, selected: bool) -> Option<Symbolizer> {
        let base = self.symbolizer.as_ref()?;
        if !selected {
            return Some(base.clone());
        }
        Some(
            self.selection_symbolizer
                .clone()
                .unwrap_or_else(|| base.highlighted(SELECTION_COLOR)),
        )
    }
}

/// Per-feature drawing state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawnState {
    /// Index of the matching symbol category, if any
    pub category: Option<usize>,
    pub selected: bool,
    pub visible: bool,
}

/// Maps a feature to its drawing state
pub trait CategoryResolver {
    fn resolve(&self, feature: &Feature, selected: bool) -> DrawnState;
}

/// Ordered categories; the first matching category wins
#[derive(Clone, Debug, PartialEq)]
pub struct Symbology {
    pub categories: Vec<SymbolCategory>,
}

impl Symbology {
    /// One category drawing every feature with `symbolizer`
    pub fn single(symbolizer: Symbolizer) -> Self {
        Self {
            categories: vec![SymbolCategory::new("default", FeatureFilter::All, symbolizer)],
        }
    }

    pub fn category(&self, idx: usize) -> Option<&SymbolCategory> {
        self.categories.get(idx)
    }
}

impl CategoryResolver for Symbology {
    fn resolve(&self, feature: &Feature, selected: bool) -> DrawnState {
        let category = self.categories.iter().position(|c| c.filter.matches(feature));
        let visible = category
            .and_then(|i| self.categories.get(i))
            .is_some_and(|c| c.visible);
        DrawnState { category, selected, visible }
    }
}

/// Drawing states of every feature in a layer, keyed by feature id.
/// Rebuilt whenever symbology or selection changes.
#[derive(Debug, Default)]
pub struct DrawnStates {
    states: HashMap<FeatureId, DrawnState>,
}

impl DrawnStates {
    pub fn build(features: &[Feature], resolver: &dyn CategoryResolver, selection: &HashSet<FeatureId>) -> Self {
        let states = features
            .iter()
            .map(|f| (f.id, resolver.resolve(f, selection.contains(&f.id))))
            .collect();
        Self { states }
    }

    #[inline(always)]
    pub fn get(&self, id: FeatureId) -> Option<&DrawnState> {
        self.states.get(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
