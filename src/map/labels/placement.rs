use glam::DVec2;

use crate::map::labels::anchor::{PartMethod, PlacementMethod};
use crate::map::labels::expression::LabelExpression;
use crate::map::spatial::SpatialGrid;
use crate::map::ScreenRect;
use crate::raster::{rotate_rect, Color};

/// Cell size of the collision grid, in pixels
const COLLISION_CELL_PX: f64 = 64.0;

/// Character width as a fraction of the font size, for text measurement
const CHAR_WIDTH_RATIO: f64 = 0.6;

/// Nine-way alignment of the label box relative to its anchor.
///
/// The horizontal part says which side of the anchor the box extends to
/// (`Left`: the box sits left of the anchor), the vertical part likewise
/// (`Top`: the box sits above it). `MiddleCenter` centers the box on the anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentAlignment {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    #[default]
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl ContentAlignment {
    /// Fraction of the box size to subtract from the anchor, per axis
    fn factors(self) -> DVec2 {
        use ContentAlignment::*;
        let fx = match self {
            TopLeft | MiddleLeft | BottomLeft => 1.0,
            TopCenter | MiddleCenter | BottomCenter => 0.5,
            TopRight | MiddleRight | BottomRight => 0.0,
        };
        let fy = match self {
            TopLeft | TopCenter | TopRight => 1.0,
            MiddleLeft | MiddleCenter | MiddleRight => 0.5,
            BottomLeft | BottomCenter | BottomRight => 0.0,
        };
        DVec2::new(fx, fy)
    }
}

/// Fixed or attribute-driven label rotation, in degrees counter-clockwise
#[derive(Clone, Debug, PartialEq)]
pub enum LabelRotation {
    Fixed(f64),
    /// Numeric attribute; non-numeric or missing values mean no rotation
    Field(String),
}

impl Default for LabelRotation {
    fn default() -> Self {
        LabelRotation::Fixed(0.0)
    }
}

/// How the labels of one category look and where they go
#[derive(Clone, Debug, PartialEq)]
pub struct LabelSymbolizer {
    pub expression: LabelExpression,
    pub alignment: ContentAlignment,
    /// Pixel offset; positive Y moves the label up
    pub offset: DVec2,
    pub font_size: f64,
    pub font_color: Color,
    pub placement: PlacementMethod,
    pub parts: PartMethod,
    pub priority_field: Option<String>,
    pub prevent_collision: bool,
    pub rotation: LabelRotation,

    pub use_background: bool,
    pub background_color: Color,
    pub use_border: bool,
    pub border_color: Color,
    pub border_width: f64,
    pub use_shadow: bool,
    pub shadow_color: Color,
    pub shadow_offset: DVec2,
    pub use_halo: bool,
    pub halo_color: Color,
    pub halo_width: f64,
}

impl LabelSymbolizer {
    pub fn new(expression: &str) -> Self {
        Self {
            expression: LabelExpression::parse(expression),
            ..Self::default()
        }
    }

    /// Measured size of `text` in pixels
    pub fn text_size(&self, text: &str) -> DVec2 {
        let chars = text.chars().count() as f64;
        DVec2::new(self.font_size * CHAR_WIDTH_RATIO * chars, self.font_size)
    }

    /// Label box for text of `size` anchored at pixel `anchor`, before rotation
    pub fn label_rect(&self, anchor: DVec2, size: DVec2) -> ScreenRect {
        let origin = anchor - size * self.alignment.factors() + DVec2::new(self.offset.x, -self.offset.y);
        ScreenRect::from_origin_size(origin, size)
    }

    /// Collision footprint: the label box, or the bounds of the rotated box
    pub fn footprint(&self, rect: &ScreenRect, anchor: DVec2, angle: f64) -> ScreenRect {
        if angle.abs() <= f64::EPSILON {
            return *rect;
        }
        let corners = rotate_rect(*rect, anchor, angle);
        ScreenRect::bounding(&corners).unwrap_or(*rect)
    }
}

impl Default for LabelSymbolizer {
    fn default() -> Self {
        Self {
            expression: LabelExpression::field("NAME"),
            alignment: ContentAlignment::MiddleCenter,
            offset: DVec2::ZERO,
            font_size: 10.0,
            font_color: Color::WHITE,
            placement: PlacementMethod::Centroid,
            parts: PartMethod::All,
            priority_field: None,
            prevent_collision: true,
            rotation: LabelRotation::default(),
            use_background: false,
            background_color: Color::TRANSPARENT,
            use_border: false,
            border_color: Color::TRANSPARENT,
            border_width: 1.0,
            use_shadow: false,
            shadow_color: Color::rgba(0, 0, 0, 160),
            shadow_offset: DVec2::new(1.0, 1.0),
            use_halo: false,
            halo_color: Color::BLACK,
            halo_width: 1.0,
        }
    }
}

/// Label rectangles accepted so far in one render pass.
///
/// Owned by the pass and handed to every label layer it draws, so labels of
/// different layers avoid each other. Cleared when a full redraw starts.
pub struct ExistingLabels {
    grid: SpatialGrid<()>,
}

impl ExistingLabels {
    pub fn new() -> Self {
        Self {
            grid: SpatialGrid::new(COLLISION_CELL_PX),
        }
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    /// True if `rect` overlaps no accepted label
    pub fn is_free(&self, rect: &ScreenRect) -> bool {
        !self.grid.any_intersecting(rect)
    }

    pub fn insert(&mut self, rect: ScreenRect) {
        self.grid.insert(rect, ());
    }

    /// Accept `rect` if it is free
    pub fn try_insert(&mut self, rect: ScreenRect) -> bool {
        if !self.is_free(&rect) {
            return false;
        }
        self.insert(rect);
        true
    }

    pub fn rects(&self) -> impl Iterator<Item = &ScreenRect> {
        self.grid.items().map(|(r, _)| r)
    }

    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }
}

impl Default for ExistingLabels {
    fn default() -> Self {
        Self::new()
    }
}
