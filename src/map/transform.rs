use glam::DVec2;

use crate::error::{MapError, Result};
use crate::geo::{GeoExtent, EXTENT_EPSILON};

/// Integer pixel rectangle (viewport, buffer or dirty region)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin with the given size
    pub const fn sized(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline(always)]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline(always)]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        PixelRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> PixelRect {
        PixelRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn to_screen(&self) -> ScreenRect {
        ScreenRect::new(
            DVec2::new(self.x as f64, self.y as f64),
            DVec2::new(self.right() as f64, self.bottom() as f64),
        )
    }
}

/// Largest pixel coordinate magnitude an integer rectangle is built from
const PIXEL_LIMIT: f64 = 1.0e9;

/// Floating point pixel rectangle, used for label candidates and symbol bounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub min: DVec2,
    pub max: DVec2,
}

impl ScreenRect {
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn from_origin_size(origin: DVec2, size: DVec2) -> Self {
        Self::new(origin, origin + size)
    }

    /// Axis-aligned bounds of a set of points
    pub fn bounding(points: &[DVec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Strict overlap: rectangles that only share an edge do not intersect
    pub fn intersects(&self, other: &ScreenRect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn translate(&self, d: DVec2) -> ScreenRect {
        ScreenRect { min: self.min + d, max: self.max + d }
    }

    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }

    /// Grown by `by` pixels on every side
    pub fn inflate(&self, by: f64) -> ScreenRect {
        ScreenRect {
            min: self.min - DVec2::splat(by),
            max: self.max + DVec2::splat(by),
        }
    }

    /// Smallest integer rectangle covering this one. Coordinates are clamped
    /// to +-PIXEL_LIMIT so width and height cannot overflow.
    pub fn to_pixel_rect(&self) -> PixelRect {
        let clamp = |v: f64| v.clamp(-PIXEL_LIMIT, PIXEL_LIMIT) as i32;
        let x0 = clamp(self.min.x.floor());
        let y0 = clamp(self.min.y.floor());
        let x1 = clamp(self.max.x.ceil());
        let y1 = clamp(self.max.y.ceil());
        PixelRect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Geographic to pixel affine mapping for one draw call.
///
/// `px = (gx - min_x) * dx`, `py = (max_y - gy) * dy`. Pixel rows grow
/// downward, hence the inverted Y axis. Pixel coordinates are relative to the
/// rectangle origin plus `rect.x`/`rect.y`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub extent: GeoExtent,
    pub rect: PixelRect,
    /// Pixels per geographic unit along X
    pub dx: f64,
    /// Pixels per geographic unit along Y
    pub dy: f64,
}

impl Transform {
    /// Build a transform, rejecting degenerate extents and empty rectangles.
    pub fn new(extent: GeoExtent, rect: PixelRect) -> Result<Self> {
        Self::with_epsilon(extent, rect, EXTENT_EPSILON)
    }

    /// As [`Transform::new`], with extents no wider or taller than `epsilon`
    /// counting as degenerate
    pub fn with_epsilon(extent: GeoExtent, rect: PixelRect, epsilon: f64) -> Result<Self> {
        if extent.is_degenerate(epsilon) || !extent.is_finite() {
            return Err(MapError::DegenerateExtent {
                width: extent.width(),
                height: extent.height(),
            });
        }
        if rect.is_empty() {
            return Err(MapError::DegenerateExtent {
                width: rect.width as f64,
                height: rect.height as f64,
            });
        }
        Ok(Self {
            extent,
            rect,
            dx: rect.width as f64 / extent.width(),
            dy: rect.height as f64 / extent.height(),
        })
    }

    /// Build a transform after growing an extent narrower than `epsilon`
    pub fn clamped(extent: GeoExtent, rect: PixelRect, epsilon: f64) -> Result<Self> {
        Self::with_epsilon(extent.clamp_degenerate(epsilon), rect, epsilon)
    }

    #[inline(always)]
    pub fn min_x(&self) -> f64 {
        self.extent.min_x
    }

    #[inline(always)]
    pub fn max_y(&self) -> f64 {
        self.extent.max_y
    }

    /// Geographic point to pixel point
    #[inline(always)]
    pub fn to_pixel(&self, g: DVec2) -> DVec2 {
        DVec2::new(
            self.rect.x as f64 + (g.x - self.extent.min_x) * self.dx,
            self.rect.y as f64 + (self.extent.max_y - g.y) * self.dy,
        )
    }

    /// Pixel point to geographic point
    #[inline(always)]
    pub fn to_geo(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            self.extent.min_x + (p.x - self.rect.x as f64) / self.dx,
            self.extent.max_y - (p.y - self.rect.y as f64) / self.dy,
        )
    }

    /// Geographic extent to the pixel rectangle it covers
    pub fn extent_to_screen(&self, e: &GeoExtent) -> ScreenRect {
        ScreenRect::new(
            self.to_pixel(DVec2::new(e.min_x, e.max_y)),
            self.to_pixel(DVec2::new(e.max_x, e.min_y)),
        )
    }

    pub fn extent_to_pixels(&self, e: &GeoExtent) -> PixelRect {
        self.extent_to_screen(e).to_pixel_rect()
    }

    /// Pixel rectangle to the geographic extent it covers
    pub fn rect_to_geo(&self, r: &PixelRect) -> GeoExtent {
        let a = self.to_geo(DVec2::new(r.x as f64, r.y as f64));
        let b = self.to_geo(DVec2::new(r.right() as f64, r.bottom() as f64));
        GeoExtent::new(a.x, a.y, b.x, b.y)
    }

    /// Geographic length along X in pixels
    pub fn geo_to_pixel_distance(&self, d: f64) -> f64 {
        d * self.dx
    }

    /// Pixel length along X in geographic units
    pub fn pixel_to_geo_distance(&self, d: f64) -> f64 {
        d / self.dx
    }
}
