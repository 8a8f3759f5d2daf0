use glam::DVec2;

/// Smallest width/height an extent may have before it is expanded
pub const EXTENT_EPSILON: f64 = 1e-7;

/// Slack allowed when comparing a normalized width against 360°
const WIDTH_TOLERANCE: f64 = 1e-9;

/// Normalize longitude into [-180, 180)
#[inline(always)]
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        return lon;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Axis-aligned geographic bounding rectangle (projected or lon/lat units)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GeoExtent {
    /// Build an extent from two corners in any order
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Extent of zero size at a single point
    pub fn from_point(p: DVec2) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// Extent centered on `center` with the given size
    pub fn from_center(center: DVec2, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    /// Whole-world lon/lat extent
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    #[inline(always)]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline(always)]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline(always)]
    pub fn center(&self) -> DVec2 {
        DVec2::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite() && self.min_y.is_finite() && self.max_x.is_finite() && self.max_y.is_finite()
    }

    /// True when either dimension is at or below `epsilon`
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        self.width() <= epsilon || self.height() <= epsilon
    }

    /// Expand a zero-area (or near zero) extent so each dimension clears
    /// `epsilon`, keeping its center.
    pub fn clamp_degenerate(&self, epsilon: f64) -> Self {
        if !self.is_degenerate(epsilon) {
            return *self;
        }
        let c = self.center();
        Self::from_center(c, self.width().max(epsilon * 2.0), self.height().max(epsilon * 2.0))
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn intersects(&self, other: &GeoExtent) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn intersection(&self, other: &GeoExtent) -> Option<GeoExtent> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeoExtent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    pub fn union(&self, other: &GeoExtent) -> GeoExtent {
        GeoExtent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow each side by `dx` horizontally and `dy` vertically
    pub fn expand_by(&self, dx: f64, dy: f64) -> GeoExtent {
        GeoExtent {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> GeoExtent {
        GeoExtent {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Scale about the center by `factor` (factor > 1 grows)
    pub fn scale(&self, factor: f64) -> GeoExtent {
        Self::from_center(self.center(), self.width() * factor, self.height() * factor)
    }

    /// Expand the smaller dimension about the center so width/height matches
    /// the pixel aspect `pixel_width / pixel_height`.
    pub fn fit_aspect(&self, pixel_width: f64, pixel_height: f64) -> GeoExtent {
        if pixel_width <= 0.0 || pixel_height <= 0.0 {
            return *self;
        }
        let target = pixel_width / pixel_height;
        let current = self.width() / self.height();
        if !current.is_finite() || (current - target).abs() < 1e-12 {
            return *self;
        }
        if current < target {
            Self::from_center(self.center(), self.height() * target, self.height())
        } else {
            Self::from_center(self.center(), self.width(), self.width() / target)
        }
    }

    /// Normalize for dateline handling: an extent wider than 360° is first
    /// rescaled to 360° about its center (height scaled by the same ratio), then
    /// the left edge is wrapped into [-180, 180). The right edge may then
    /// exceed 180, which marks an antimeridian crossing.
    pub fn normalize_lon(&self) -> GeoExtent {
        let mut e = *self;
        if e.width() > 360.0 + WIDTH_TOLERANCE {
            let ratio = 360.0 / e.width();
            e = Self::from_center(e.center(), 360.0, e.height() * ratio);
        }
        let min_x = normalize_lon(e.min_x);
        if min_x == e.min_x {
            return e;
        }
        let width = e.width();
        GeoExtent {
            min_x,
            min_y: e.min_y,
            max_x: min_x + width,
            max_y: e.max_y,
        }
    }

    /// True if the (normalized) right edge passes the antimeridian
    pub fn crosses_dateline(&self) -> bool {
        self.max_x > 180.0
    }
}

impl std::fmt::Display for GeoExtent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lon_wraps() {
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(-190.0), 170.0);
        assert_eq!(normalize_lon(180.0), -180.0);
        assert_eq!(normalize_lon(10.0), 10.0);
    }

    #[test]
    fn test_degenerate_extent_clamped_about_center() {
        let e = GeoExtent::new(5.0, 5.0, 5.0, 5.0).clamp_degenerate(EXTENT_EPSILON);
        assert!(e.width() >= EXTENT_EPSILON);
        assert!(e.height() >= EXTENT_EPSILON);
        assert!((e.center() - DVec2::new(5.0, 5.0)).length() < 1e-12);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let cases = [
            GeoExtent::new(170.0, -10.0, 200.0, 10.0),
            GeoExtent::new(-540.0, -20.0, -500.0, 20.0),
            GeoExtent::new(-300.0, -80.0, 500.0, 80.0),
            GeoExtent::new(179.0, 0.0, 181.0, 1.0),
            GeoExtent::new(-180.0, -90.0, 180.0, 90.0),
        ];
        for e in cases {
            let once = e.normalize_lon();
            let twice = once.normalize_lon();
            assert_eq!(once, twice, "normalize not idempotent for {e}");
            assert!(once.width() <= 360.0 + WIDTH_TOLERANCE);
            assert!(once.min_x >= -180.0 && once.min_x < 180.0);
        }
    }

    #[test]
    fn test_wide_extent_rescaled_preserving_aspect() {
        let e = GeoExtent::new(-360.0, -90.0, 360.0, 90.0);
        let n = e.normalize_lon();
        assert!((n.width() - 360.0).abs() < 1e-6);
        assert!((n.height() - 90.0).abs() < 1e-9);
        assert!((n.width() / n.height() - e.width() / e.height()).abs() < 1e-9);
    }

    #[test]
    fn test_fit_aspect_expands_smaller_side() {
        let e = GeoExtent::new(0.0, 0.0, 10.0, 10.0);
        let fitted = e.fit_aspect(200.0, 100.0);
        assert!((fitted.width() - 20.0).abs() < 1e-9);
        assert!((fitted.height() - 10.0).abs() < 1e-9);
        assert_eq!(fitted.center(), e.center());
    }
}
