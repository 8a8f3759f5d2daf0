use glam::DVec2;

use crate::geo::GeoExtent;

/// A ring or path of coordinates
pub type Path = Vec<DVec2>;

/// Geometry kinds the renderer understands. Every variant is multi-part.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// One or more points
    Point(Vec<DVec2>),
    /// One or more line strings
    Line(Vec<Path>),
    /// One or more polygons, each an exterior ring followed by holes
    Polygon(Vec<Vec<Path>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

/// Why a geometry cannot be measured or drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryFault {
    Empty,
    NonFinite,
    TooFewVertices,
}

impl GeometryFault {
    pub fn reason(&self) -> &'static str {
        match self {
            GeometryFault::Empty => "no coordinates",
            GeometryFault::NonFinite => "non-finite coordinate",
            GeometryFault::TooFewVertices => "too few vertices for its type",
        }
    }
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(vec![DVec2::new(x, y)])
    }

    pub fn line(path: Path) -> Self {
        Geometry::Line(vec![path])
    }

    pub fn polygon(exterior: Path) -> Self {
        Geometry::Polygon(vec![vec![exterior]])
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Line(_) => GeometryKind::Line,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            Geometry::Point(p) => p.len(),
            Geometry::Line(l) => l.len(),
            Geometry::Polygon(p) => p.len(),
        }
    }

    fn coords(&self) -> Box<dyn Iterator<Item = &DVec2> + '_> {
        match self {
            Geometry::Point(p) => Box::new(p.iter()),
            Geometry::Line(l) => Box::new(l.iter().flatten()),
            Geometry::Polygon(p) => Box::new(p.iter().flatten().flatten()),
        }
    }

    /// Check the geometry can be measured and drawn
    pub fn validate(&self) -> Result<(), GeometryFault> {
        let mut any = false;
        for c in self.coords() {
            if !c.is_finite() {
                return Err(GeometryFault::NonFinite);
            }
            any = true;
        }
        if !any {
            return Err(GeometryFault::Empty);
        }
        match self {
            Geometry::Point(_) => Ok(()),
            Geometry::Line(parts) => {
                if parts.iter().any(|p| p.len() < 2) {
                    Err(GeometryFault::TooFewVertices)
                } else {
                    Ok(())
                }
            }
            Geometry::Polygon(polys) => {
                if polys.iter().any(|rings| rings.first().map_or(true, |r| r.len() < 3)) {
                    Err(GeometryFault::TooFewVertices)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Bounding extent of all coordinates
    pub fn envelope(&self) -> Result<GeoExtent, GeometryFault> {
        self.validate()?;
        let mut it = self.coords();
        let first = *it.next().ok_or(GeometryFault::Empty)?;
        let (lo, hi) = it.fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Ok(GeoExtent::new(lo.x, lo.y, hi.x, hi.y))
    }
}

/// Signed shoelace area; positive for counter-clockwise rings
pub fn ring_signed_area(ring: &[DVec2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let n = ring.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Area of one polygon (exterior minus holes)
pub fn polygon_area(rings: &[Path]) -> f64 {
    let Some((exterior, holes)) = rings.split_first() else {
        return 0.0;
    };
    let holes: f64 = holes.iter().map(|h| ring_signed_area(h).abs()).sum();
    (ring_signed_area(exterior).abs() - holes).max(0.0)
}

/// Area-weighted centroid of one polygon. Falls back to the vertex mean for
/// zero-area rings.
pub fn polygon_centroid(rings: &[Path]) -> Option<DVec2> {
    let exterior = rings.first()?;
    if exterior.is_empty() {
        return None;
    }
    let mut acc = DVec2::ZERO;
    let mut total = 0.0;
    for (i, ring) in rings.iter().enumerate() {
        let (c, a) = ring_centroid_area(ring);
        // Holes subtract regardless of winding
        let a = if i == 0 { a.abs() } else { -a.abs() };
        acc += c * a;
        total += a;
    }
    if total.abs() > f64::EPSILON {
        Some(acc / total)
    } else {
        Some(exterior.iter().copied().sum::<DVec2>() / exterior.len() as f64)
    }
}

fn ring_centroid_area(ring: &[DVec2]) -> (DVec2, f64) {
    let area = ring_signed_area(ring);
    if area.abs() <= f64::EPSILON {
        return (DVec2::ZERO, 0.0);
    }
    let n = ring.len();
    let mut c = DVec2::ZERO;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        c += (a + b) * cross;
    }
    (c / (6.0 * area), area)
}

/// A point guaranteed to lie inside the polygon: the midpoint of the widest
/// interior span on the horizontal line through the centroid (or the extent
/// middle when that line misses the interior).
pub fn polygon_interior_point(rings: &[Path]) -> Option<DVec2> {
    let centroid = polygon_centroid(rings)?;
    if let Some(p) = widest_span_midpoint(rings, centroid.y) {
        return Some(p);
    }
    let exterior = rings.first()?;
    let (lo, hi) = exterior
        .iter()
        .fold((exterior[0], exterior[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    widest_span_midpoint(rings, (lo.y + hi.y) / 2.0).or(Some(centroid))
}

fn widest_span_midpoint(rings: &[Path], y: f64) -> Option<DVec2> {
    let mut xs = Vec::new();
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
                xs.push(a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x));
            }
        }
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.chunks_exact(2)
        .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
        .map(|pair| DVec2::new((pair[0] + pair[1]) / 2.0, y))
}

pub fn path_length(path: &[DVec2]) -> f64 {
    path.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Length-weighted centroid of the segments of a path
pub fn path_centroid(path: &[DVec2]) -> Option<DVec2> {
    let first = *path.first()?;
    let mut acc = DVec2::ZERO;
    let mut total = 0.0;
    for w in path.windows(2) {
        let len = w[0].distance(w[1]);
        acc += (w[0] + w[1]) * 0.5 * len;
        total += len;
    }
    if total <= 0.0 {
        return Some(first);
    }
    Some(acc / total)
}

/// Point halfway along the path; always on the line
pub fn path_midpoint(path: &[DVec2]) -> Option<DVec2> {
    let first = *path.first()?;
    let total = path_length(path);
    if total <= 0.0 {
        return Some(first);
    }
    let target = total * 0.5;
    let mut acc = 0.0;
    for w in path.windows(2) {
        let len = w[0].distance(w[1]);
        if len > 0.0 && acc + len >= target {
            return Some(w[0].lerp(w[1], (target - acc) / len));
        }
        acc += len;
    }
    path.last().copied()
}

pub fn path_envelope(path: &[DVec2]) -> Option<GeoExtent> {
    let first = *path.first()?;
    let (lo, hi) = path.iter().fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    Some(GeoExtent::new(lo.x, lo.y, hi.x, hi.y))
}
