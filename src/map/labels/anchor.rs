use glam::DVec2;

use crate::map::geometry::{
    path_centroid, path_envelope, path_length, path_midpoint, polygon_area, polygon_centroid,
    polygon_interior_point, Geometry, GeometryFault, Path,
};

/// Where on a line or polygon part the label is anchored
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlacementMethod {
    #[default]
    Centroid,
    /// A point guaranteed to lie on the part
    InteriorPoint,
    /// Center of the part's bounding envelope
    Envelope,
}

/// Which parts of a multi-part geometry get a label
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartMethod {
    #[default]
    All,
    /// Largest polygon by area, longest line by length, first point
    Largest,
}

/// Geographic label anchors for `geometry`, one per labelled part
pub fn anchors(geometry: &Geometry, method: PlacementMethod, parts: PartMethod) -> Result<Vec<DVec2>, GeometryFault> {
    geometry.validate()?;
    let out = match geometry {
        Geometry::Point(points) => match parts {
            PartMethod::All => points.clone(),
            PartMethod::Largest => points.first().copied().into_iter().collect(),
        },
        Geometry::Line(lines) => select(lines, parts, |l| path_length(l))
            .filter_map(|l| line_anchor(l, method))
            .collect(),
        Geometry::Polygon(polys) => select(polys, parts, |rings| polygon_area(rings))
            .filter_map(|rings| polygon_anchor(rings, method))
            .collect(),
    };
    if out.iter().any(|p| !p.is_finite()) {
        return Err(GeometryFault::NonFinite);
    }
    Ok(out)
}

fn select<'a, T>(
    parts: &'a [T],
    method: PartMethod,
    measure: impl Fn(&T) -> f64,
) -> Box<dyn Iterator<Item = &'a T> + 'a> {
    match method {
        PartMethod::All => Box::new(parts.iter()),
        PartMethod::Largest => Box::new(
            parts
                .iter()
                .max_by(|a, b| measure(a).total_cmp(&measure(b)))
                .into_iter(),
        ),
    }
}

fn line_anchor(path: &Path, method: PlacementMethod) -> Option<DVec2> {
    match method {
        PlacementMethod::Centroid => path_centroid(path),
        PlacementMethod::InteriorPoint => path_midpoint(path),
        PlacementMethod::Envelope => path_envelope(path).map(|e| e.center()),
    }
}

fn polygon_anchor(rings: &[Path], method: PlacementMethod) -> Option<DVec2> {
    match method {
        PlacementMethod::Centroid => polygon_centroid(rings),
        PlacementMethod::InteriorPoint => polygon_interior_point(rings),
        PlacementMethod::Envelope => rings.first().and_then(|r| path_envelope(r)).map(|e| e.center()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Path {
        vec![
            DVec2::new(x, y),
            DVec2::new(x + size, y),
            DVec2::new(x + size, y + size),
            DVec2::new(x, y + size),
        ]
    }

    #[test]
    fn test_point_anchor_is_the_vertex() {
        let g = Geometry::Point(vec![DVec2::new(1.0, 2.0), DVec2::new(3.0, 4.0)]);
        assert_eq!(anchors(&g, PlacementMethod::Envelope, PartMethod::All).unwrap().len(), 2);
        assert_eq!(
            anchors(&g, PlacementMethod::Centroid, PartMethod::Largest).unwrap(),
            vec![DVec2::new(1.0, 2.0)]
        );
    }

    #[test]
    fn test_largest_polygon_part() {
        let g = Geometry::Polygon(vec![vec![square(0.0, 0.0, 1.0)], vec![square(10.0, 10.0, 4.0)]]);
        let all = anchors(&g, PlacementMethod::Centroid, PartMethod::All).unwrap();
        assert_eq!(all.len(), 2);
        let largest = anchors(&g, PlacementMethod::Centroid, PartMethod::Largest).unwrap();
        assert_eq!(largest.len(), 1);
        assert!((largest[0] - DVec2::new(12.0, 12.0)).length() < 1e-9);
    }

    #[test]
    fn test_longest_line_part_methods() {
        let short = vec![DVec2::new(0.0, 0.0), DVec2::new(1.0, 0.0)];
        let long = vec![DVec2::new(0.0, 5.0), DVec2::new(10.0, 5.0), DVec2::new(10.0, 15.0)];
        let g = Geometry::Line(vec![short, long]);
        let env = anchors(&g, PlacementMethod::Envelope, PartMethod::Largest).unwrap();
        assert_eq!(env, vec![DVec2::new(5.0, 10.0)]);
        let mid = anchors(&g, PlacementMethod::InteriorPoint, PartMethod::Largest).unwrap();
        assert_eq!(mid, vec![DVec2::new(10.0, 5.0)]);
    }

    #[test]
    fn test_interior_point_of_concave_polygon_is_inside() {
        // U shape whose centroid lies in the notch
        let u = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(8.0, 10.0),
            DVec2::new(8.0, 2.0),
            DVec2::new(2.0, 2.0),
            DVec2::new(2.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let p = anchors(&Geometry::polygon(u), PlacementMethod::InteriorPoint, PartMethod::All).unwrap()[0];
        let in_left_arm = p.x > 0.0 && p.x < 2.0;
        let in_right_arm = p.x > 8.0 && p.x < 10.0;
        let in_base = p.y > 0.0 && p.y < 2.0;
        assert!(in_left_arm || in_right_arm || in_base, "{p:?}");
    }

    #[test]
    fn test_malformed_geometry_is_reported() {
        let g = Geometry::Polygon(vec![vec![vec![DVec2::ZERO, DVec2::ONE]]]);
        assert_eq!(
            anchors(&g, PlacementMethod::Centroid, PartMethod::All),
            Err(GeometryFault::TooFewVertices)
        );
    }
}
