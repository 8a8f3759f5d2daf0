use std::collections::HashMap;

use crate::geo::GeoExtent;
use crate::map::ScreenRect;

/// Uniform hash grid over screen-space rectangles.
/// Each rectangle is indexed into every cell it overlaps.
pub struct SpatialGrid<T> {
    /// Grid cells indexed by (cell_x, cell_y)
    cells: HashMap<(i32, i32), Vec<usize>>,
    /// All items (indices into this vec stored in cells)
    items: Vec<(ScreenRect, T)>,
    /// Cell size in pixels
    cell_size: f64,
}

impl<T> SpatialGrid<T> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            items: Vec::new(),
            cell_size: cell_size.max(1.0),
        }
    }

    #[inline(always)]
    fn to_cell(&self, x: f64, y: f64) -> (i32, i32) {
        ((x / self.cell_size).floor() as i32, (y / self.cell_size).floor() as i32)
    }

    fn cell_range(&self, rect: &ScreenRect) -> ((i32, i32), (i32, i32)) {
        (self.to_cell(rect.min.x, rect.min.y), self.to_cell(rect.max.x, rect.max.y))
    }

    pub fn insert(&mut self, rect: ScreenRect, item: T) {
        let idx = self.items.len();
        self.items.push((rect, item));
        let (lo, hi) = self.cell_range(&rect);
        for y in lo.1..=hi.1 {
            for x in lo.0..=hi.0 {
                self.cells.entry((x, y)).or_default().push(idx);
            }
        }
    }

    /// True if any stored rectangle strictly overlaps `rect`
    pub fn any_intersecting(&self, rect: &ScreenRect) -> bool {
        let (lo, hi) = self.cell_range(rect);
        for y in lo.1..=hi.1 {
            for x in lo.0..=hi.0 {
                if let Some(indices) = self.cells.get(&(x, y)) {
                    if indices.iter().any(|&i| self.items[i].0.intersects(rect)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.items.clear();
    }

    pub fn items(&self) -> impl Iterator<Item = &(ScreenRect, T)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Spatial index for geographic features using conservative approximation.
/// Each feature's bounding box is indexed into every cell it overlaps,
/// guaranteeing no false negatives while allowing false positives
/// (eliminated by the envelope check in [`FeatureGrid::query`]).
pub struct FeatureGrid {
    cells: HashMap<(i32, i32), Vec<usize>>,
    envelopes: Vec<Option<GeoExtent>>,
    cell_size: f64,
}

impl FeatureGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            envelopes: Vec::new(),
            cell_size,
        }
    }

    #[inline(always)]
    fn to_cell(&self, x: f64, y: f64) -> (i32, i32) {
        let cx = (x / self.cell_size).floor().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        let cy = (y / self.cell_size).floor().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        (cx, cy)
    }

    /// Build from feature envelopes (conservative approximation: each feature
    /// inserted into every cell its bbox overlaps). `None` marks a feature whose
    /// geometry could not be measured; it is never returned.
    ///
    /// The cell size targets a handful of features per cell over `bounds`.
    pub fn build(envelopes: Vec<Option<GeoExtent>>) -> Self {
        let bounds = envelopes
            .iter()
            .flatten()
            .copied()
            .reduce(|a, b| a.union(&b));
        let count = envelopes.iter().flatten().count().max(1) as f64;
        let cell_size = match bounds {
            Some(b) => (b.width().max(b.height()) / count.sqrt().max(1.0) * 2.0).max(1e-6),
            None => 1.0,
        };
        let mut grid = Self::new(cell_size);
        for (idx, env) in envelopes.iter().enumerate() {
            let Some(env) = env else {
                continue;
            };
            let min_cell = grid.to_cell(env.min_x, env.min_y);
            let max_cell = grid.to_cell(env.max_x, env.max_y);
            for y in min_cell.1..=max_cell.1 {
                for x in min_cell.0..=max_cell.0 {
                    grid.cells.entry((x, y)).or_default().push(idx);
                }
            }
        }
        grid.envelopes = envelopes;
        grid
    }

    /// Append feature indices whose envelopes intersect `region` into results.
    /// May contain duplicates; caller should dedup after all queries.
    pub fn query_into(&self, region: &GeoExtent, results: &mut Vec<usize>) {
        let min_cell = self.to_cell(region.min_x, region.min_y);
        let max_cell = self.to_cell(region.max_x, region.max_y);
        let cells_spanned = (max_cell.0 as i64 - min_cell.0 as i64 + 1) * (max_cell.1 as i64 - min_cell.1 as i64 + 1);
        if cells_spanned > self.cells.len() as i64 {
            // Region covers more cells than exist; walking the occupied ones is cheaper
            for (&(x, y), indices) in &self.cells {
                if x >= min_cell.0 && x <= max_cell.0 && y >= min_cell.1 && y <= max_cell.1 {
                    self.push_hits(indices, region, results);
                }
            }
            return;
        }
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                if let Some(indices) = self.cells.get(&(x, y)) {
                    self.push_hits(indices, region, results);
                }
            }
        }
    }

    fn push_hits(&self, indices: &[usize], region: &GeoExtent, results: &mut Vec<usize>) {
        results.extend(indices.iter().copied().filter(|&i| {
            self.envelopes
                .get(i)
                .and_then(|e| e.as_ref())
                .is_some_and(|e| e.intersects(region))
        }));
    }

    /// Sorted, de-duplicated feature indices intersecting any of `regions`
    pub fn query(&self, regions: &[GeoExtent]) -> Vec<usize> {
        let mut results = Vec::new();
        for r in regions {
            self.query_into(r, &mut results);
        }
        results.sort_unstable();
        results.dedup();
        results
    }

    pub fn envelope(&self, idx: usize) -> Option<&GeoExtent> {
        self.envelopes.get(idx).and_then(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[test]
    fn test_feature_grid_finds_overlapping() {
        let envs = vec![
            Some(GeoExtent::new(0.0, 0.0, 1.0, 1.0)),
            Some(GeoExtent::new(10.0, 10.0, 11.0, 11.0)),
            None,
            Some(GeoExtent::new(-5.0, -5.0, 20.0, 20.0)),
        ];
        let grid = FeatureGrid::build(envs);
        assert_eq!(grid.query(&[GeoExtent::new(0.5, 0.5, 2.0, 2.0)]), vec![0, 3]);
        assert_eq!(
            grid.query(&[GeoExtent::new(0.5, 0.5, 2.0, 2.0), GeoExtent::new(10.5, 10.5, 12.0, 12.0)]),
            vec![0, 1, 3]
        );
        assert!(grid.query(&[GeoExtent::new(100.0, 100.0, 101.0, 101.0)]).is_empty());
    }

    #[test]
    fn test_huge_query_region_walks_occupied_cells() {
        let grid = FeatureGrid::build(vec![Some(GeoExtent::new(0.0, 0.0, 1.0, 1.0))]);
        assert_eq!(grid.query(&[GeoExtent::new(-1e9, -1e9, 1e9, 1e9)]), vec![0]);
    }

    #[test]
    fn test_spatial_grid_intersections() {
        let mut grid = SpatialGrid::new(16.0);
        grid.insert(ScreenRect::new(DVec2::new(0.0, 0.0), DVec2::new(10.0, 10.0)), ());
        assert!(grid.any_intersecting(&ScreenRect::new(DVec2::new(5.0, 5.0), DVec2::new(40.0, 40.0))));
        assert!(!grid.any_intersecting(&ScreenRect::new(DVec2::new(10.0, 0.0), DVec2::new(40.0, 40.0))));
        assert_eq!(grid.len(), 1);
        grid.clear();
        assert!(grid.is_empty());
    }
}
