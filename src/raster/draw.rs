use glam::DVec2;

use super::{Color, Raster};
use crate::map::ScreenRect;

/// Clip segment `a`-`b` to `bounds` (Liang-Barsky). `None` when no part of
/// it lies inside.
pub fn clip_segment(a: DVec2, b: DVec2, bounds: ScreenRect) -> Option<(DVec2, DVec2)> {
    if !(a.is_finite() && b.is_finite()) {
        return None;
    }
    let d = b - a;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let edges = [
        (-d.x, a.x - bounds.min.x),
        (d.x, bounds.max.x - a.x),
        (-d.y, a.y - bounds.min.y),
        (d.y, bounds.max.y - a.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            // Parallel to this edge and outside it
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((a + d * t0, a + d * t1))
}

/// Draw a line using Bresenham's algorithm
pub fn draw_line(raster: &mut Raster, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        raster.blend(x, y, color);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Draw a thicker line (used for strokes wider than one pixel)
pub fn draw_thick_line(raster: &mut Raster, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
    draw_line(raster, x0, y0, x1, y1, color);
    draw_line(raster, x0 + 1, y0, x1 + 1, y1, color);
    draw_line(raster, x0, y0 + 1, x1, y1 + 1, color);
}

/// Draw a filled circle (point markers)
pub fn draw_circle(raster: &mut Raster, cx: i32, cy: i32, radius: i32, color: Color) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                raster.blend(cx + dx, cy + dy, color);
            }
        }
    }
}

/// Even-odd scanline fill of one polygon given as rings (exterior then holes).
/// Pixel centers are sampled, so shared edges between neighbours do not overdraw.
pub fn fill_polygon(raster: &mut Raster, rings: &[Vec<DVec2>], color: Color) {
    if color.is_transparent() {
        return;
    }
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in rings.iter().flatten() {
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    if !min_y.is_finite() || !max_y.is_finite() {
        return;
    }

    let height = raster.height;
    let width = raster.width;
    let y_start = (min_y.floor() as i32).max(0);
    let y_end = (max_y.ceil() as i32).min(height - 1);
    let mut crossings: Vec<f64> = Vec::new();

    for y in y_start..=y_end {
        let sy = y as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            if ring.len() < 3 {
                continue;
            }
            let n = ring.len();
            for i in 0..n {
                let a = ring[i];
                let b = ring[(i + 1) % n];
                if (a.y <= sy && b.y > sy) || (b.y <= sy && a.y > sy) {
                    let t = (sy - a.y) / (b.y - a.y);
                    crossings.push(a.x + t * (b.x - a.x));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            let x0 = ((pair[0] - 0.5).ceil() as i32).max(0);
            let x1 = ((pair[1] - 0.5).floor() as i32).min(width - 1);
            for x in x0..=x1 {
                raster.blend(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_line() {
        let mut r = Raster::new(10, 1);
        draw_line(&mut r, 0, 0, 9, 0, Color::BLACK);
        assert_eq!(r.coverage(), 10);
    }

    #[test]
    fn test_vertical_line_clipped() {
        let mut r = Raster::new(1, 4);
        draw_line(&mut r, 0, -3, 0, 7, Color::BLACK);
        assert_eq!(r.coverage(), 4);
    }

    #[test]
    fn test_clip_segment() {
        let bounds = ScreenRect::new(DVec2::ZERO, DVec2::new(10.0, 10.0));
        let (a, b) = clip_segment(DVec2::new(-1e12, 5.0), DVec2::new(1e12, 5.0), bounds).unwrap();
        assert!((a - DVec2::new(0.0, 5.0)).length() < 1e-3, "{a}");
        assert!((b - DVec2::new(10.0, 5.0)).length() < 1e-3, "{b}");
        let inside = (DVec2::new(1.0, 1.0), DVec2::new(9.0, 3.0));
        assert_eq!(clip_segment(inside.0, inside.1, bounds), Some(inside));
        assert!(clip_segment(DVec2::new(-5.0, -5.0), DVec2::new(20.0, -1.0), bounds).is_none());
        assert!(clip_segment(DVec2::new(11.0, 0.0), DVec2::new(11.0, 10.0), bounds).is_none());
        assert!(clip_segment(DVec2::new(f64::NAN, 0.0), DVec2::ONE, bounds).is_none());
    }

    #[test]
    fn test_fill_square_with_hole() {
        let mut r = Raster::new(10, 10);
        let outer = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        let hole = vec![
            DVec2::new(3.0, 3.0),
            DVec2::new(7.0, 3.0),
            DVec2::new(7.0, 7.0),
            DVec2::new(3.0, 7.0),
        ];
        fill_polygon(&mut r, &[outer, hole], Color::BLACK);
        assert_eq!(r.coverage(), 100 - 16);
        assert_eq!(r.get(5, 5), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_circle_radius_zero_is_single_pixel() {
        let mut r = Raster::new(3, 3);
        draw_circle(&mut r, 1, 1, 0, Color::BLACK);
        assert_eq!(r.coverage(), 1);
    }
}
