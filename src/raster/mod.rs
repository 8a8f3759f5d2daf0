mod draw;

pub use draw::{clip_segment, draw_circle, draw_line, draw_thick_line, fill_polygon};

use glam::DVec2;
use serde::Deserialize;

use crate::map::{PixelRect, ScreenRect};

/// Straight (non premultiplied) RGBA colour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// A fully transparent colour disables whatever step would paint it
    #[inline(always)]
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Source-over compositing of `self` on top of `dst`
    #[inline(always)]
    pub fn over(self, dst: Color) -> Color {
        match self.a {
            0 => dst,
            255 => self,
            sa => {
                let sa = sa as u32;
                let da = dst.a as u32;
                let out_a = sa + da * (255 - sa) / 255;
                if out_a == 0 {
                    return Color::TRANSPARENT;
                }
                let mix = |s: u8, d: u8| -> u8 {
                    ((s as u32 * sa + d as u32 * da * (255 - sa) / 255) / out_a) as u8
                };
                Color::rgba(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b), out_a as u8)
            }
        }
    }
}

/// Text placed on a raster. Pixels only carry the glyph boxes; hosts able to
/// draw real glyphs overlay these runs.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Top-left corner of the unrotated text box
    pub origin: DVec2,
    pub size: DVec2,
    pub color: Color,
    /// Rotation in degrees, counter-clockwise, about `pivot`
    pub angle: f64,
    pub pivot: DVec2,
}

impl TextRun {
    pub fn bounds(&self) -> ScreenRect {
        ScreenRect::from_origin_size(self.origin, self.size)
    }
}

/// Drawing target for layers and labels.
///
/// Layer buffers implement it through [`Raster`]; snapshot rendering can
/// target any other implementation.
pub trait Canvas {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    fn bounds(&self) -> PixelRect {
        PixelRect::sized(self.width(), self.height())
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Color);
    fn stroke_rect(&mut self, rect: ScreenRect, color: Color, width: f64);
    fn line(&mut self, a: DVec2, b: DVec2, color: Color, width: f64);
    fn fill_polygon(&mut self, rings: &[Vec<DVec2>], color: Color);
    fn dot(&mut self, center: DVec2, radius: f64, color: Color);
    fn text(&mut self, run: TextRun);

    /// Draw `image` stretched over `dest`, nearest-neighbour sampled
    fn draw_image(&mut self, image: &Raster, dest: ScreenRect) {
        let Some(area) = dest.to_pixel_rect().intersection(&self.bounds()) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if let Some(c) = sample(image, dest, x, y) {
                    let px = ScreenRect::from_origin_size(DVec2::new(x as f64, y as f64), DVec2::ONE);
                    self.fill_rect(px, c);
                }
            }
        }
    }
}

/// Source pixel of `image` shown at destination pixel (`x`, `y`) when the
/// image is stretched over `dest`
#[inline(always)]
fn sample(image: &Raster, dest: ScreenRect, x: i32, y: i32) -> Option<Color> {
    if dest.width() <= 0.0 || dest.height() <= 0.0 {
        return None;
    }
    let u = (x as f64 + 0.5 - dest.min.x) / dest.width();
    let v = (y as f64 + 0.5 - dest.min.y) / dest.height();
    if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
        return None;
    }
    image.get((u * image.width as f64) as i32, (v * image.height as f64) as i32)
}

/// RGBA pixel buffer with the text runs drawn onto it
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    width: i32,
    height: i32,
    pixels: Vec<Color>,
    texts: Vec<TextRun>,
    /// Writes outside this rectangle are dropped
    clip: Option<PixelRect>,
}

impl Raster {
    /// Transparent raster; negative sizes are treated as zero
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            pixels: vec![Color::TRANSPARENT; (width as usize) * (height as usize)],
            texts: Vec::new(),
            clip: None,
        }
    }

    pub fn filled(width: i32, height: i32, color: Color) -> Self {
        let mut r = Self::new(width, height);
        r.pixels.fill(color);
        r
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Reset every pixel (ignoring the clip) and drop the text runs
    pub fn clear(&mut self, color: Color) {
        self.pixels.fill(color);
        self.texts.clear();
    }

    /// Restrict subsequent drawing to `clip`; `None` lifts the restriction
    pub fn set_clip(&mut self, clip: Option<PixelRect>) {
        self.clip = clip;
    }

    pub fn clip(&self) -> Option<PixelRect> {
        self.clip
    }

    /// Clear the pixels inside `rect` and the text runs touching it
    pub fn clear_rect(&mut self, rect: PixelRect) {
        let Some(area) = rect.intersection(&self.bounds_rect()) else {
            return;
        };
        for y in area.y..area.bottom() {
            let row = y as usize * self.width as usize;
            self.pixels[row + area.x as usize..row + area.right() as usize].fill(Color::TRANSPARENT);
        }
        let screen = area.to_screen();
        self.texts.retain(|t| !t.bounds().intersects(&screen));
    }

    #[inline(always)]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    #[inline(always)]
    fn writable(&self, x: i32, y: i32) -> Option<usize> {
        if let Some(clip) = &self.clip {
            if !clip.contains(x, y) {
                return None;
            }
        }
        self.index(x, y)
    }

    #[inline(always)]
    pub fn get(&self, x: i32, y: i32) -> Option<Color> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Overwrite a pixel, ignoring coordinates outside the raster or clip
    #[inline(always)]
    pub fn set(&mut self, x: i32, y: i32, color: Color) {
        if let Some(i) = self.writable(x, y) {
            self.pixels[i] = color;
        }
    }

    /// Composite a pixel with source-over
    #[inline(always)]
    pub fn blend(&mut self, x: i32, y: i32, color: Color) {
        if let Some(i) = self.writable(x, y) {
            self.pixels[i] = color.over(self.pixels[i]);
        }
    }

    pub fn texts(&self) -> &[TextRun] {
        &self.texts
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// Number of pixels that are not fully transparent
    pub fn coverage(&self) -> usize {
        self.pixels.iter().filter(|c| !c.is_transparent()).count()
    }

    /// Composite `src` with its origin at (`dx`, `dy`), source-over.
    /// Text runs follow their pixels.
    pub fn blit(&mut self, src: &Raster, dx: i32, dy: i32) {
        self.blit_clipped(src, dx, dy, self.bounds_rect());
    }

    /// Like [`Raster::blit`] but restricted to `clip` in destination space
    pub fn blit_clipped(&mut self, src: &Raster, dx: i32, dy: i32, clip: PixelRect) {
        let target = PixelRect::new(dx, dy, src.width, src.height);
        let Some(area) = target.intersection(&clip).and_then(|a| a.intersection(&self.bounds_rect())) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if let Some(c) = src.get(x - dx, y - dy) {
                    self.blend(x, y, c);
                }
            }
        }
        let clip_screen = area.to_screen();
        let offset = DVec2::new(dx as f64, dy as f64);
        for run in &src.texts {
            let mut moved = run.clone();
            moved.origin += offset;
            moved.pivot += offset;
            if moved.bounds().intersects(&clip_screen) {
                self.texts.push(moved);
            }
        }
    }

    /// Copy of this raster moved by (`dx`, `dy`); uncovered pixels are transparent.
    pub fn shifted(&self, dx: i32, dy: i32) -> Raster {
        let mut out = Raster::new(self.width, self.height);
        for y in 0..self.height {
            let sy = y - dy;
            if sy < 0 || sy >= self.height {
                continue;
            }
            for x in 0..self.width {
                if let Some(c) = self.get(x - dx, sy) {
                    out.pixels[y as usize * self.width as usize + x as usize] = c;
                }
            }
        }
        let offset = DVec2::new(dx as f64, dy as f64);
        let view = out.bounds_rect().to_screen();
        out.texts = self
            .texts
            .iter()
            .map(|run| TextRun {
                origin: run.origin + offset,
                pivot: run.pivot + offset,
                ..run.clone()
            })
            .filter(|run| run.bounds().intersects(&view))
            .collect();
        out
    }

    fn bounds_rect(&self) -> PixelRect {
        PixelRect::sized(self.width, self.height)
    }
}

impl Canvas for Raster {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Color) {
        if color.is_transparent() {
            return;
        }
        let Some(area) = rect.to_pixel_rect().intersection(&self.bounds_rect()) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                self.blend(x, y, color);
            }
        }
    }

    fn stroke_rect(&mut self, rect: ScreenRect, color: Color, width: f64) {
        let [a, b, c, d] = rect.corners();
        self.line(a, b, color, width);
        self.line(b, c, color, width);
        self.line(c, d, color, width);
        self.line(d, a, color, width);
    }

    fn line(&mut self, a: DVec2, b: DVec2, color: Color, width: f64) {
        if color.is_transparent() {
            return;
        }
        // Only the visible part is walked; far-off endpoints would overflow i32
        let margin = width.max(1.0) + 1.0;
        let Some((a, b)) = clip_segment(a, b, self.bounds_rect().to_screen().inflate(margin)) else {
            return;
        };
        let (x0, y0, x1, y1) = (
            a.x.round() as i32,
            a.y.round() as i32,
            b.x.round() as i32,
            b.y.round() as i32,
        );
        if width > 1.5 {
            draw_thick_line(self, x0, y0, x1, y1, color);
        } else {
            draw_line(self, x0, y0, x1, y1, color);
        }
    }

    fn fill_polygon(&mut self, rings: &[Vec<DVec2>], color: Color) {
        fill_polygon(self, rings, color);
    }

    fn dot(&mut self, center: DVec2, radius: f64, color: Color) {
        let reach = self.bounds_rect().to_screen().inflate(radius.max(0.0) + 1.0);
        if !(center.x >= reach.min.x && center.x <= reach.max.x && center.y >= reach.min.y && center.y <= reach.max.y) {
            return;
        }
        draw_circle(
            self,
            center.x.round() as i32,
            center.y.round() as i32,
            radius.round().max(0.0) as i32,
            color,
        );
    }

    fn text(&mut self, run: TextRun) {
        if run.color.is_transparent() || run.text.is_empty() {
            return;
        }
        if run.angle.abs() > f64::EPSILON {
            let rotated = rotate_rect(run.bounds(), run.pivot, run.angle);
            fill_polygon(self, &[rotated.to_vec()], run.color);
        } else {
            // Block glyphs: one cell per character, spaces left open
            let count = run.text.chars().count().max(1) as f64;
            let cell = DVec2::new(run.size.x / count, run.size.y);
            for (i, ch) in run.text.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let origin = run.origin + DVec2::new(cell.x * i as f64, 0.0);
                self.fill_rect(ScreenRect::from_origin_size(origin, cell), run.color);
            }
        }
        if let Some(clip) = &self.clip {
            if !run.bounds().intersects(&clip.to_screen()) {
                return;
            }
        }
        self.texts.push(run);
    }

    fn draw_image(&mut self, image: &Raster, dest: ScreenRect) {
        let Some(area) = dest.to_pixel_rect().intersection(&self.bounds_rect()) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if let Some(c) = sample(image, dest, x, y) {
                    self.blend(x, y, c);
                }
            }
        }
    }
}

/// Corners of `rect` rotated by `angle` degrees (counter-clockwise on screen) about `pivot`
pub fn rotate_rect(rect: ScreenRect, pivot: DVec2, angle: f64) -> [DVec2; 4] {
    // Screen Y grows downward, so a visually counter-clockwise turn is a negative angle
    let rot = DVec2::from_angle(-angle.to_radians());
    rect.corners().map(|c| pivot + rot.rotate(c - pivot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_opaque_and_transparent() {
        let red = Color::rgb(255, 0, 0);
        assert_eq!(red.over(Color::WHITE), red);
        assert_eq!(Color::TRANSPARENT.over(red), red);
        let half = Color::rgba(0, 0, 255, 128).over(Color::WHITE);
        assert_eq!(half.a, 255);
        assert!(half.b > 200 && half.r > 100 && half.r < 160);
    }

    #[test]
    fn test_fill_rect_clips_to_raster() {
        let mut r = Raster::new(10, 10);
        r.fill_rect(
            ScreenRect::new(DVec2::new(-5.0, -5.0), DVec2::new(3.0, 3.0)),
            Color::BLACK,
        );
        assert_eq!(r.coverage(), 9);
    }

    #[test]
    fn test_line_with_far_endpoints() {
        let mut r = Raster::new(20, 10);
        r.line(DVec2::new(-1e15, 4.0), DVec2::new(1e15, 4.0), Color::BLACK, 1.0);
        assert_eq!(r.coverage(), 20);
        r.line(DVec2::new(-1e15, -1e15), DVec2::new(-1e14, 3e15), Color::BLACK, 3.0);
        r.dot(DVec2::new(f64::MAX, 0.0), 2.0, Color::BLACK);
        assert_eq!(r.coverage(), 20);
        let far = ScreenRect::new(DVec2::new(-1e12, -1e12), DVec2::new(1e12, 1e12));
        r.fill_rect(far, Color::WHITE);
        assert_eq!(r.get(19, 9), Some(Color::WHITE));
    }

    #[test]
    fn test_blit_offsets_pixels_and_text() {
        let mut src = Raster::new(4, 4);
        src.set(0, 0, Color::BLACK);
        src.text(TextRun {
            text: "a".into(),
            origin: DVec2::new(1.0, 1.0),
            size: DVec2::new(1.0, 1.0),
            color: Color::WHITE,
            angle: 0.0,
            pivot: DVec2::new(1.0, 1.0),
        });
        let mut dst = Raster::new(8, 8);
        dst.blit(&src, 3, 2);
        assert_eq!(dst.get(3, 2), Some(Color::BLACK));
        assert_eq!(dst.get(4, 3), Some(Color::WHITE));
        assert_eq!(dst.texts()[0].origin, DVec2::new(4.0, 3.0));
    }

    #[test]
    fn test_clip_restricts_writes() {
        let mut r = Raster::new(10, 10);
        r.set_clip(Some(PixelRect::new(0, 0, 5, 10)));
        r.fill_rect(ScreenRect::new(DVec2::ZERO, DVec2::new(10.0, 10.0)), Color::BLACK);
        assert_eq!(r.coverage(), 50);
        r.set_clip(None);
        r.clear_rect(PixelRect::new(0, 0, 2, 10));
        assert_eq!(r.coverage(), 30);
    }

    #[test]
    fn test_draw_image_stretches() {
        let mut img = Raster::new(2, 1);
        img.set(0, 0, Color::BLACK);
        img.set(1, 0, Color::WHITE);
        let mut r = Raster::new(8, 4);
        r.draw_image(&img, ScreenRect::new(DVec2::ZERO, DVec2::new(8.0, 4.0)));
        assert_eq!(r.get(3, 3), Some(Color::BLACK));
        assert_eq!(r.get(4, 0), Some(Color::WHITE));
    }

    #[test]
    fn test_shifted_moves_content() {
        let mut r = Raster::new(5, 5);
        r.set(1, 1, Color::BLACK);
        let s = r.shifted(2, -1);
        assert_eq!(s.get(3, 0), Some(Color::BLACK));
        assert_eq!(s.get(1, 1), Some(Color::TRANSPARENT));
    }
}
