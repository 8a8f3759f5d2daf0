use crate::raster::{Color, Raster};

/// One terminal cell: a 2x4 dot pattern and the colour of its lit dots
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrailleCell {
    pub bits: u8,
    pub color: Color,
}

impl BrailleCell {
    /// Unicode Braille patterns live at U+2800..U+28FF
    pub fn glyph(&self) -> char {
        char::from_u32(0x2800 + self.bits as u32).unwrap_or(' ')
    }

    pub fn is_blank(&self) -> bool {
        self.bits == 0
    }
}

/// Braille Unicode canvas for high-resolution terminal graphics.
/// Each character cell represents a 2x4 pixel grid (8 dots).
pub struct BrailleCanvas {
    width: usize,  // Characters
    height: usize, // Characters
    cells: Vec<BrailleCell>,
}

impl BrailleCanvas {
    /// Create a new canvas with the given character dimensions.
    /// Effective pixel resolution: width*2 x height*4
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![BrailleCell::default(); width * height],
        }
    }

    /// Sample a raster into braille cells. A dot is lit wherever the pixel
    /// differs from `background`; the cell takes the mean colour of its lit dots.
    pub fn from_raster(raster: &Raster, background: Color) -> Self {
        let (w, h) = raster.size();
        let width = (w.max(0) as usize).div_ceil(2);
        let height = (h.max(0) as usize).div_ceil(4);
        let mut canvas = Self::new(width, height);

        for cy in 0..height {
            for cx in 0..width {
                let mut sum = [0u32; 3];
                let mut lit = 0u32;
                let mut bits = 0u8;
                for dy in 0..4 {
                    for dx in 0..2 {
                        let x = (cx * 2 + dx) as i32;
                        let y = (cy * 4 + dy) as i32;
                        let Some(c) = raster.get(x, y) else {
                            continue;
                        };
                        if c.is_transparent() || c == background {
                            continue;
                        }
                        bits |= dot_bit(dx, dy);
                        sum[0] += c.r as u32;
                        sum[1] += c.g as u32;
                        sum[2] += c.b as u32;
                        lit += 1;
                    }
                }
                if lit > 0 {
                    let color = Color::rgb((sum[0] / lit) as u8, (sum[1] / lit) as u8, (sum[2] / lit) as u8);
                    canvas.cells[cy * width + cx] = BrailleCell { bits, color };
                }
            }
        }
        canvas
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Set a pixel at the given coordinates.
    /// Braille dot layout per character:
    /// ```text
    /// (0,0) (1,0)   bits: 0x01 0x08
    /// (0,1) (1,1)   bits: 0x02 0x10
    /// (0,2) (1,2)   bits: 0x04 0x20
    /// (0,3) (1,3)   bits: 0x40 0x80
    /// ```
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        let cx = x / 2;
        let cy = y / 4;

        if cx >= self.width || cy >= self.height {
            return;
        }

        let cell = &mut self.cells[cy * self.width + cx];
        cell.bits |= dot_bit(x % 2, y % 4);
        cell.color = color;
    }

    pub fn cell(&self, cx: usize, cy: usize) -> Option<&BrailleCell> {
        if cx >= self.width || cy >= self.height {
            return None;
        }
        self.cells.get(cy * self.width + cx)
    }

    /// Get a specific row as a string (for line-by-line rendering)
    pub fn row_to_string(&self, row: usize) -> String {
        if row >= self.height {
            return String::new();
        }
        self.cells[row * self.width..(row + 1) * self.width]
            .iter()
            .map(BrailleCell::glyph)
            .collect()
    }

    /// Get all rows as an iterator of strings
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.height).map(|i| self.row_to_string(i))
    }
}

#[inline(always)]
fn dot_bit(x: usize, y: usize) -> u8 {
    match (x, y) {
        (0, 0) => 0x01,
        (1, 0) => 0x08,
        (0, 1) => 0x02,
        (1, 1) => 0x10,
        (0, 2) => 0x04,
        (1, 2) => 0x20,
        (0, 3) => 0x40,
        (1, 3) => 0x80,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(canvas: &BrailleCanvas) -> String {
        canvas.rows().collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_single_pixel() {
        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(0, 0, Color::WHITE);
        assert_eq!(text(&canvas), "⠁"); // U+2801
    }

    #[test]
    fn test_all_dots() {
        let mut canvas = BrailleCanvas::new(1, 1);
        for x in 0..2 {
            for y in 0..4 {
                canvas.set_pixel(x, y, Color::WHITE);
            }
        }
        assert_eq!(text(&canvas), "⣿"); // U+28FF (all dots)
    }

    #[test]
    fn test_diagonal() {
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.set_pixel(0, 0, Color::WHITE);
        canvas.set_pixel(1, 1, Color::WHITE);
        canvas.set_pixel(2, 2, Color::WHITE);
        canvas.set_pixel(3, 3, Color::WHITE);
        // First char: (0,0) and (1,1) = 0x01 | 0x10 = 0x11
        // Second char: (0,2) and (1,3) = 0x04 | 0x80 = 0x84
        assert_eq!(text(&canvas), "⠑⢄");
    }

    #[test]
    fn test_from_raster_skips_background_and_averages_colour() {
        let bg = Color::rgb(8, 12, 28);
        let mut raster = Raster::filled(4, 4, bg);
        raster.set(0, 0, Color::rgb(200, 0, 0));
        raster.set(1, 1, Color::rgb(100, 0, 0));
        let canvas = BrailleCanvas::from_raster(&raster, bg);
        assert_eq!((canvas.width(), canvas.height()), (2, 1));
        let cell = canvas.cell(0, 0).unwrap();
        assert_eq!(cell.bits, 0x11);
        assert_eq!(cell.color, Color::rgb(150, 0, 0));
        assert!(canvas.cell(1, 0).unwrap().is_blank());
    }

    #[test]
    fn test_from_raster_rounds_partial_cells_up() {
        let raster = Raster::new(3, 5);
        let canvas = BrailleCanvas::from_raster(&raster, Color::BLACK);
        assert_eq!((canvas.width(), canvas.height()), (2, 2));
        assert!(canvas.cell(1, 1).unwrap().is_blank());
    }
}
