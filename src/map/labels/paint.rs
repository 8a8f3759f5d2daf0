use glam::DVec2;

use crate::map::labels::placement::LabelSymbolizer;
use crate::map::ScreenRect;
use crate::raster::{rotate_rect, Canvas, Color, TextRun};

/// One accepted label ready to paint
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLabel {
    pub text: String,
    /// Unrotated label box
    pub rect: ScreenRect,
    /// Pixel anchor the box rotates about
    pub anchor: DVec2,
    pub angle: f64,
}

/// Paint a label in order: background, border, drop shadow, halo, text.
/// Each step can be switched off, and a transparent colour skips it too.
pub fn paint_label(canvas: &mut dyn Canvas, label: &PlacedLabel, sym: &LabelSymbolizer) {
    let rotated = label.angle.abs() > f64::EPSILON;

    if sym.use_background && !sym.background_color.is_transparent() {
        if rotated {
            let corners = rotate_rect(label.rect, label.anchor, label.angle);
            canvas.fill_polygon(&[corners.to_vec()], sym.background_color);
        } else {
            canvas.fill_rect(label.rect, sym.background_color);
        }
    }

    if sym.use_border && !sym.border_color.is_transparent() {
        outline(canvas, label, label.rect, sym.border_color, sym.border_width);
    }

    if sym.use_shadow && !sym.shadow_color.is_transparent() {
        text(canvas, label, sym.shadow_offset, sym.shadow_color);
    }

    if sym.use_halo && !sym.halo_color.is_transparent() && sym.halo_width > 0.0 {
        let w = sym.halo_width;
        let ring = ScreenRect::new(label.rect.min - DVec2::splat(w / 2.0), label.rect.max + DVec2::splat(w / 2.0));
        outline(canvas, label, ring, sym.halo_color, w);
    }

    text(canvas, label, DVec2::ZERO, sym.font_color);
}

fn outline(canvas: &mut dyn Canvas, label: &PlacedLabel, rect: ScreenRect, color: Color, width: f64) {
    if label.angle.abs() <= f64::EPSILON {
        canvas.stroke_rect(rect, color, width);
        return;
    }
    let c = rotate_rect(rect, label.anchor, label.angle);
    for i in 0..4 {
        canvas.line(c[i], c[(i + 1) % 4], color, width);
    }
}

fn text(canvas: &mut dyn Canvas, label: &PlacedLabel, offset: DVec2, color: Color) {
    if color.is_transparent() {
        return;
    }
    canvas.text(TextRun {
        text: label.text.clone(),
        origin: label.rect.min + offset,
        size: label.rect.size(),
        color,
        angle: label.angle,
        pivot: label.anchor + offset,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canvas that records which operation ran with which colour
    #[derive(Default)]
    struct Recorder {
        ops: Vec<(&'static str, Color)>,
    }

    impl Canvas for Recorder {
        fn width(&self) -> i32 {
            100
        }
        fn height(&self) -> i32 {
            100
        }
        fn fill_rect(&mut self, _rect: ScreenRect, color: Color) {
            self.ops.push(("fill", color));
        }
        fn stroke_rect(&mut self, _rect: ScreenRect, color: Color, _width: f64) {
            self.ops.push(("stroke", color));
        }
        fn line(&mut self, _a: DVec2, _b: DVec2, color: Color, _width: f64) {
            self.ops.push(("line", color));
        }
        fn fill_polygon(&mut self, _rings: &[Vec<DVec2>], color: Color) {
            self.ops.push(("polygon", color));
        }
        fn dot(&mut self, _center: DVec2, _radius: f64, color: Color) {
            self.ops.push(("dot", color));
        }
        fn text(&mut self, run: TextRun) {
            self.ops.push(("text", run.color));
        }
    }

    const BG: Color = Color::rgb(1, 0, 0);
    const BORDER: Color = Color::rgb(2, 0, 0);
    const SHADOW: Color = Color::rgb(3, 0, 0);
    const HALO: Color = Color::rgb(4, 0, 0);
    const FONT: Color = Color::rgb(5, 0, 0);

    fn styled() -> LabelSymbolizer {
        LabelSymbolizer {
            use_background: true,
            background_color: BG,
            use_border: true,
            border_color: BORDER,
            use_shadow: true,
            shadow_color: SHADOW,
            use_halo: true,
            halo_color: HALO,
            font_color: FONT,
            ..LabelSymbolizer::new("[NAME]")
        }
    }

    fn label(angle: f64) -> PlacedLabel {
        PlacedLabel {
            text: "Paris".into(),
            rect: ScreenRect::from_origin_size(DVec2::new(10.0, 10.0), DVec2::new(30.0, 10.0)),
            anchor: DVec2::new(25.0, 15.0),
            angle,
        }
    }

    #[test]
    fn test_paint_steps_in_order() {
        let mut rec = Recorder::default();
        paint_label(&mut rec, &label(0.0), &styled());
        assert_eq!(
            rec.ops,
            vec![("fill", BG), ("stroke", BORDER), ("text", SHADOW), ("stroke", HALO), ("text", FONT)]
        );
    }

    #[test]
    fn test_transparent_or_disabled_steps_are_skipped() {
        let mut sym = styled();
        sym.use_border = false;
        sym.shadow_color = Color::TRANSPARENT;
        let mut rec = Recorder::default();
        paint_label(&mut rec, &label(0.0), &sym);
        assert_eq!(rec.ops, vec![("fill", BG), ("stroke", HALO), ("text", FONT)]);
    }

    #[test]
    fn test_rotated_label_uses_polygons_and_lines() {
        let mut rec = Recorder::default();
        paint_label(&mut rec, &label(30.0), &styled());
        assert_eq!(rec.ops[0], ("polygon", BG));
        assert_eq!(rec.ops[1..5], [("line", BORDER); 4]);
        assert_eq!(rec.ops.last(), Some(&("text", FONT)));
    }
}
