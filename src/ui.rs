use mapframe::braille::BrailleCanvas;
use mapframe::map::RenderOutcome;
use mapframe::raster::{Color as RasterColor, Raster, TextRun};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

use crate::app::{App, CELL_PX_H, CELL_PX_W};

fn split(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);
    (chunks[0], chunks[1])
}

fn map_block() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Map ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

/// Terminal cells the map itself occupies within a terminal of `area`
pub fn map_area(area: Rect) -> Rect {
    let (map, _) = split(area);
    map_block().inner(map)
}

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let (map, status) = split(frame.area());
    let block = map_block();
    let inner = block.inner(map);
    frame.render_widget(block, map);

    let background = app.map.primary().config().background;
    frame.render_widget(
        MapWidget {
            composite: app.map.composite(),
            background,
            cursor_pos: app.mouse_pos,
        },
        inner,
    );
    render_status_bar(frame, app, status);
}

/// Braille rendering of the composite with its label text laid over it
struct MapWidget<'a> {
    composite: &'a Raster,
    background: RasterColor,
    cursor_pos: Option<(u16, u16)>,
}

impl MapWidget<'_> {
    fn render_labels(&self, area: Rect, buf: &mut Buffer) {
        for run in self.composite.texts() {
            // Rotated runs stay as their pixel footprint
            if run.angle.abs() > f64::EPSILON {
                continue;
            }
            let Some((x, y)) = label_cell(run, area) else {
                continue;
            };
            let style = Style::default().fg(to_term(run.color));
            let max_len = (area.x + area.width).saturating_sub(x) as usize;
            for (i, ch) in run.text.chars().take(max_len).enumerate() {
                buf[(x + i as u16, y)].set_char(ch).set_style(style);
            }
        }
    }
}

impl Widget for MapWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let canvas = BrailleCanvas::from_raster(self.composite, self.background);
        let rows = canvas.height().min(area.height as usize);
        let cols = canvas.width().min(area.width as usize);
        for cy in 0..rows {
            for cx in 0..cols {
                let Some(cell) = canvas.cell(cx, cy) else {
                    continue;
                };
                // Skip empty braille characters (U+2800)
                if cell.is_blank() {
                    continue;
                }
                buf[(area.x + cx as u16, area.y + cy as u16)]
                    .set_char(cell.glyph())
                    .set_fg(to_term(cell.color));
            }
        }

        self.render_labels(area, buf);

        if let Some((x, y)) = self.cursor_pos {
            if x >= area.x && y >= area.y && x < area.x + area.width && y < area.y + area.height {
                buf[(x, y)].set_char('╋').set_fg(Color::Red);
            }
        }
    }
}

/// Terminal cell where a label run starts, vertically centred on its box
fn label_cell(run: &TextRun, area: Rect) -> Option<(u16, u16)> {
    let col = (run.origin.x / CELL_PX_W as f64).round();
    let row = ((run.origin.y + run.size.y / 2.0) / CELL_PX_H as f64).floor();
    if col < 0.0 || row < 0.0 || col >= area.width as f64 || row >= area.height as f64 {
        return None;
    }
    Some((area.x + col as u16, area.y + row as u16))
}

fn to_term(c: RasterColor) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let extent = app.map.view_extent();
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = vec![
        Span::styled(" Width: ", dim),
        Span::styled(format!("{:.2}°", extent.width()), Style::default().fg(Color::Yellow)),
        Span::styled(" History: ", dim),
        Span::styled(app.history_position(), Style::default().fg(Color::Magenta)),
        Span::styled(" | ", dim),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
    ];
    if app.map.is_split() {
        spans.push(Span::styled(" [dateline]", Style::default().fg(Color::Green)));
    }
    if let Some(p) = app.cursor_coords() {
        spans.push(Span::styled(format!(" cursor {:.2},{:.2}", p.x, p.y), dim));
    }
    match app.last_outcome {
        RenderOutcome::Cancelled => spans.push(Span::styled(" (interrupted)", dim)),
        RenderOutcome::Suppressed => spans.push(Span::styled(" (view too small)", Style::default().fg(Color::Red))),
        _ => {}
    }
    if let Some(msg) = &app.message {
        spans.push(Span::styled(format!(" {}", msg), Style::default().fg(Color::Red)));
    }
    spans.push(Span::styled(
        " | hjkl:pan +/-:zoom [ ]:history 0:full 1-9:layers q:quit",
        dim,
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
