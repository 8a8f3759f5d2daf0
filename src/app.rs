use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use glam::DVec2;
use log::{debug, info};
use mapframe::config::RenderConfig;
use mapframe::geo::GeoExtent;
use mapframe::map::{DatelineCompositor, Flow, MapEvent, PixelRect, RenderHost, RenderOutcome, SharedLayers};
use mapframe::raster::Raster;
use ratatui::layout::Rect;

/// Braille gives 2x4 pixel resolution per character
pub const CELL_PX_W: i32 = 2;
pub const CELL_PX_H: i32 = 4;

/// Keyboard pan step in pixels
const PAN_STEP_X: i32 = 20;
const PAN_STEP_Y: i32 = 12;

/// Host side of a render pass: between chunks it peeks at the terminal and
/// cancels the pass as soon as new input is waiting.
#[derive(Default)]
pub struct TerminalHost {
    pending: Vec<Event>,
    notifications: usize,
}

impl TerminalHost {
    /// Input read while rendering, to be handled once the pass returns
    pub fn take_pending(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }
}

impl RenderHost for TerminalHost {
    fn buffer_changed(&mut self, _buffer: &Raster, rects: &[PixelRect]) {
        self.notifications += 1;
        debug!("chunk done, {} dirty rects", rects.len());
    }

    fn yield_now(&mut self) -> Flow {
        match event::poll(Duration::ZERO) {
            Ok(true) => match event::read() {
                Ok(ev) => {
                    let flow = if interrupts(&ev) { Flow::Cancel } else { Flow::Continue };
                    self.pending.push(ev);
                    flow
                }
                Err(_) => Flow::Continue,
            },
            _ => Flow::Continue,
        }
    }

    fn progress(&mut self, done: usize, total: usize) {
        debug!("drawn {}/{}", done, total);
    }
}

/// Events that may change the view, making the pass in progress stale.
/// Pointer motion and releases are queued without interrupting.
fn interrupts(ev: &Event) -> bool {
    match ev {
        Event::Key(key) => key.kind == KeyEventKind::Press,
        Event::Resize(..) => true,
        Event::Mouse(mouse) => matches!(
            mouse.kind,
            MouseEventKind::ScrollUp
                | MouseEventKind::ScrollDown
                | MouseEventKind::ScrollLeft
                | MouseEventKind::ScrollRight
                | MouseEventKind::Drag(MouseButton::Left)
        ),
        _ => false,
    }
}

/// Application state
pub struct App {
    pub map: DatelineCompositor,
    pub layers: SharedLayers,
    pub should_quit: bool,
    /// Terminal area the map is drawn into
    pub map_area: Rect,
    /// Current mouse position (terminal column, row)
    pub mouse_pos: Option<(u16, u16)>,
    /// Last drag position, for pixel deltas
    drag_last: Option<(u16, u16)>,
    pub message: Option<String>,
    pub last_outcome: RenderOutcome,
    pub renders: usize,
}

impl App {
    pub fn new(layers: SharedLayers, map_area: Rect, config: RenderConfig, extent: Option<GeoExtent>) -> Self {
        let (w, h) = pixel_size(map_area);
        let mut map = DatelineCompositor::new(layers.clone(), w, h, config);
        if let Some(extent) = extent {
            map.set_view_extent(extent);
        }
        Self {
            map,
            layers,
            should_quit: false,
            map_area,
            mouse_pos: None,
            drag_last: None,
            message: None,
            last_outcome: RenderOutcome::Unchanged,
            renders: 0,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Run a render pass if the view is stale, then handle any input that
    /// interrupted it
    pub fn render_if_needed(&mut self) {
        if !self.map.needs_render() {
            return;
        }
        let mut host = TerminalHost::default();
        self.last_outcome = self.map.render(&mut host);
        self.renders += 1;
        debug!("render #{}: {:?}, {} notifications", self.renders, self.last_outcome, host.notifications);
        for ev in host.take_pending() {
            self.handle_event(ev);
        }
        self.process_map_events();
    }

    fn process_map_events(&mut self) {
        for ev in self.map.drain_events() {
            match ev {
                MapEvent::NavigationUnavailable => {
                    self.message = Some("no further extent in history".to_string());
                }
                MapEvent::ViewExtentsChanged(e) => {
                    debug!("view extent now {:?}", e);
                }
                MapEvent::BufferChanged(_) => {}
            }
        }
    }

    pub fn handle_event(&mut self, ev: Event) {
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(cols, rows) => self.resize(Rect::new(0, 0, cols, rows)),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        self.message = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),

            // Keys name the direction the view moves; the content moves the other way
            KeyCode::Left | KeyCode::Char('h') => self.map.pan_pixels(PAN_STEP_X, 0),
            KeyCode::Right | KeyCode::Char('l') => self.map.pan_pixels(-PAN_STEP_X, 0),
            KeyCode::Up | KeyCode::Char('k') => self.map.pan_pixels(0, PAN_STEP_Y),
            KeyCode::Down | KeyCode::Char('j') => self.map.pan_pixels(0, -PAN_STEP_Y),

            KeyCode::Char('+') | KeyCode::Char('=') => self.map.zoom_in(),
            KeyCode::Char('-') | KeyCode::Char('_') => self.map.zoom_out(),

            KeyCode::Char('[') => {
                self.map.zoom_previous();
            }
            KeyCode::Char(']') => {
                self.map.zoom_next();
            }
            KeyCode::Char('0') | KeyCode::Char('r') => self.map.zoom_to_max_extent(),

            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                self.toggle_layer(idx);
            }
            _ => {}
        }
    }

    fn toggle_layer(&mut self, idx: usize) {
        let id = self.layers.borrow().ids().get(idx).copied();
        let Some(id) = id else {
            return;
        };
        let mut layers = self.layers.borrow_mut();
        if let Ok(layer) = layers.get_mut(id) {
            let visible = !layer.visible();
            layer.set_visible(visible);
            info!("layer '{}' visible: {}", layer.name(), visible);
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        self.mouse_pos = Some((mouse.column, mouse.row));
        let Some(anchor) = self.pixel_at(mouse.column, mouse.row) else {
            self.drag_last = None;
            return;
        };
        let zoom = self.map.primary().config().zoom_factor;
        match mouse.kind {
            MouseEventKind::ScrollUp => self.map.zoom_at(anchor, 1.0 / zoom),
            MouseEventKind::ScrollDown => self.map.zoom_at(anchor, zoom),
            MouseEventKind::ScrollLeft => self.map.pan_pixels(PAN_STEP_X, 0),
            MouseEventKind::ScrollRight => self.map.pan_pixels(-PAN_STEP_X, 0),
            MouseEventKind::Down(MouseButton::Left) => {
                self.drag_last = Some((mouse.column, mouse.row));
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some((lx, ly)) = self.drag_last {
                    let dx = (mouse.column as i32 - lx as i32) * CELL_PX_W;
                    let dy = (mouse.row as i32 - ly as i32) * CELL_PX_H;
                    if dx != 0 || dy != 0 {
                        self.map.pan_pixels(dx, dy);
                    }
                }
                self.drag_last = Some((mouse.column, mouse.row));
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.drag_last = None;
            }
            _ => {}
        }
    }

    /// Map pixel at the centre of a terminal cell, if the cell is on the map
    pub fn pixel_at(&self, column: u16, row: u16) -> Option<DVec2> {
        let a = self.map_area;
        if column < a.x || row < a.y || column >= a.x + a.width || row >= a.y + a.height {
            return None;
        }
        let cx = (column - a.x) as f64 * CELL_PX_W as f64 + CELL_PX_W as f64 / 2.0;
        let cy = (row - a.y) as f64 * CELL_PX_H as f64 + CELL_PX_H as f64 / 2.0;
        Some(DVec2::new(cx, cy))
    }

    pub fn resize(&mut self, terminal: Rect) {
        self.map_area = crate::ui::map_area(terminal);
        let (w, h) = pixel_size(self.map_area);
        self.map.resize(w, h);
    }

    /// Geographic position under the mouse
    pub fn cursor_coords(&self) -> Option<DVec2> {
        let (col, row) = self.mouse_pos?;
        let p = self.pixel_at(col, row)?;
        let t = self.map.primary().transform().ok()?;
        Some(t.to_geo(p))
    }

    pub fn center_coords(&self) -> String {
        let c = self.map.view_extent().center();
        let lat_dir = if c.y >= 0.0 { 'N' } else { 'S' };
        let lon_dir = if c.x >= 0.0 { 'E' } else { 'W' };
        format!("{:.2}°{} {:.2}°{}", c.y.abs(), lat_dir, c.x.abs(), lon_dir)
    }

    pub fn history_position(&self) -> String {
        let h = self.map.primary().history();
        format!("{}/{}", h.index() + 1, h.len())
    }
}

pub fn pixel_size(area: Rect) -> (i32, i32) {
    (area.width as i32 * CELL_PX_W, area.height as i32 * CELL_PX_H)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn mouse(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent { kind, column: 4, row: 2, modifiers: KeyModifiers::NONE })
    }

    #[test]
    fn test_only_view_changing_events_interrupt() {
        assert!(interrupts(&Event::Key(KeyEvent::new(KeyCode::Char('h'), KeyModifiers::NONE))));
        assert!(!interrupts(&Event::Key(KeyEvent::new_with_kind(
            KeyCode::Char('h'),
            KeyModifiers::NONE,
            KeyEventKind::Release
        ))));
        assert!(interrupts(&Event::Resize(80, 24)));
        assert!(interrupts(&mouse(MouseEventKind::ScrollUp)));
        assert!(interrupts(&mouse(MouseEventKind::Drag(MouseButton::Left))));
        assert!(!interrupts(&mouse(MouseEventKind::Moved)));
        assert!(!interrupts(&mouse(MouseEventKind::Down(MouseButton::Left))));
        assert!(!interrupts(&mouse(MouseEventKind::Up(MouseButton::Left))));
        assert!(!interrupts(&Event::FocusGained));
    }
}
