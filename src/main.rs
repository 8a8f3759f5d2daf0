mod app;
mod ui;

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use log::{info, warn};
use mapframe::config::RenderConfig;
use mapframe::data;
use mapframe::geo::GeoExtent;
use mapframe::map::LayerStack;
use ratatui::layout::Rect;
use ratatui::DefaultTerminal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental terminal map viewer")]
struct Args {
    /// Directory of GeoJSON files, one layer per file
    #[arg(long, default_value = "data")]
    data: PathBuf,

    /// JSON render configuration
    #[arg(long, default_value = "tui-mapframe.json")]
    config: PathBuf,

    /// Initial view as minx,miny,maxx,maxy
    #[arg(long, value_parser = parse_extent, allow_hyphen_values = true)]
    extent: Option<GeoExtent>,

    /// Log file; RUST_LOG picks the level
    #[arg(long, default_value = "tui-mapframe.log")]
    log: PathBuf,
}

fn parse_extent(s: &str) -> std::result::Result<GeoExtent, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts[..] {
        [x1, y1, x2, y2] => {
            let e = GeoExtent::new(x1, y1, x2, y2);
            if e.is_finite() {
                Ok(e)
            } else {
                Err("extent must be finite".to_string())
            }
        }
        _ => Err(format!("expected 4 comma separated numbers, got {}", parts.len())),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Terminal output belongs to the map, so logs go to a file
    let log_file = File::create(&args.log).with_context(|| format!("creating {}", args.log.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let config = RenderConfig::load(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    let layers = LayerStack::new().shared();
    {
        let mut stack = layers.borrow_mut();
        let loaded = if args.data.is_dir() {
            data::load_dir(&args.data)?
        } else {
            Vec::new()
        };
        let loaded = if loaded.is_empty() {
            warn!("no data in {}, using the built-in world", args.data.display());
            data::fallback_world()
        } else {
            loaded
        };
        for layer in loaded {
            stack.push(layer);
        }
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let size = terminal.size()?;
    let area = ui::map_area(Rect::new(0, 0, size.width, size.height));
    let mut app = App::new(layers, area, config, args.extent);

    let result = run(&mut terminal, &mut app);

    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    info!("exit after {} render passes", app.renders);
    result
}

fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    loop {
        app.render_if_needed();
        terminal.draw(|frame| ui::render(frame, app))?;

        if app.should_quit {
            break;
        }

        // ~60fps when idle
        if event::poll(Duration::from_millis(16))? {
            app.handle_event(event::read()?);
        }
    }
    Ok(())
}
