mod app;
mod catalog;
mod config;
mod constants;
mod display;
mod graphics;
mod input;
mod theme;
mod thumbnail;
mod ui;
mod viewer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use tracing::info;

use app::App;
use display::{CliPreviewMode, DisplayMode};
use graphics::{kitty_delete_all, kitty_render_image};
use viewer::ProcessViewer;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Server base address to connect to on startup (e.g. http://example.org:8080)
  server: Option<String>,

  /// Thumbnail previews: 'auto', 'kitty', 'direct', 'ascii', or 'off'
  #[arg(short, long, default_value = "auto")]
  previews: CliPreviewMode,

  /// Viewer command used to open datasets (overrides the saved preference)
  #[arg(long)]
  viewer: Option<String>,

  /// Print shell completions and exit
  #[arg(long, value_enum)]
  completions: Option<clap_complete::Shell>,
}

// --- Logging ---

/// Log to a file under the platform data dir; the TUI owns the terminal.
/// Returns the appender guard, which must live as long as the program.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let proj_dirs = directories::ProjectDirs::from("", "", "dsb")?;
  let log_dir = proj_dirs.data_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;

  let appender = tracing_appender::rolling::daily(log_dir, "dsb.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dsb=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  info!(version = env!("CARGO_PKG_VERSION"), "dsb starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, args: Args) -> Result<()> {
  let display_mode = display::resolve_display_mode(args.previews);
  let launcher = Arc::new(ProcessViewer::from_preferences(args.viewer));
  let mut app = App::new(display_mode, launcher);

  if let Some(server) = args.server {
    app.input = server;
    app.cursor_position = app.input.chars().count();
    app.trigger_connect();
  }

  loop {
    app.check_pending();
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if display_mode == DisplayMode::Kitty {
      // Kitty images are raw escape writes outside ratatui's buffer; re-send
      // only when the selection or the pane geometry changed.
      let target = app.gfx.thumb_area.and_then(|area| app.selected_thumbnail_id().map(|id| (id, area)));
      match target {
        Some((id, area)) => {
          let key = (id.clone(), area);
          if app.gfx.last_sent.as_ref() != Some(&key) {
            kitty_delete_all()?;
            if let Some(image) = app.thumbnails.get(&id) {
              kitty_render_image(image, area)?;
            }
            app.gfx.last_sent = Some(key);
          }
        }
        None => {
          if app.gfx.last_sent.take().is_some() {
            kitty_delete_all()?;
          }
        }
      }
    }

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key)?;
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  if display_mode == DisplayMode::Kitty {
    kitty_delete_all()?;
  }
  Ok(())
}
