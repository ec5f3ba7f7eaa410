#![forbid(unsafe_code)]

//! Demo binary entry point.
//!
//! Owns the terminal session and the UI loop: drain committed results,
//! repaint when something changed, feed key and resize events to the app.
//! The loop thread is the UI-owning thread — it is the only drainer of the
//! [`UiQueue`], so every slot write happens here.
//!
//! Set `ROWFETCH_LOG` (an `env_filter` directive, e.g. `debug`) to get
//! tracing output on stderr.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use rowfetch_demo::app::{Action, App, CHROME_LINES};
use rowfetch_demo::model::SlowTableModel;
use rowfetch_core::{PoolConfig, RowModel, ThreadPool, UiQueue, Worker};

/// Frame poll interval: ~30 fps is plenty for a text list.
const POLL_INTERVAL: Duration = Duration::from_millis(33);

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("rowfetch-demo: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("ROWFETCH_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn viewport_rows(terminal_rows: u16) -> usize {
    terminal_rows.saturating_sub(CHROME_LINES).max(1) as usize
}

fn run() -> io::Result<()> {
    let ui = UiQueue::new();
    let worker: Arc<dyn Worker> = Arc::new(ThreadPool::new(PoolConfig::default()));
    let model: Arc<dyn RowModel> = Arc::new(SlowTableModel::default());

    let (_, rows) = crossterm::terminal::size()?;
    let mut app = App::new(&worker, ui.handle(), model, viewport_rows(rows));

    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::cursor::Hide
    )?;

    let result = event_loop(&mut app, &ui, &mut stdout);

    // Restore the terminal even when the loop failed.
    let _ = crossterm::execute!(
        stdout,
        crossterm::cursor::Show,
        crossterm::terminal::LeaveAlternateScreen
    );
    let _ = crossterm::terminal::disable_raw_mode();
    result
}

fn event_loop(app: &mut App, ui: &UiQueue, stdout: &mut impl Write) -> io::Result<()> {
    app.refresh();
    loop {
        if ui.drain() > 0 {
            app.mark_dirty();
        }
        if app.take_dirty() {
            app.view(stdout)?;
        }
        if crossterm::event::poll(POLL_INTERVAL)? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key)
                    if key.kind == crossterm::event::KeyEventKind::Press =>
                {
                    if app.handle_key(&key) == Action::Quit {
                        return Ok(());
                    }
                }
                crossterm::event::Event::Resize(_, rows) => {
                    app.resize_viewport(viewport_rows(rows));
                }
                _ => {}
            }
        }
    }
}
