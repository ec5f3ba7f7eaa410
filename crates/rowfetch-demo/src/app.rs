#![forbid(unsafe_code)]

//! Application state and rendering for the demo.
//!
//! The app owns the viewport (scroll position, slot recycler) and the
//! currently selected loading stage. Each stage is one strategy for
//! filling a freshly bound slot; switching stages swaps the strategy and
//! reloads the visible rows through a fresh pool.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use tracing::debug;

use rowfetch_core::{LoadCoordinator, RowKey, RowModel, RowSlot, UiHandle, Worker};

use crate::recycler::SlotRecycler;

/// Number of rows in the table, matching a comfortably scrollable list.
pub const TOTAL_ROWS: u64 = 300;

/// Screen lines reserved for header and footer.
pub const CHROME_LINES: u16 = 2;

/// How a freshly bound slot gets its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// Fetch on the UI thread. Correct but freezes scrolling.
    Blocking,
    /// Fetch on the pool, write back unconditionally. Smooth but stale
    /// results flicker into recycled rows.
    Racy,
    /// Fetch through the coordinator: smooth and correct.
    Coordinated,
}

impl LoadStage {
    /// Short label for the header line.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Blocking => "1: blocking",
            Self::Racy => "2: racy",
            Self::Coordinated => "3: coordinated",
        }
    }

    /// One-line description for the header line.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Blocking => "fetch on the UI thread; watch scrolling stall",
            Self::Racy => "no cancellation; watch rows flicker through stale data",
            Self::Coordinated => "per-slot cancel + gated commit; smooth and correct",
        }
    }
}

/// Outcome of a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

/// Demo application state.
pub struct App {
    stage: LoadStage,
    first_row: u64,
    viewport_rows: usize,
    recycler: SlotRecycler,
    coordinator: LoadCoordinator,
    worker: Arc<dyn Worker>,
    ui: UiHandle,
    model: Arc<dyn RowModel>,
    dirty: bool,
}

impl App {
    /// Create the app with its collaborators injected.
    #[must_use]
    pub fn new(
        worker: &Arc<dyn Worker>,
        ui: UiHandle,
        model: Arc<dyn RowModel>,
        viewport_rows: usize,
    ) -> Self {
        let viewport_rows = viewport_rows.max(1);
        Self {
            stage: LoadStage::Coordinated,
            first_row: 0,
            viewport_rows,
            recycler: SlotRecycler::new(worker, viewport_rows),
            coordinator: LoadCoordinator::new(Arc::clone(&model), ui.clone()),
            worker: Arc::clone(worker),
            ui,
            model,
            dirty: true,
        }
    }

    /// The currently selected stage.
    #[must_use]
    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    /// First visible row.
    #[must_use]
    pub fn first_row(&self) -> u64 {
        self.first_row
    }

    /// Mark the screen as needing a repaint.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Consume the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Load every visible row that is not already bound.
    pub fn refresh(&mut self) {
        let stage = self.stage;
        let coordinator = &self.coordinator;
        let worker = &self.worker;
        let ui = &self.ui;
        let model = &self.model;
        self.recycler
            .assign(self.first_row, TOTAL_ROWS, |slot, row| {
                load_row(stage, coordinator, worker, ui, model, slot, row);
            });
        self.dirty = true;
    }

    /// Handle a key press.
    pub fn handle_key(&mut self, key: &KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Char('1') => self.select_stage(LoadStage::Blocking),
            KeyCode::Char('2') => self.select_stage(LoadStage::Racy),
            KeyCode::Char('3') => self.select_stage(LoadStage::Coordinated),
            KeyCode::Up | KeyCode::Char('k') => self.scroll_to(self.first_row.saturating_sub(1)),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_to(self.first_row + 1),
            KeyCode::PageUp => {
                self.scroll_to(self.first_row.saturating_sub(self.viewport_rows as u64));
            }
            KeyCode::PageDown => self.scroll_to(self.first_row + self.viewport_rows as u64),
            KeyCode::Home => self.scroll_to(0),
            KeyCode::End => self.scroll_to(u64::MAX),
            _ => {}
        }
        Action::Continue
    }

    /// Switch loading stages and reload the viewport through fresh slots.
    pub fn select_stage(&mut self, stage: LoadStage) {
        if stage == self.stage {
            return;
        }
        debug!(stage = stage.label(), "stage selected");
        self.stage = stage;
        self.recycler.resize(&self.worker, self.viewport_rows);
        self.refresh();
    }

    /// Scroll so `first_row` is the top visible row, clamped to the table.
    pub fn scroll_to(&mut self, first_row: u64) {
        let max_first = TOTAL_ROWS.saturating_sub(self.viewport_rows as u64);
        let clamped = first_row.min(max_first);
        if clamped != self.first_row {
            self.first_row = clamped;
            self.refresh();
        }
    }

    /// Adapt to a new viewport height.
    pub fn resize_viewport(&mut self, viewport_rows: usize) {
        self.viewport_rows = viewport_rows.max(1);
        self.recycler.resize(&self.worker, self.viewport_rows);
        self.scroll_to(self.first_row);
        self.refresh();
    }

    /// Paint the whole screen.
    pub fn view(&self, out: &mut impl Write) -> io::Result<()> {
        use crossterm::cursor::MoveTo;
        use crossterm::style::Print;
        use crossterm::terminal::{Clear, ClearType};

        crossterm::queue!(
            out,
            MoveTo(0, 0),
            Clear(ClearType::CurrentLine),
            Print(format!(
                " rowfetch — stage {} ({})",
                self.stage.label(),
                self.stage.description()
            ))
        )?;

        for line in 0..self.viewport_rows {
            let row = self.first_row + line as u64;
            let rendered = if row >= TOTAL_ROWS {
                String::new()
            } else {
                let text = match self.recycler.slot_for_row(row) {
                    Some(slot) => {
                        let text = slot.text();
                        if text.is_empty() { "…".to_owned() } else { text }
                    }
                    None => "…".to_owned(),
                };
                format!(" {row:>4} │ {text}")
            };
            crossterm::queue!(
                out,
                MoveTo(0, line as u16 + 1),
                Clear(ClearType::CurrentLine),
                Print(rendered)
            )?;
        }

        crossterm::queue!(
            out,
            MoveTo(0, self.viewport_rows as u16 + 1),
            Clear(ClearType::CurrentLine),
            Print(" 1/2/3 stage · ↑↓ PgUp PgDn Home End scroll · q quit")
        )?;
        out.flush()
    }
}

/// Fill one freshly bound slot according to the selected stage.
fn load_row(
    stage: LoadStage,
    coordinator: &LoadCoordinator,
    worker: &Arc<dyn Worker>,
    ui: &UiHandle,
    model: &Arc<dyn RowModel>,
    slot: &Arc<RowSlot>,
    row: u64,
) {
    let key = RowKey::new(row);
    match stage {
        LoadStage::Blocking => {
            // The whole point of stage 1: this runs on the UI thread.
            if let Ok(text) = model.fetch(key) {
                slot.set_text(text);
            }
        }
        LoadStage::Racy => {
            // Stage 2: off the UI thread, but nothing stops a superseded
            // fetch from writing into the recycled slot.
            let model = Arc::clone(model);
            let ui = ui.clone();
            let slot = Arc::clone(slot);
            worker.execute(Box::new(move || {
                if let Ok(text) = model.fetch(key) {
                    ui.post(move || slot.set_text(text));
                }
            }));
        }
        LoadStage::Coordinated => coordinator.bind(slot, key),
    }
}
