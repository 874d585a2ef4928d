//! One client's whiteboard session.
//!
//! [`BoardSession`] wires the local [`Whiteboard`] to a [`SyncCoordinator`] and
//! a [`PixmapRenderer`]. The host loop feeds it pointer events and commands and
//! calls [`BoardSession::tick`] regularly to apply remote snapshots and flush
//! throttled saves. Everything runs on the caller's thread; store futures are
//! driven to completion in place.

use crate::commands::{Command, CommandOutcome};
use crate::config::{ConfigError, WhiteboardConfig};
use cafeboard_core::{
    BoardStore, CommitReason, ConnectionState, InputOutcome, PointerEvent, SaveKind, SaveOutcome,
    StoreError, SyncCoordinator, TextCommit, TextMeasure, Whiteboard,
};
use cafeboard_render::{
    PixmapRenderer, RenderContext, RenderError, Renderer, TextRasterizer, write_export,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// A whiteboard bound to a store and a pixel surface.
pub struct BoardSession<S: BoardStore + ?Sized = dyn BoardStore> {
    board: Whiteboard,
    sync: SyncCoordinator<S>,
    renderer: PixmapRenderer,
    config: WhiteboardConfig,
    last_save: Option<SaveOutcome>,
}

impl<S: BoardStore + ?Sized> BoardSession<S> {
    /// Build a session. Call [`open`](Self::open) to start receiving the board.
    pub fn new(config: WhiteboardConfig, store: Arc<S>) -> SessionResult<Self> {
        config.validate()?;

        let text = Arc::new(load_text(&config));
        let measure: Arc<dyn TextMeasure + Send + Sync> = text.clone();
        let board = Whiteboard::new()
            .with_measure(measure)
            .with_text_origin(config.default_text_origin);
        let sync = SyncCoordinator::new(store, config.board_id.clone())
            .with_interval(config.save_interval());
        let renderer = PixmapRenderer::new(config.canvas_width, config.canvas_height, text)?;

        let mut session = Self {
            board,
            sync,
            renderer,
            config,
            last_save: None,
        };
        session.redraw();
        Ok(session)
    }

    /// Subscribe to the board and apply whatever is already there.
    pub fn open(&mut self) -> SessionResult<()> {
        self.sync.open()?;
        self.apply_remote();
        Ok(())
    }

    /// Flush a pending save and drop the subscription.
    pub fn close(&mut self) {
        if self.sync.has_pending() {
            let state = self.board.board().clone();
            self.last_save = Some(pollster::block_on(self.sync.save(&state)));
        }
        self.sync.close();
        self.sync.store().close();
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.board
    }

    pub fn sync(&self) -> &SyncCoordinator<S> {
        &self.sync
    }

    pub fn renderer(&self) -> &PixmapRenderer {
        &self.renderer
    }

    pub fn config(&self) -> &WhiteboardConfig {
        &self.config
    }

    pub fn is_loading(&self) -> bool {
        self.sync.is_loading()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.sync.connection_state()
    }

    /// Outcome of the most recent save attempt.
    pub fn last_save(&self) -> Option<SaveOutcome> {
        self.last_save
    }

    // --- Input ---

    pub fn handle_pointer(&mut self, event: PointerEvent) -> InputOutcome {
        let result = self.board.handle_pointer(event);

        match &result.outcome {
            InputOutcome::Segment { from, to } => {
                let tools = self.board.tools();
                self.renderer
                    .draw_segment(*from, *to, tools.color(), tools.stroke_width());
            }
            InputOutcome::StrokeCommitted(_)
            | InputOutcome::Selected(_)
            | InputOutcome::DragMoved { .. }
            | InputOutcome::DragCommitted { .. } => self.redraw(),
            InputOutcome::None | InputOutcome::StrokeStarted(_) | InputOutcome::ComposeStarted(_) => {}
        }

        if let Some(kind) = result.save {
            self.persist(kind);
        }
        result.outcome
    }

    pub fn begin_edit(&mut self, id: &str) -> bool {
        self.board.begin_edit(id)
    }

    pub fn set_text_buffer(&mut self, text: impl Into<String>) {
        self.board.set_text_buffer(text);
    }

    pub fn commit_text(&mut self, reason: CommitReason) -> TextCommit {
        let (commit, save) = self.board.commit_text(reason);
        if let Some(kind) = save {
            self.redraw();
            self.persist(kind);
        }
        commit
    }

    // --- Commands ---

    pub fn execute(&mut self, command: Command) -> SessionResult<CommandOutcome> {
        let applied = |changed: bool| {
            if changed {
                CommandOutcome::Applied
            } else {
                CommandOutcome::Ignored
            }
        };

        let outcome = match command {
            Command::SetMode(mode) => applied(self.board.set_mode(mode)),
            Command::SetColor(color) => {
                self.board.set_color(color);
                CommandOutcome::Applied
            }
            Command::SetStrokeWidth(width) => {
                self.board.set_stroke_width(width);
                CommandOutcome::Applied
            }
            Command::SetFontSize(size) => {
                self.board.set_font_size(size);
                CommandOutcome::Applied
            }
            Command::Undo => self.mutate(Whiteboard::undo),
            Command::Clear => self.mutate(|board| Some(board.clear())),
            Command::DeleteSelected => self.mutate(Whiteboard::delete_selected),
            Command::CancelText => applied(self.board.cancel_text()),
            Command::ExportImage => CommandOutcome::Exported(self.export_image()?),
        };
        Ok(outcome)
    }

    fn mutate(&mut self, f: impl FnOnce(&mut Whiteboard) -> Option<SaveKind>) -> CommandOutcome {
        match f(&mut self.board) {
            Some(kind) => {
                self.redraw();
                self.persist(kind);
                CommandOutcome::Applied
            }
            None => CommandOutcome::Ignored,
        }
    }

    // --- Sync ---

    /// Apply remote snapshots and send a due throttled save.
    ///
    /// Returns true if the board was redrawn.
    pub fn tick(&mut self) -> bool {
        let redrawn = self.apply_remote();
        if self.sync.has_pending() {
            let outcome = pollster::block_on(self.sync.maybe_flush());
            if outcome != SaveOutcome::Deferred {
                self.last_save = Some(outcome);
            }
        }
        redrawn
    }

    fn apply_remote(&mut self) -> bool {
        let Some(update) = self.sync.poll_remote() else {
            return false;
        };
        if update.missing {
            log::info!("Board {} does not exist yet, starting empty", self.sync.board_id());
        }
        if self.board.replace_state(update.state) {
            log::debug!("Applied remote update for board {}", self.sync.board_id());
            self.redraw();
            true
        } else {
            log::debug!("Remote update for board {} matched local state", self.sync.board_id());
            false
        }
    }

    fn persist(&mut self, kind: SaveKind) {
        let state = self.board.board().clone();
        self.last_save = Some(pollster::block_on(self.sync.commit(kind, &state)));
    }

    // --- Rendering ---

    /// Redraw the whole surface from the board. Errors are logged.
    pub fn redraw(&mut self) {
        let ctx = RenderContext::new(
            self.board.history(),
            self.board.text_boxes(),
            self.config.canvas_width,
            self.config.canvas_height,
        )
        .with_selection(self.board.selected())
        .with_background(self.config.background_color());

        if let Err(e) = self.renderer.render(&ctx) {
            log::error!("Failed to render board: {}", e);
        }
    }

    /// Current pixels as PNG bytes. The board is not touched.
    pub fn export_png(&mut self) -> SessionResult<Vec<u8>> {
        self.redraw();
        Ok(self.renderer.encode_png()?)
    }

    /// Write `whiteboard-YYYY-MM-DD.png` into the export directory.
    pub fn export_image(&mut self) -> SessionResult<PathBuf> {
        let png = self.export_png()?;
        let date = chrono::Utc::now().date_naive();
        Ok(write_export(&self.config.export_dir, date, &png)?)
    }
}

/// The configured font, else the embedded one, else estimated metrics only.
fn load_text(config: &WhiteboardConfig) -> TextRasterizer {
    if let Some(path) = &config.font_path {
        match TextRasterizer::from_file(path) {
            Ok(text) => return text,
            Err(e) => log::warn!("Falling back to the bundled font: {}", e),
        }
    }
    TextRasterizer::bundled().unwrap_or_else(|e| {
        log::error!("Failed to load the bundled font, text will not be drawn: {}", e);
        TextRasterizer::without_font()
    })
}
