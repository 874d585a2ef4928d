//! Cafeboard Core Library
//!
//! Data model, input handling and synchronization for the shared café planning
//! whiteboard. Rendering lives in `cafeboard-render`.

pub mod action;
pub mod board;
pub mod canvas;
pub mod collaboration;
pub mod color;
pub mod input;
pub mod protocol;
pub mod records;
pub mod storage;
pub mod text_box;
pub mod text_metrics;
pub mod tools;

pub use action::{DrawingAction, History, HistoryError, RasterInstruction, StrokeData};
pub use board::{BoardState, SHARED_BOARD_ID, now_millis};
pub use canvas::{DEFAULT_TEXT_ORIGIN, PointerResult, Whiteboard};
pub use collaboration::{RemoteUpdate, SaveKind, SaveOutcome, SyncCoordinator};
pub use input::{CommitReason, InputController, InputOutcome, PointerEvent, TextCommit};
pub use storage::{
    BoardStore, BoardSubscription, ConnectionState, FileBoardStore, MemoryBoardStore,
    RemoteBoardStore, StoreError, StoreResult, SubscriptionEvent,
};
pub use text_box::{TextBox, TextBoxes};
pub use text_metrics::{ApproximateMeasure, TextMeasure};
pub use tools::{ToolMode, ToolSettings};
