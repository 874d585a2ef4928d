//! Toolbar commands and their keyboard shortcuts.

use cafeboard_core::ToolMode;
use std::path::PathBuf;

/// A discrete toolbar action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetMode(ToolMode),
    SetColor(String),
    SetStrokeWidth(f64),
    SetFontSize(f64),
    /// Remove the last drawing action.
    Undo,
    /// Wipe strokes and text boxes.
    Clear,
    DeleteSelected,
    /// Abandon the open text session.
    CancelText,
    /// Write the current board as a PNG file.
    ExportImage,
}

impl Command {
    /// Whether the command can change the board document.
    pub fn mutates_board(&self) -> bool {
        matches!(self, Command::Undo | Command::Clear | Command::DeleteSelected)
    }
}

/// What a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The command took effect.
    Applied,
    /// Nothing to do (empty history, no selection, blocked mode switch).
    Ignored,
    /// The image was written here.
    Exported(PathBuf),
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub ctrl: bool,
    pub command: Command,
    pub description: &'static str,
}

impl Shortcut {
    pub fn new(key: &'static str, ctrl: bool, command: Command, description: &'static str) -> Self {
        Self {
            key,
            ctrl,
            command,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Z").
    pub fn format(&self) -> String {
        if self.ctrl {
            format!("Ctrl+{}", self.key)
        } else {
            self.key.to_string()
        }
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    /// Get all registered shortcuts.
    pub fn all() -> Vec<Shortcut> {
        vec![
            Shortcut::new("D", false, Command::SetMode(ToolMode::Draw), "Draw mode"),
            Shortcut::new("T", false, Command::SetMode(ToolMode::Text), "Text mode"),
            Shortcut::new("Z", true, Command::Undo, "Undo"),
            Shortcut::new("E", true, Command::ExportImage, "Export to PNG"),
            Shortcut::new("Delete", false, Command::DeleteSelected, "Delete selected text"),
            Shortcut::new("Backspace", false, Command::DeleteSelected, "Delete selected text"),
            Shortcut::new("Escape", false, Command::CancelText, "Cancel text entry"),
        ]
    }

    /// Command bound to a key, matched case-insensitively.
    pub fn lookup(key: &str, ctrl: bool) -> Option<Command> {
        Self::all()
            .into_iter()
            .find(|s| s.ctrl == ctrl && s.key.eq_ignore_ascii_case(key))
            .map(|s| s.command)
    }

    /// One line per shortcut, for a help overlay.
    pub fn describe() -> Vec<String> {
        Self::all()
            .iter()
            .map(|s| format!("{:12} {}", s.format(), s.description))
            .collect()
    }
}
