//! Single-key commands read from the terminal with crossterm.
//!
//! The terminal is in raw mode only while a poll is in progress, so log
//! lines and reports printed between polls render normally.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io;
use std::time::Duration;

/// How long one poll waits for a key before the next frame is captured.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartRecording,
    Quit,
    ShowReport,
    Capture,
}

/// Command bound to a key press, case-insensitive. Ctrl+C quits, since raw
/// mode turns it into an ordinary key.
pub fn command_for(key: &KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Command::Quit)
        }
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            's' => Some(Command::StartRecording),
            'q' => Some(Command::Quit),
            'r' => Some(Command::ShowReport),
            'c' => Some(Command::Capture),
            _ => None,
        },
        _ => None,
    }
}

/// Raw mode for as long as the guard lives.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

pub struct KeyInput {
    timeout: Duration,
}

impl KeyInput {
    /// Fails when there is no terminal to read keys from.
    pub fn open(timeout: Duration) -> io::Result<Self> {
        drop(RawMode::enable()?);
        Ok(Self { timeout })
    }

    /// Next bound key pressed within the timeout, if any.
    ///
    /// Losing the terminal yields `Quit`, since no other key can arrive.
    pub fn poll(&mut self) -> Option<Command> {
        match self.next_command() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "terminal input lost; quitting");
                Some(Command::Quit)
            }
        }
    }

    fn next_command(&self) -> io::Result<Option<Command>> {
        let _raw = RawMode::enable()?;
        while event::poll(self.timeout)? {
            if let Event::Key(key) = event::read()? {
                if let Some(command) = command_for(&key) {
                    return Ok(Some(command));
                }
                tracing::debug!(key = ?key.code, "ignoring unbound key");
            }
        }
        Ok(None)
    }
}
