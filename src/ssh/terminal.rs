use std::io;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};

/// Columns and rows used when the local terminal size cannot be read.
pub const DEFAULT_SIZE: (u16, u16) = (80, 24);

/// Raw-mode acquisition of the local terminal.
///
/// Raw mode is left again when the guard is restored or dropped, whichever
/// comes first.
pub struct RawTerminal {
    active: bool,
}

impl RawTerminal {
    pub fn acquire() -> io::Result<Self> {
        enable_raw_mode()?;
        debug!("terminal switched to raw mode");
        Ok(Self { active: true })
    }

    pub fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        debug!("terminal restored");
        Ok(())
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(error = %err, "failed to restore terminal");
        }
    }
}

/// Current `(cols, rows)` of the local terminal, or [`DEFAULT_SIZE`].
pub fn current_size() -> (u16, u16) {
    usable_size(crossterm::terminal::size().ok())
}

fn usable_size(probed: Option<(u16, u16)>) -> (u16, u16) {
    match probed {
        Some((cols, rows)) if cols > 0 && rows > 0 => (cols, rows),
        _ => DEFAULT_SIZE,
    }
}

/// Terminal type announced to the remote pty.
pub fn term_name(from_env: Option<String>) -> String {
    from_env
        .filter(|term| !term.trim().is_empty())
        .unwrap_or_else(|| "xterm".to_string())
}
