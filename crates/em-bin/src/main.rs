//! em: terminal wiring around the editor core.
//!
//! Everything interesting lives in the core crates; this binary owns the
//! process concerns: raw mode and bracketed paste, logging to a file (the
//! screen belongs to the editor), the blocking read loop, and resize pickup
//! between commands.

mod terminal;

use anyhow::{Context, Result};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::execute;
use std::io::stdout;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use core_actions::Editor;
use core_input::InputDecoder;
use core_terminal::TerminalSurface;
use terminal::{CrosstermSurface, StdinSource};

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("EM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let file = tracing_appender::rolling::never(".", "em.log");
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        execute!(stdout(), EnterAlternateScreen, EnableBracketedPaste)
            .context("enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), DisableBracketedPaste, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn main() -> Result<()> {
    let _log_guard = init_logging();
    let config = core_config::load_from(None).context("load configuration")?;
    let (cols, rows) = crossterm::terminal::size().context("query terminal size")?;

    let _raw = RawModeGuard::enter()?;
    let mut surface = CrosstermSurface::new(rows, cols);
    let mut editor = Editor::new(rows, cols, config)?;
    editor
        .renderer
        .set_capabilities(CrosstermSurface::capabilities());

    let mut decoder = InputDecoder::new();
    let mut source = StdinSource::new();
    editor.render(&mut surface, true)?;
    info!(target: "main", rows, cols, "entering edit loop");

    while !editor.quit_requested {
        let Some(token) = decoder.next_token(&mut source) else {
            break; // stdin closed
        };
        if let Err(status) = editor.handle_token(token) {
            // The dispatcher messages most failures itself; anything that
            // escapes still must not take the editor down.
            error!(target: "main", %status, "command failure escaped dispatcher");
            editor.set_message(status.to_string());
        }

        // Between commands: pick up terminal resizes (flag-equivalent path;
        // the size query is cheap and signal-safe handling lives here, not
        // in the core).
        if let Ok((new_cols, new_rows)) = crossterm::terminal::size()
            && (new_rows, new_cols) != (surface.rows(), surface.cols())
        {
            surface.set_size(new_rows, new_cols);
            editor.handle_resize(new_rows, new_cols)?;
        }

        if !editor.in_edit_transaction() {
            editor.render(&mut surface, false)?;
        }
    }

    info!(target: "main", "edit loop finished");
    Ok(())
}
