//! Editor context, command registry, and the legacy key table.
//!
//! Process-wide state lives in one [`Editor`] threaded explicitly into every
//! command (`fn(&mut Editor, bool, i64) -> Result<bool>`); there are no
//! globals. The registry is a flat name-to-function table and doubles as the
//! sole surface a scripting collaborator resolves command names against.

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

use core_config::Config;
use core_events::key::{CONTROL, CTLX, META, SPEC};
use core_events::{InputToken, Result, Status};
use core_keymap::{CommandId, KeymapSet, LegacyBinding, MapId};
use core_model::WindowSet;
use core_render::Renderer;
use core_state::{BufferFlags, BufferId, BufferSet, KillRing};
use core_terminal::{Capabilities, TerminalSurface};

pub mod dispatcher;
pub mod hooks;
pub mod io_ops;

pub use hooks::{HookContext, HookPhase, HookResult, HookSystem};
pub use io_ops::{Clipboard, FileIo, MemoryClipboard, MemoryFileIo, NullClipboard};

pub type CommandFn = fn(&mut Editor, bool, i64) -> Result<bool>;

/// Flat name-to-entry-point table; [`CommandId`] indexes into it.
pub struct CommandRegistry {
    entries: Vec<(&'static str, CommandFn)>,
}

impl CommandRegistry {
    pub fn builtin() -> Self {
        use dispatcher::{buffers, edit, motion, region, search};
        let entries: Vec<(&'static str, CommandFn)> = vec![
            ("abort-command", edit::abort_command),
            ("backward-character", motion::backward_character),
            ("backward-word", motion::backward_word),
            ("beginning-of-file", motion::beginning_of_file),
            ("beginning-of-line", motion::beginning_of_line),
            ("buffer-position", buffers::buffer_position),
            ("copy-region", region::copy_region),
            ("delete-next-character", edit::delete_next_character),
            ("delete-next-word", edit::delete_next_word),
            ("delete-previous-character", edit::delete_previous_character),
            ("end-of-file", motion::end_of_file),
            ("end-of-line", motion::end_of_line),
            ("exchange-dot-and-mark", region::exchange_dot_and_mark),
            ("forward-character", motion::forward_character),
            ("forward-word", motion::forward_word),
            ("goto-line", motion::goto_line),
            ("kill-buffer", buffers::kill_buffer),
            ("kill-region", region::kill_region),
            ("kill-to-end-of-line", edit::kill_to_end_of_line),
            ("list-buffers", buffers::list_buffers),
            ("newline", edit::newline),
            ("next-buffer", buffers::next_buffer),
            ("next-line", motion::next_line),
            ("next-window", buffers::next_window),
            ("only-window", buffers::only_window),
            ("previous-line", motion::previous_line),
            ("quit", buffers::quit),
            ("redo", edit::redo),
            ("refresh-screen", buffers::refresh_screen),
            ("save-file", buffers::save_file),
            ("search-forward", search::search_forward),
            ("search-reverse", search::search_reverse),
            ("set-mark", motion::set_mark),
            ("split-window", buffers::split_window),
            ("undo", edit::undo),
            ("yank", edit::yank),
            ("yank-clipboard", edit::yank_clipboard),
            ("yank-pop", edit::yank_pop),
        ];
        Self { entries }
    }

    pub fn id_of(&self, name: &str) -> Option<CommandId> {
        self.entries
            .iter()
            .position(|(n, _)| *n == name)
            .map(|i| CommandId(i as u16))
    }

    pub fn get(&self, id: CommandId) -> Option<(&'static str, CommandFn)> {
        self.entries.get(id.0 as usize).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Historical default bindings: command name and legacy-encoded key code.
/// CTLX/META bits route entries into the prefix maps at import time; letters
/// after a prefix are spelled uppercase because dispatch upcases them.
pub const KEYTAB: &[(&str, u32)] = &[
    ("abort-command", CONTROL | 'G' as u32),
    ("backward-character", CONTROL | 'B' as u32),
    ("backward-character", SPEC | 'D' as u32),
    ("backward-word", META | 'B' as u32),
    ("beginning-of-file", META | '<' as u32),
    ("beginning-of-line", CONTROL | 'A' as u32),
    ("buffer-position", CTLX | '=' as u32),
    ("copy-region", META | 'W' as u32),
    ("delete-next-character", CONTROL | 'D' as u32),
    ("delete-next-word", META | 'D' as u32),
    ("delete-previous-character", 0x7F),
    ("end-of-file", META | '>' as u32),
    ("end-of-line", CONTROL | 'E' as u32),
    ("exchange-dot-and-mark", CTLX | CONTROL | 'X' as u32),
    ("forward-character", CONTROL | 'F' as u32),
    ("forward-character", SPEC | 'C' as u32),
    ("forward-word", META | 'F' as u32),
    ("goto-line", META | 'G' as u32),
    ("kill-buffer", CTLX | 'K' as u32),
    ("kill-region", CONTROL | 'W' as u32),
    ("kill-to-end-of-line", CONTROL | 'K' as u32),
    ("list-buffers", CTLX | CONTROL | 'B' as u32),
    ("newline", CONTROL | 'M' as u32),
    ("next-buffer", CTLX | 'X' as u32),
    ("next-line", CONTROL | 'N' as u32),
    ("next-line", SPEC | 'B' as u32),
    ("next-window", CTLX | 'O' as u32),
    ("only-window", CTLX | '1' as u32),
    ("previous-line", CONTROL | 'P' as u32),
    ("previous-line", SPEC | 'A' as u32),
    ("quit", CTLX | CONTROL | 'C' as u32),
    ("redo", CTLX | 'R' as u32),
    ("refresh-screen", CONTROL | 'L' as u32),
    ("save-file", CTLX | CONTROL | 'S' as u32),
    ("search-forward", CONTROL | 'S' as u32),
    ("search-reverse", CONTROL | 'R' as u32),
    ("set-mark", CONTROL | '@' as u32),
    ("split-window", CTLX | '2' as u32),
    ("undo", CONTROL | '_' as u32),
    ("undo", CTLX | 'U' as u32),
    ("yank", CONTROL | 'Y' as u32),
    ("yank-clipboard", CTLX | 'Y' as u32),
    ("yank-pop", META | 'Y' as u32),
];

pub struct Editor {
    pub buffers: BufferSet,
    pub windows: WindowSet,
    pub keymaps: KeymapSet,
    pub hooks: HookSystem,
    pub kill_ring: KillRing,
    pub renderer: Renderer,
    pub registry: CommandRegistry,
    pub clipboard: Box<dyn Clipboard>,
    pub file_io: Box<dyn FileIo>,
    pub config: Config,
    message: Option<String>,
    /// Rendering is deferred while this is non-zero; writes queue in the
    /// matrix and flush when the transaction closes.
    edit_transaction_depth: AtomicU32,
    /// Prefix map the next key resolves against (C-x, Meta, C-h walking).
    pub(crate) pending_map: Option<MapId>,
    /// True while consecutive kill commands append into one ring slot.
    pub(crate) kill_chaining: bool,
    pub search_pattern: Vec<u8>,
    pub quit_requested: bool,
}

impl Editor {
    pub fn new(rows: u16, cols: u16, config: Config) -> Result<Self> {
        let mut buffers = BufferSet::new();
        let main = buffers.find("main", true, BufferFlags::empty())?;
        buffers.switch(main, None)?;
        let registry = CommandRegistry::builtin();

        let mut keymaps = KeymapSet::new();
        let legacy: Vec<LegacyBinding> = KEYTAB
            .iter()
            .filter_map(|&(name, code)| {
                let command = registry.id_of(name)?;
                Some(LegacyBinding {
                    name,
                    code,
                    command,
                })
            })
            .collect();
        keymaps.install_legacy(&legacy);

        let mut renderer = Renderer::new(rows, cols, Capabilities::default())?;
        renderer.set_scroll_count(config.file.display.scroll_count);
        renderer.set_tab_width(config.effective_tab_width);

        let mut editor = Self {
            windows: WindowSet::new(main, rows.saturating_sub(1)),
            buffers,
            keymaps,
            hooks: HookSystem::new(),
            kill_ring: KillRing::new(),
            renderer,
            registry,
            clipboard: Box::new(NullClipboard),
            file_io: Box::new(MemoryFileIo::default()),
            config,
            message: None,
            edit_transaction_depth: AtomicU32::new(0),
            pending_map: None,
            kill_chaining: false,
            search_pattern: Vec::new(),
            quit_requested: false,
        };
        editor.apply_undo_config(main);
        info!(target: "actions.dispatch", rows, cols, "editor_initialised");
        Ok(editor)
    }

    /// Push the configured undo grouping window into a buffer's log.
    pub fn apply_undo_config(&mut self, id: BufferId) {
        let window = std::time::Duration::from_millis(self.config.effective_group_window_ms);
        if let Ok(buf) = self.buffers.get_mut(id) {
            buf.undo_log_mut().set_group_window(window);
        }
    }

    /// Buffer shown in the current window.
    pub fn current_buffer_id(&self) -> BufferId {
        self.windows.current().buffer
    }

    pub fn set_message(&mut self, text: impl Into<String>) {
        self.message = Some(text.into());
    }

    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    // ---------------------------------------------------------------------------------------------
    // Edit transactions
    // ---------------------------------------------------------------------------------------------

    pub fn begin_edit_transaction(&self) {
        self.edit_transaction_depth.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end_edit_transaction(&self) {
        let prev = self.edit_transaction_depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0);
    }

    pub fn in_edit_transaction(&self) -> bool {
        self.edit_transaction_depth.load(Ordering::Acquire) > 0
    }

    // ---------------------------------------------------------------------------------------------
    // Main-loop entry points
    // ---------------------------------------------------------------------------------------------

    /// Feed one decoded input token through keymaps, hooks, and the command.
    pub fn handle_token(&mut self, token: InputToken) -> Result<bool> {
        dispatcher::dispatch_token(self, token)
    }

    /// Render a frame unless an edit transaction is open. The message line
    /// occupies the bottom matrix row, outside every window.
    pub fn render(&mut self, surface: &mut dyn TerminalSurface, force: bool) -> Result<()> {
        if !force && self.in_edit_transaction() {
            debug!(target: "actions.dispatch", "render_deferred_in_transaction");
            return Ok(());
        }
        if let Some(msg) = self.message.clone() {
            let row = self.renderer.matrix.rows() - 1;
            let end = self.renderer.matrix.render_text(
                row,
                0,
                &msg,
                core_render::matrix::ATTR_NORMAL,
                core_render::matrix::COLOR_DEFAULT,
                core_render::matrix::COLOR_DEFAULT,
            );
            for col in end..self.renderer.matrix.cols() {
                self.renderer.matrix.clear_cell(row, col);
            }
        }
        self.renderer
            .update(&mut self.windows, &mut self.buffers, surface, force)
    }

    /// Terminal size changed: resize the matrix, re-lay out windows, repaint.
    pub fn handle_resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.renderer.resize(rows, cols)?;
        self.windows.relayout(self.renderer.matrix.rows().saturating_sub(1));
        self.renderer.matrix.mark_all_dirty();
        info!(target: "actions.dispatch", rows, cols, "resized");
        Ok(())
    }

    /// Resolve a command by name, for the scripting collaborator.
    pub fn run_named(&mut self, name: &str, prefix: bool, count: i64) -> Result<bool> {
        let id = self.registry.id_of(name).ok_or(Status::CommandUnknown)?;
        dispatcher::execute_command(self, id, prefix, count)
    }
}
