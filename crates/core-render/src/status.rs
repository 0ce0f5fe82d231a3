//! Mode-line formatting.
//!
//! One line per window, rendered in reverse video by the composer. Fields:
//! changed flag, program name and version, buffer name, active modes,
//! filename, then right-aligned cursor/statistics and the Top/Bot/percentage
//! position marker, padded with the line character and truncated at the
//! terminal edge.

use core_state::{Buffer, MODE_NAMES};

pub const PROGRAM_NAME: &str = "em";
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the window sits in its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPosition {
    All,
    Top,
    Bottom,
    Percent(u8),
}

impl BufferPosition {
    pub fn compute(top_line: usize, text_rows: usize, total_lines: usize) -> Self {
        let top_visible = top_line == 0;
        let bottom_visible = top_line + text_rows >= total_lines;
        match (top_visible, bottom_visible) {
            (true, true) => Self::All,
            (true, false) => Self::Top,
            (false, true) => Self::Bottom,
            (false, false) => {
                let pct = (top_line * 100) / total_lines.max(1);
                Self::Percent(pct.min(99) as u8)
            }
        }
    }

    fn render(self) -> String {
        match self {
            Self::All => " All ".into(),
            Self::Top => " Top ".into(),
            Self::Bottom => " Bot ".into(),
            Self::Percent(p) => format!(" {p:2}% "),
        }
    }
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}B")
    }
}

/// Render the mode line for one window into a width-exact string.
pub fn format_mode_line(
    buffer: &Buffer,
    cursor_line: usize,
    cursor_col: usize,
    position: BufferPosition,
    width: usize,
) -> String {
    let lchar = '-';
    let mut line = String::with_capacity(width);
    line.push(lchar);
    line.push(if buffer.is_changed() { '*' } else { lchar });

    line.push_str(&format!(" {PROGRAM_NAME} {PROGRAM_VERSION}: "));
    line.push_str(&buffer.name);

    let modes: Vec<&str> = MODE_NAMES
        .iter()
        .filter(|(flag, _)| buffer.modes.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
    if !modes.is_empty() {
        line.push_str(" (");
        line.push_str(&modes.join(" "));
        line.push(')');
    }
    if !buffer.filename.is_empty() && buffer.filename != buffer.name {
        line.push(' ');
        line.push_str(&buffer.filename);
    }

    let (total_lines, bytes, words) = buffer.statistics();
    let info = format!(
        " C{} L{}/{} {} W{} ",
        cursor_col + 1,
        cursor_line + 1,
        total_lines,
        human_size(bytes),
        words
    );
    let marker = position.render();

    // Right-align info + marker, padding the middle with the line character.
    let used = line.chars().count();
    let tail = info.chars().count() + marker.chars().count();
    if used + tail < width {
        line.extend(std::iter::repeat_n(lchar, width - used - tail));
        line.push_str(&info);
        line.push_str(&marker);
    } else {
        // Oversize: truncate at the edge rather than overflow.
        line.push_str(&info);
        line.push_str(&marker);
    }
    let mut out: String = line.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(lchar);
    }
    out
}
