//! Configuration loading and parsing.
//!
//! Parses `em.toml` from the working directory, falling back to the platform
//! config dir (`~/.config/em/em.toml` on Linux). Unknown fields are ignored
//! so older binaries tolerate newer files; a parse error falls back to
//! defaults rather than refusing to start. Raw values are retained and
//! clamped into effective values at apply time, with clamps logged under the
//! `config` target.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct UndoConfig {
    /// Auto-grouping window for consecutive keystrokes, in milliseconds.
    #[serde(default = "UndoConfig::default_group_window_ms")]
    pub group_window_ms: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            group_window_ms: Self::default_group_window_ms(),
        }
    }
}

impl UndoConfig {
    const fn default_group_window_ms() -> u64 {
        400
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Lines scrolled on a gentle reframe past the window edge.
    #[serde(default = "DisplayConfig::default_scroll_count")]
    pub scroll_count: usize,
    #[serde(default = "DisplayConfig::default_tab_width")]
    pub tab_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            scroll_count: Self::default_scroll_count(),
            tab_width: Self::default_tab_width(),
        }
    }
}

impl DisplayConfig {
    const fn default_scroll_count() -> usize {
        1
    }
    const fn default_tab_width() -> usize {
        8
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// ASCII case folding for searches by default.
    #[serde(default = "SearchConfig::default_case_fold")]
    pub case_fold: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_fold: Self::default_case_fold(),
        }
    }
}

impl SearchConfig {
    const fn default_case_fold() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file: ConfigFile,
    /// Clamped grouping window actually handed to the undo engine.
    pub effective_group_window_ms: u64,
    pub effective_tab_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            file: ConfigFile::default(),
            effective_group_window_ms: 0,
            effective_tab_width: 0,
        };
        config.apply_clamps();
        config
    }
}

/// Best-effort config path: local `em.toml` first, then platform conventions.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("em.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("em").join("em.toml");
    }
    PathBuf::from("em.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let mut config = if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Config {
                file,
                ..Config::default()
            },
            Err(_) => Config::default(),
        }
    } else {
        Config::default()
    };
    config.apply_clamps();
    Ok(config)
}

impl Config {
    /// Clamp raw values into their supported ranges.
    pub fn apply_clamps(&mut self) {
        let raw = self.file.undo.group_window_ms;
        self.effective_group_window_ms = raw.min(5000);
        if self.effective_group_window_ms != raw {
            info!(
                target: "config",
                raw,
                clamped = self.effective_group_window_ms,
                "undo_group_window_clamped"
            );
        }
        let raw = self.file.display.tab_width;
        self.effective_tab_width = raw.clamp(1, 16);
        if self.effective_tab_width != raw {
            info!(
                target: "config",
                raw,
                clamped = self.effective_tab_width,
                "tab_width_clamped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_when_file_missing() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_em__.toml"))).unwrap();
        assert_eq!(cfg.effective_group_window_ms, 400);
        assert_eq!(cfg.effective_tab_width, 8);
        assert_eq!(cfg.file.display.scroll_count, 1);
        assert!(cfg.file.search.case_fold);
    }

    #[test]
    fn parses_and_clamps_values() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[undo]\ngroup_window_ms = 9000\n[display]\ntab_width = 40\nscroll_count = 3\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective_group_window_ms, 5000);
        assert_eq!(cfg.effective_tab_width, 16);
        assert_eq!(cfg.file.display.scroll_count, 3);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not [valid toml ===").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective_group_window_ms, 400);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[undo]\ngroup_window_ms = 250\nfuture_key = true\n")
            .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective_group_window_ms, 250);
    }
}
