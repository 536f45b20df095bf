use std::path::{Path, PathBuf};

use dirs::config_dir;

pub const CONFIG_FILE: &str = "configuration.json";

/// Places a configuration file is looked for, most specific first.
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(base) = config_dir() {
        candidates.push(base.join("setlist-export").join(CONFIG_FILE));
    }
    candidates
}

/// First candidate that exists, or the first candidate so errors name a path.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    let candidates = config_candidates(explicit);
    candidates
        .iter()
        .find(|path| path.is_file())
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Creates the output directory when it is missing.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path)
}
