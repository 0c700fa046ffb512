use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::agent::ParserConfig;

pub const CONFIG_DIR_ENV: &str = "COMPUTER_AGENT_CONFIG_DIR";

/// Places a parser config named `relative_path` may live, most specific first:
/// `$COMPUTER_AGENT_CONFIG_DIR`, the working directory, then the repo's `config/`.
pub fn search_path(relative_path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        candidates.push(PathBuf::from(dir).join(relative_path));
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(relative_path));
    }
    // crates/agent-core sits two levels below the repo root.
    if let Some(root) = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2) {
        candidates.push(root.join("config").join(relative_path));
    }
    candidates
}

impl ParserConfig {
    /// Loads the first matching file on the search path; omitted keys keep their defaults.
    pub fn load(relative_path: &str) -> anyhow::Result<Self> {
        let path = search_path(Path::new(relative_path))
            .into_iter()
            .find(|candidate| candidate.is_file())
            .with_context(|| format!("parser config {relative_path:?} not found"))?;
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read parser config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parser config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid parser config TOML")
    }
}
