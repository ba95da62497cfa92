//! TOML configuration.
//!
//! Every key has a default, so a missing config file is not an error: the
//! CLI falls back to [`Config::default`]. A file that exists is parsed
//! strictly and validated by [`load_config`].
//!
//! ```toml
//! [chunking]
//! chunk_size = 32000
//!
//! [checkpoints]
//! max_checkpoints = 10
//! auto_checkpoint = true
//!
//! [diff]
//! delete_scope = "all_matching"   # or "nearest_after_anchor"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use lesson_harness_core::chunk::DEFAULT_CHUNK_SIZE;
use lesson_harness_core::checkpoint::DEFAULT_MAX_CHECKPOINTS;
use lesson_harness_core::diff::DeleteScope;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub checkpoints: CheckpointConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    /// Take a checkpoint after every successful mutating tool call.
    #[serde(default = "default_auto_checkpoint")]
    pub auto_checkpoint: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_checkpoints: default_max_checkpoints(),
            auto_checkpoint: default_auto_checkpoint(),
        }
    }
}

fn default_max_checkpoints() -> usize {
    DEFAULT_MAX_CHECKPOINTS
}
fn default_auto_checkpoint() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiffConfig {
    #[serde(default)]
    pub delete_scope: DeleteScope,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if it exists, otherwise return defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.checkpoints.max_checkpoints == 0 {
        anyhow::bail!("checkpoints.max_checkpoints must be > 0");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.checkpoints.max_checkpoints, DEFAULT_MAX_CHECKPOINTS);
        assert!(cfg.checkpoints.auto_checkpoint);
        assert_eq!(cfg.diff.delete_scope, DeleteScope::AllMatching);
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_full_config() {
        let cfg = parse_config(
            r#"
[chunking]
chunk_size = 500

[checkpoints]
max_checkpoints = 3
auto_checkpoint = false

[diff]
delete_scope = "nearest_after_anchor"

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.checkpoints.max_checkpoints, 3);
        assert!(!cfg.checkpoints.auto_checkpoint);
        assert_eq!(cfg.diff.delete_scope, DeleteScope::NearestAfterAnchor);
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = parse_config("[chunking]\nchunk_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_rejects_zero_max_checkpoints() {
        assert!(parse_config("[checkpoints]\nmax_checkpoints = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_scope() {
        assert!(parse_config("[diff]\ndelete_scope = \"everything\"\n").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config_or_default(Path::new("/definitely/not/here/lesson.toml")).unwrap();
        assert_eq!(cfg.chunking.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here/lesson.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
