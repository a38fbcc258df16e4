//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.ringmaster/config.toml` (or the path in `RINGMASTER_CONFIG`)
//! 2. Apply `RINGMASTER_*` environment variable overrides
//! 3. Fall back to [`RingmasterConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp` → fsync → rename to `<path>` to avoid partial
//! writes corrupting the config file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use super::schema::RingmasterConfig;

// ─── default_config_path ─────────────────────────────────────────────────────

/// Return the default config file path: `~/.ringmaster/config.toml`.
pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|h| h.join(".ringmaster").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

// ─── load_config ─────────────────────────────────────────────────────────────

/// Load [`RingmasterConfig`] from the given path, falling back to defaults if
/// the file does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<RingmasterConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<RingmasterConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RingmasterConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from the default path (or `RINGMASTER_CONFIG`).
pub fn load_default_config() -> RingmasterConfig {
    let path = env::var("RINGMASTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));

    load_config(&path).unwrap_or_default()
}

// ─── save_config ─────────────────────────────────────────────────────────────

/// Atomically write `config` to `path` (tmp file + rename).
pub fn save_config(config: &RingmasterConfig, path: &Path) -> Result<(), String> {
    let text =
        toml::to_string_pretty(config).map_err(|e| format!("failed to serialize config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create config directory {parent:?}: {e}"))?;
    }

    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, text).map_err(|e| format!("failed to write {tmp:?}: {e}"))?;
    fs::rename(&tmp, path).map_err(|e| format!("failed to rename {tmp:?} → {path:?}: {e}"))
}

// ─── apply_env_overrides ─────────────────────────────────────────────────────

/// Apply `RINGMASTER_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `RINGMASTER_MODEL`              → `agent.default_model`
/// - `RINGMASTER_MAX_TOOL_CALLS`     → `agent.max_tool_calls`
/// - `RINGMASTER_MAX_CONCURRENT`     → `agent.max_concurrent_requests`
/// - `RINGMASTER_RAG_ENABLED`        → `rag.enabled` (1/0)
/// - `RINGMASTER_IDEMPOTENCY_ENABLED`→ `idempotency.enabled` (1/0)
fn apply_env_overrides(config: &mut RingmasterConfig) {
    if let Ok(v) = env::var("RINGMASTER_MODEL") {
        config.agent.default_model = v;
    }
    if let Ok(v) = env::var("RINGMASTER_MAX_TOOL_CALLS")
        && let Ok(n) = v.parse()
    {
        config.agent.max_tool_calls = n;
    }
    if let Ok(v) = env::var("RINGMASTER_MAX_CONCURRENT")
        && let Ok(n) = v.parse()
    {
        config.agent.max_concurrent_requests = n;
    }
    if let Ok(v) = env::var("RINGMASTER_RAG_ENABLED") {
        config.rag.enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = env::var("RINGMASTER_IDEMPOTENCY_ENABLED") {
        config.idempotency.enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
}
