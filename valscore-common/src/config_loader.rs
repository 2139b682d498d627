//! Modular configuration loader.
//!
//! Supports loading configuration from multiple files:
//! - `config.json` - Core configuration
//! - `regimes.json` - Per-sector (r, b) defaults, merged into `regime.sectors`
//! - `calibration.json` - Tier targets and drift settings, merged into `calibration`
//!
//! Files are loaded from `~/.valscore/` with deep merging.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// Configuration file names
pub const CONFIG_FILES: &[&str] = &["config.json", "regimes.json", "calibration.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if the file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_json(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Merge `module` under `config[section][key]` (or `config[section]` when `key` is None).
fn merge_section(config: &mut Value, section: &str, key: Option<&str>, module: Value) {
    let Some(config_obj) = config.as_object_mut() else {
        return;
    };

    let parent = config_obj
        .entry(section)
        .or_insert(Value::Object(Default::default()));

    let slot = match key {
        Some(key) => match parent.as_object_mut() {
            Some(parent_obj) => parent_obj
                .entry(key)
                .or_insert(Value::Object(Default::default())),
            None => return,
        },
        None => parent,
    };

    merge_json(slot, module);
}

/// Strip meta fields like `$schema` or `_comment` from a module file.
fn strip_meta(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.starts_with('_'))
                .collect(),
        ),
        other => other,
    }
}

/// Load modular configuration from the config directory.
///
/// Priority (lowest to highest):
/// 1. config.json
/// 2. Modular files (regimes.json, calibration.json)
/// 3. Environment variables (applied separately)
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    let mut config =
        load_json_file(&cfg_dir.join("config.json"))?.unwrap_or(Value::Object(Default::default()));

    tracing::debug!("Loading modular config from {}", cfg_dir.display());

    if let Some(regimes) = load_json_file(&cfg_dir.join("regimes.json"))? {
        merge_section(&mut config, "regime", Some("sectors"), strip_meta(regimes));
        tracing::debug!("Loaded regimes.json");
    }

    if let Some(calibration) = load_json_file(&cfg_dir.join("calibration.json"))? {
        merge_section(&mut config, "calibration", None, strip_meta(calibration));
        tracing::debug!("Loaded calibration.json");
    }

    Ok(config)
}

/// Check which modular config files exist.
pub fn check_modular_files(dir: Option<PathBuf>) -> Vec<(String, bool)> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    CONFIG_FILES
        .iter()
        .map(|file| (file.to_string(), cfg_dir.join(file).exists()))
        .collect()
}
