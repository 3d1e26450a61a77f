//! Config file location, load, and legacy-layout migration.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::types::MonitorConfig;

/// `--config` if given, otherwise `config.json` next to the executable.
pub fn resolve_config_path(path: Option<&str>) -> Result<PathBuf> {
    if let Some(p) = path {
        return Ok(PathBuf::from(p));
    }
    let exe_dir = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow!("Cannot determine executable directory"))?
        .to_path_buf();
    Ok(exe_dir.join("config.json"))
}

/// Rewrite the older `appsettings.json` layout (`Settings.HostSettings`,
/// PascalCase keys) into the current one. Returns `None` when `json`
/// is already in the current layout.
pub(crate) fn migrate_legacy_layout(json: &Value) -> Option<Value> {
    let legacy = json.get("Settings")?.as_object()?;
    let hosts = legacy.get("HostSettings")?.as_array()?;

    let mut settings = Map::new();
    for (old, new) in [
        ("PollingIntervalInSeconds", "polling_interval_secs"),
        ("RollingAverageNumberOfTemps", "rolling_average_window"),
        ("ManualModeFanPercentage", "manual_mode_fan_percentage"),
        ("BackToManualThresholdInSeconds", "back_to_manual_threshold_secs"),
    ] {
        if let Some(v) = legacy.get(old) {
            settings.insert(new.to_string(), v.clone());
        }
    }

    let field = |host: &Value, key: &str| host.get(key).cloned().unwrap_or(Value::Null);
    let text = |host: &Value, key: &str| host.get(key).and_then(Value::as_str).unwrap_or("").to_string();

    let hosts: Vec<Value> = hosts
        .iter()
        .map(|h| {
            let mut ipmi = json!({
                "host": text(h, "Host"),
                "user": text(h, "User"),
                "password": text(h, "Password"),
            });
            let tool = text(h, "PathToIpmiToolIfNotDefault");
            if !tool.trim().is_empty() {
                ipmi["ipmitool_path"] = Value::String(tool);
            }
            let mut host = json!({
                "name": text(h, "Name"),
                "source": h.get("Type").and_then(Value::as_str).unwrap_or("ipmi"),
                "ipmi": ipmi,
                "ssh": {
                    "host": text(h, "LMHost"),
                    "user": text(h, "LMUser"),
                    "password": text(h, "LMPassword"),
                },
                "temperature_pattern": legacy_pattern(&text(h, "Name"), text(h, "RegexToRetrieveTemp")),
            });
            let max = field(h, "MaxTempInC");
            if !max.is_null() {
                host["max_temp_c"] = max;
            }
            host
        })
        .collect();

    Some(json!({ "settings": settings, "hosts": hosts }))
}

/// Legacy patterns were written for an engine with variable-width
/// look-behind. A leading `(?<=P)R` becomes `(?:P)(R)`, which extracts the
/// same value; anything else is kept verbatim.
fn legacy_pattern(host: &str, pattern: String) -> String {
    match lift_leading_look_behind(&pattern) {
        Some(lifted) => {
            info!("{}: rewrote legacy temperature pattern {:?} as {:?}", host, pattern, lifted);
            lifted
        }
        None => pattern,
    }
}

fn lift_leading_look_behind(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix("(?<=")?;
    let close = group_end(body)?;
    let (prefix, rest) = (&body[..close], &body[close + 1..]);
    if rest.is_empty() || !is_single_branch_without_captures(rest) {
        return None;
    }
    Some(format!("(?:{})({})", prefix, rest))
}

/// Byte index of the `)` closing a group whose opening paren precedes `body`.
fn group_end(body: &str) -> Option<usize> {
    let mut depth = 1;
    let mut escaped = false;
    let mut in_class = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// No top-level `|` and no capturing (plain or named) groups.
fn is_single_branch_without_captures(pattern: &str) -> bool {
    let mut depth = 0;
    let mut escaped = false;
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '|' if depth == 0 => return false,
            '(' => {
                depth += 1;
                if chars.peek() != Some(&'?') {
                    return false;
                }
                let flags: String = chars.clone().take(3).collect();
                if flags.starts_with("?P<") || (flags.starts_with("?<") && !flags[2..].starts_with(['=', '!'])) {
                    return false;
                }
            }
            ')' => depth -= 1,
            _ => {}
        }
    }
    true
}

/// Parse config text (either layout) and validate it.
pub fn parse_config(content: &str, origin: &Path) -> Result<MonitorConfig> {
    let mut json: Value = serde_json::from_str(content)
        .with_context(|| format!("Failed to parse config JSON: {:?}", origin))?;

    if let Some(migrated) = migrate_legacy_layout(&json) {
        info!("Migrated legacy Settings/HostSettings layout from {:?} (see --show-config for the current layout)", origin);
        json = migrated;
    }

    let config: MonitorConfig = serde_json::from_value(json)
        .with_context(|| format!("Invalid configuration in {:?}", origin))?;
    config.validate()?;
    Ok(config)
}

pub async fn load_config(path: &Path) -> Result<MonitorConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    let config = parse_config(&content, path)?;
    info!("Loaded configuration for {} host(s) from: {:?}", config.hosts.len(), path);
    Ok(config)
}
