//! Runtime settings toggled from the settings panel.
//!
//! The backing file is a flat `key = value` list. It is re-read on every
//! guardian cycle, so edits take effect without a restart. Reads never fail:
//! anything missing or malformed falls back to the documented default.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_GUARD_ENABLED: bool = false;
pub const DEFAULT_WARNING_DELAY_SECS: u64 = 5;
pub const DEFAULT_LOCK_DELAY_SECS: u64 = 30;
pub const DEFAULT_THRESHOLD: f32 = 0.55;
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;
/// Longest authentication attempt accepted from configuration.
pub const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub guard_enabled: bool,
    pub warning_delay: Duration,
    pub lock_delay: Duration,
    /// Maximum match distance, lower is stricter.
    pub threshold: f32,
    /// Wall-clock budget of a single authentication attempt.
    pub timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            guard_enabled: DEFAULT_GUARD_ENABLED,
            warning_delay: Duration::from_secs(DEFAULT_WARNING_DELAY_SECS),
            lock_delay: Duration::from_secs(DEFAULT_LOCK_DELAY_SECS),
            threshold: DEFAULT_THRESHOLD,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RuntimeConfig {
    /// Build a snapshot from raw key/value pairs, defaulting per key.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = pairs.get("guard_enabled") {
            match parse_bool(raw) {
                Some(v) => config.guard_enabled = v,
                None => tracing::warn!("Ignoring malformed guard_enabled value {:?}", raw),
            }
        }
        if let Some(secs) = parse_seconds(pairs, "guard_warning_delay") {
            config.warning_delay = secs;
        }
        if let Some(secs) = parse_seconds(pairs, "guard_lock_delay") {
            config.lock_delay = secs;
        }
        if let Some(raw) = pairs.get("threshold") {
            match raw.parse::<f32>() {
                Ok(v) if v > 0.0 && v < 1.0 => config.threshold = v,
                _ => tracing::warn!("Ignoring threshold {:?}, must lie in (0, 1)", raw),
            }
        }
        if let Some(secs) = parse_seconds(pairs, "timeout") {
            if secs.is_zero() || secs > Duration::from_secs(MAX_TIMEOUT_SECS) {
                tracing::warn!("Ignoring timeout {:?}, must lie in 1..={}s", secs, MAX_TIMEOUT_SECS);
            } else {
                config.timeout = secs;
            }
        }

        if config.lock_delay < config.warning_delay {
            tracing::warn!(
                "guard_lock_delay ({:?}) shorter than guard_warning_delay ({:?}), raising it",
                config.lock_delay,
                config.warning_delay
            );
            config.lock_delay = config.warning_delay;
        }

        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_seconds(pairs: &HashMap<String, String>, key: &str) -> Option<Duration> {
    let raw = pairs.get(key)?;
    match raw.parse::<u64>() {
        Ok(v) => Some(Duration::from_secs(v)),
        Err(_) => {
            tracing::warn!("Ignoring malformed {} value {:?}", key, raw);
            None
        }
    }
}

/// Parse `key = value` lines. Blank lines and `#` comments are skipped,
/// values may be quoted. Later keys override earlier ones.
pub fn parse_pairs(contents: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::debug!("Skipping config line without '=': {:?}", line);
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        pairs.insert(key.trim().to_string(), value.to_string());
    }
    pairs
}

/// Source of fresh runtime snapshots.
pub trait ConfigProvider {
    fn refresh(&self) -> RuntimeConfig;
}

/// Reads the settings file on every refresh.
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn refresh(&self) -> RuntimeConfig {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => RuntimeConfig::from_pairs(&parse_pairs(&contents)),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not read {}: {}", self.path.display(), e);
                }
                RuntimeConfig::default()
            }
        }
    }
}

/// Hands out a snapshot that can be swapped from outside, used when the
/// CLI overrides file settings and by tests that change settings mid-run.
#[derive(Clone, Default)]
pub struct StaticConfigProvider {
    current: Arc<Mutex<RuntimeConfig>>,
}

impl StaticConfigProvider {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            current: Arc::new(Mutex::new(config)),
        }
    }

    pub fn set(&self, config: RuntimeConfig) {
        if let Ok(mut current) = self.current.lock() {
            *current = config;
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn refresh(&self) -> RuntimeConfig {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("config.conf"));
        assert_eq!(provider.refresh(), RuntimeConfig::default());
    }

    #[test]
    fn test_reads_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.conf");
        std::fs::write(
            &path,
            "# settings\nguard_enabled = True\nguard_lock_delay=45\nguard_warning_delay = 10\nthreshold = 0.4\ntimeout = \"12\"\n",
        )
        .unwrap();

        let config = FileConfigProvider::new(path).refresh();
        assert_eq!(
            config,
            RuntimeConfig {
                guard_enabled: true,
                warning_delay: Duration::from_secs(10),
                lock_delay: Duration::from_secs(45),
                threshold: 0.4,
                timeout: Duration::from_secs(12),
            }
        );
    }

    #[test]
    fn test_malformed_values_fall_back_per_key() {
        let pairs = parse_pairs("guard_enabled = maybe\nguard_lock_delay = soon\nthreshold = 1.5\ntimeout = 20");
        let config = RuntimeConfig::from_pairs(&pairs);
        assert!(!config.guard_enabled);
        assert_eq!(config.lock_delay, Duration::from_secs(DEFAULT_LOCK_DELAY_SECS));
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_out_of_range_timeout_keeps_default() {
        for raw in ["0", "301", "18446744073709551615"] {
            let pairs = parse_pairs(&format!("timeout = {}", raw));
            let config = RuntimeConfig::from_pairs(&pairs);
            assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS), "timeout = {}", raw);
        }
        let pairs = parse_pairs("timeout = 300");
        assert_eq!(RuntimeConfig::from_pairs(&pairs).timeout, Duration::from_secs(MAX_TIMEOUT_SECS));
    }

    #[test]
    fn test_lock_delay_never_below_warning_delay() {
        let pairs = parse_pairs("guard_warning_delay = 40\nguard_lock_delay = 10");
        let config = RuntimeConfig::from_pairs(&pairs);
        assert_eq!(config.lock_delay, Duration::from_secs(40));
    }

    #[test]
    fn test_file_edits_are_picked_up_on_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.conf");
        std::fs::write(&path, "guard_enabled = false\n").unwrap();
        let provider = FileConfigProvider::new(path.clone());
        assert!(!provider.refresh().guard_enabled);

        std::fs::write(&path, "guard_enabled = true\n").unwrap();
        assert!(provider.refresh().guard_enabled);
    }

    #[test]
    fn test_static_provider_can_be_swapped() {
        let provider = StaticConfigProvider::new(RuntimeConfig::default());
        let handle = provider.clone();
        handle.set(RuntimeConfig {
            guard_enabled: true,
            ..RuntimeConfig::default()
        });
        assert!(provider.refresh().guard_enabled);
    }
}
