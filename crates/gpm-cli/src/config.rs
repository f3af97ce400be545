//! Arm configuration – reads/writes `~/.gpm/config.toml`.
//!
//! Every field has a default, so a partial file (or none at all) is valid:
//!
//! ```toml
//! debug = false
//!
//! [safety]
//! critical_voltage = 7.0
//! max_temperature = 60.0
//! max_current = 10.0
//! # min_charge_percentage = 10.0
//!
//! [control]
//! rate_hz = 100.0
//! safety_check_interval = 100
//!
//! [classifier]
//! inner_threshold = 450.0
//! outer_threshold = 450.0
//!
//! [grip_positions]
//! rest = [1500, 1500, 1500, 1500, 1500, 1500]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use gpm_hal::{GripPositions, ThresholdClassifier};
use gpm_kernel::SafetyLimits;
use gpm_runtime::ControlLoopConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log at `debug` when `RUST_LOG` is unset.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub safety: SafetyLimits,

    #[serde(default)]
    pub control: ControlLoopConfig,

    #[serde(default)]
    pub classifier: ThresholdClassifier,

    /// Per-channel servo targets.  A table given here replaces the built-in
    /// one entirely.
    #[serde(default)]
    pub grip_positions: GripPositions,
}

impl Config {
    /// Reject values the control loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        self.control.period().map_err(|e| e.to_string())?;
        if !self.grip_positions.covers_all_intents() {
            let known: Vec<&str> = self.grip_positions.names().collect();
            return Err(format!(
                "grip_positions must define rest, pinch, power and open (found: {})",
                known.join(", ")
            ));
        }
        Ok(())
    }
}

/// Return the path to `~/.gpm/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gpm").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.  Environment overrides are applied to a loaded file.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `GPM_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `GPM_CONTROL_RATE_HZ` | `control.rate_hz` |
/// | `GPM_SAFETY_CHECK_INTERVAL` | `control.safety_check_interval` |
/// | `GPM_CRITICAL_VOLTAGE` | `safety.critical_voltage` |
/// | `GPM_DEBUG` | `debug` (`1`/`true`/`0`/`false`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GPM_CONTROL_RATE_HZ")
        && let Ok(rate) = v.parse::<f64>()
    {
        cfg.control.rate_hz = rate;
    }
    if let Ok(v) = std::env::var("GPM_SAFETY_CHECK_INTERVAL")
        && let Ok(interval) = v.parse::<u64>()
    {
        cfg.control.safety_check_interval = interval;
    }
    if let Ok(v) = std::env::var("GPM_CRITICAL_VOLTAGE")
        && let Ok(volts) = v.parse::<f32>()
    {
        cfg.safety.critical_voltage = volts;
    }
    if let Ok(v) = std::env::var("GPM_DEBUG") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => cfg.debug = true,
            "0" | "false" => cfg.debug = false,
            _ => {}
        }
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialises tests that touch `GPM_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let _env = ENV_LOCK.lock().unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.safety.critical_voltage, 7.0);
        assert_eq!(loaded.control.safety_check_interval, 100);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[safety]\nmax_current = 8.0\n").unwrap();

        let _env = ENV_LOCK.lock().unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.safety.max_current, 8.0);
        assert_eq!(cfg.safety.max_temperature, 60.0);
        assert_eq!(cfg.control.rate_hz, 100.0);
        assert_eq!(cfg.classifier, ThresholdClassifier::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[control\nrate_hz = ").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn config_path_points_to_gpm_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".gpm"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn validate_rejects_incomplete_grip_table() {
        let mut cfg = Config::default();
        cfg.grip_positions = GripPositions::empty();
        cfg.grip_positions.insert("rest", [1500; 6]);
        assert!(cfg.validate().unwrap_err().contains("grip_positions"));
    }

    #[test]
    fn validate_rejects_zero_rate() {
        let mut cfg = Config::default();
        cfg.control.rate_hz = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_control_fields() {
        let _env = ENV_LOCK.lock().unwrap();
        // SAFETY: guarded by ENV_LOCK; no other thread reads these variables.
        unsafe {
            std::env::set_var("GPM_CONTROL_RATE_HZ", "50");
            std::env::set_var("GPM_SAFETY_CHECK_INTERVAL", "10");
            std::env::set_var("GPM_CRITICAL_VOLTAGE", "9.5");
            std::env::set_var("GPM_DEBUG", "true");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("GPM_CONTROL_RATE_HZ");
            std::env::remove_var("GPM_SAFETY_CHECK_INTERVAL");
            std::env::remove_var("GPM_CRITICAL_VOLTAGE");
            std::env::remove_var("GPM_DEBUG");
        }
        assert_eq!(cfg.control.rate_hz, 50.0);
        assert_eq!(cfg.control.safety_check_interval, 10);
        assert_eq!(cfg.safety.critical_voltage, 9.5);
        assert!(cfg.debug);
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        let _env = ENV_LOCK.lock().unwrap();
        // SAFETY: guarded by ENV_LOCK; no other thread reads these variables.
        unsafe {
            std::env::set_var("GPM_CONTROL_RATE_HZ", "fast");
            std::env::set_var("GPM_DEBUG", "maybe");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("GPM_CONTROL_RATE_HZ");
            std::env::remove_var("GPM_DEBUG");
        }
        assert_eq!(cfg.control.rate_hz, 100.0);
        assert!(!cfg.debug);
    }
}
