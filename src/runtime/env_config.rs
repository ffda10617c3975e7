//! Environment variable and config file support for [`HarnessConfig`].
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set on the config after loading
//! 2. **Environment variables**: values from `COSYNC_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`HarnessConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `COSYNC_ENTRY_POINT` | `String` | `entry_point` |
//! | `COSYNC_MAX_STEPS` | `u64` (`0` = unlimited) | `scheduler.max_steps_per_run` |
//! | `COSYNC_QUEUE_CAPACITY` | `usize` | `scheduler.initial_queue_capacity` |

use crate::error::{Error, Result};
use crate::harness::HarnessConfig;

/// Environment variable naming the bootstrap, as `"<module>:<dotted.path>"`.
pub const ENV_ENTRY_POINT: &str = "COSYNC_ENTRY_POINT";
/// Environment variable for the runaway guard. `0` disables it.
pub const ENV_MAX_STEPS: &str = "COSYNC_MAX_STEPS";
/// Environment variable for the initial ready-queue capacity.
pub const ENV_QUEUE_CAPACITY: &str = "COSYNC_QUEUE_CAPACITY";

/// Apply environment variable overrides to a [`HarnessConfig`].
///
/// Only variables that are set override the config. An unparseable value is
/// a `Config` error naming the variable and the value.
pub fn apply_env_overrides(config: &mut HarnessConfig) -> Result<()> {
    if let Some(val) = read_env(ENV_ENTRY_POINT) {
        config.entry_point = Some(val);
    }
    if let Some(val) = read_env(ENV_MAX_STEPS) {
        config.scheduler.max_steps_per_run = match parse_u64(ENV_MAX_STEPS, &val)? {
            0 => None,
            steps => Some(steps),
        };
    }
    if let Some(val) = read_env(ENV_QUEUE_CAPACITY) {
        config.scheduler.initial_queue_capacity = parse_usize(ENV_QUEUE_CAPACITY, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
pub(crate) fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64> {
    val.trim().parse::<u64>().map_err(|e| {
        Error::config(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize> {
    val.trim().parse::<usize>().map_err(|e| {
        Error::config(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable harness configuration.
///
/// ```toml
/// entry_point = "tb.uart:tests.smoke"
///
/// [scheduler]
/// max_steps_per_run = 100000
/// initial_queue_capacity = 256
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct HarnessTomlConfig {
    /// Bootstrap entry point.
    pub entry_point: Option<String>,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerToml,
}

/// Scheduler section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulerToml {
    /// Runaway guard (0 = unlimited).
    pub max_steps_per_run: Option<u64>,
    /// Initial ready-queue capacity.
    pub initial_queue_capacity: Option<usize>,
}

/// Apply a parsed TOML config to a [`HarnessConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut HarnessConfig, toml: &HarnessTomlConfig) {
    if let Some(ref v) = toml.entry_point {
        config.entry_point = Some(v.clone());
    }
    if let Some(v) = toml.scheduler.max_steps_per_run {
        config.scheduler.max_steps_per_run = (v != 0).then_some(v);
    }
    if let Some(v) = toml.scheduler.initial_queue_capacity {
        config.scheduler.initial_queue_capacity = v;
    }
}

/// Parse a TOML string into a [`HarnessTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<HarnessTomlConfig> {
    toml::from_str(toml_str)
        .map_err(|e| Error::config(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into a [`HarnessTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<HarnessTomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {e}", path.display())).with_source(e)
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        clean_env_locked();
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        clean_env_locked();
        result
    }

    fn clean_env_locked() {
        for var in &[ENV_ENTRY_POINT, ENV_MAX_STEPS, ENV_QUEUE_CAPACITY] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_u64("TEST", " 42 ").unwrap(), 42);
        assert_eq!(parse_usize("TEST", "0").unwrap(), 0);
        let err = parse_u64("COSYNC_MAX_STEPS", "-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let msg = err.message().unwrap();
        assert!(msg.contains("COSYNC_MAX_STEPS"), "{msg}");
        assert!(msg.contains("\"-1\""), "{msg}");
    }

    #[test]
    fn unset_env_changes_nothing() {
        with_envs(&[], || {
            let mut config = HarnessConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config, HarnessConfig::default());
        });
    }

    #[test]
    fn env_overrides_apply() {
        with_envs(
            &[
                (ENV_ENTRY_POINT, "tb.uart:tests.smoke"),
                (ENV_MAX_STEPS, "500"),
                (ENV_QUEUE_CAPACITY, "8"),
            ],
            || {
                let mut config = HarnessConfig::default();
                apply_env_overrides(&mut config).unwrap();
                assert_eq!(config.entry_point.as_deref(), Some("tb.uart:tests.smoke"));
                assert_eq!(config.scheduler.max_steps_per_run, Some(500));
                assert_eq!(config.scheduler.initial_queue_capacity, 8);
            },
        );
    }

    #[test]
    fn zero_steps_means_unlimited() {
        with_envs(&[(ENV_MAX_STEPS, "0")], || {
            let mut config = HarnessConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config.scheduler.max_steps_per_run, None);
        });
    }

    #[test]
    fn bad_env_value_is_rejected() {
        with_envs(&[(ENV_QUEUE_CAPACITY, "lots")], || {
            let mut config = HarnessConfig::default();
            let err = apply_env_overrides(&mut config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
            assert!(err.message().unwrap().contains(ENV_QUEUE_CAPACITY));
        });
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_fills_only_present_fields() {
        let parsed = parse_toml_str(
            r#"
            entry_point = "tb:main"
            [scheduler]
            max_steps_per_run = 0
            "#,
        )
        .unwrap();
        let mut config = HarnessConfig::default();
        apply_toml_config(&mut config, &parsed);
        assert_eq!(config.entry_point.as_deref(), Some("tb:main"));
        assert_eq!(config.scheduler.max_steps_per_run, None);
        assert_eq!(config.scheduler.initial_queue_capacity, 64);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_syntax_error_is_config_error() {
        let err = parse_toml_str("entry_point = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
