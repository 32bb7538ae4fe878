//! Configuration loading and resolution.

use std::path::PathBuf;

use temporary_entities::{ConfigError, ManagerConfig};

pub const STATE_FILE_ENV: &str = "TEMPORARY_STATE_FILE";
pub const MIN_PERSIST_DURATION_ENV: &str = "TEMPORARY_MIN_PERSIST_DURATION";
pub const CLEANUP_INTERVAL_ENV: &str = "TEMPORARY_CLEANUP_INTERVAL";
pub const FINALIZED_GRACE_PERIOD_ENV: &str = "TEMPORARY_FINALIZED_GRACE_PERIOD";
pub const INACTIVE_MAX_AGE_ENV: &str = "TEMPORARY_INACTIVE_MAX_AGE";

/// Resolve the state file path: explicit flag, then environment, then a
/// project-local file if present, then the home directory.
pub fn resolve_state_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(STATE_FILE_ENV) {
        return env_path;
    }

    let cwd_state = PathBuf::from(".temporary/state.json");
    if cwd_state.exists() {
        return cwd_state.display().to_string();
    }

    resolve_default_state_path()
}

fn resolve_default_state_path() -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    format!("{home}/.temporary-entities/state.json")
}

/// Values given on the command line. `None` falls through to the
/// environment and then the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub min_persist_duration: Option<u64>,
    pub cleanup_interval: Option<u64>,
    pub finalized_grace_period: Option<u64>,
    pub inactive_max_age: Option<u64>,
}

/// Build and validate the manager configuration.
pub fn resolve_manager_config(overrides: &ConfigOverrides) -> Result<ManagerConfig, ConfigError> {
    resolve_with(overrides, |name| std::env::var(name).ok())
}

fn resolve_with(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ManagerConfig, ConfigError> {
    let defaults = ManagerConfig::default();
    let pick = |flag: Option<u64>, var: &str, default: u64| {
        flag.or_else(|| read_env_u64(&env, var)).unwrap_or(default)
    };

    let config = ManagerConfig {
        min_persist_duration: pick(
            overrides.min_persist_duration,
            MIN_PERSIST_DURATION_ENV,
            defaults.min_persist_duration,
        ),
        cleanup_interval: pick(overrides.cleanup_interval, CLEANUP_INTERVAL_ENV, defaults.cleanup_interval),
        finalized_grace_period: pick(
            overrides.finalized_grace_period,
            FINALIZED_GRACE_PERIOD_ENV,
            defaults.finalized_grace_period,
        ),
        inactive_max_age: pick(overrides.inactive_max_age, INACTIVE_MAX_AGE_ENV, defaults.inactive_max_age),
    };
    config.validate()?;
    Ok(config)
}

fn read_env_u64(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = env(name)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {name}={raw:?}: not a whole number of seconds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = resolve_with(&ConfigOverrides::default(), env_of(&[])).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_flag_beats_env_beats_default() {
        let env = env_of(&[(CLEANUP_INTERVAL_ENV, "120"), (FINALIZED_GRACE_PERIOD_ENV, "10")]);
        let overrides = ConfigOverrides {
            cleanup_interval: Some(600),
            ..ConfigOverrides::default()
        };
        let config = resolve_with(&overrides, env).unwrap();
        assert_eq!(config.cleanup_interval, 600);
        assert_eq!(config.finalized_grace_period, 10);
        assert_eq!(config.inactive_max_age, 86_400);
    }

    #[test]
    fn test_unparseable_env_ignored() {
        let env = env_of(&[(MIN_PERSIST_DURATION_ENV, "soon")]);
        let config = resolve_with(&ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.min_persist_duration, 60);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let overrides = ConfigOverrides {
            inactive_max_age: Some(60),
            ..ConfigOverrides::default()
        };
        assert!(resolve_with(&overrides, env_of(&[])).is_err());
    }

    #[test]
    fn test_explicit_state_path_wins() {
        assert_eq!(resolve_state_path(Some("/tmp/x.json")), "/tmp/x.json");
    }
}
