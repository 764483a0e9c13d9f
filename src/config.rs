//! Configuration loading: `config.toml` plus `AWARD_*` environment
//! overrides. Tuning overrides that fail to parse fall back to the
//! configured value rather than failing the run.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use common::{Error, Result, ScoutConfig};

pub const CONFIG_FILE: &str = "config.toml";

/// Load configuration. An explicitly requested file must exist; the default
/// `config.toml` is optional and its absence means defaults.
pub fn load(path: Option<&Path>) -> Result<ScoutConfig> {
    let mut config = match path {
        Some(explicit) => read_file(explicit)?,
        None => {
            let default = Path::new(CONFIG_FILE);
            if default.exists() {
                read_file(default)?
            } else {
                debug!("no {CONFIG_FILE} found, using defaults");
                ScoutConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn read_file(path: &Path) -> Result<ScoutConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn apply_env_overrides(config: &mut ScoutConfig) {
    let tuning = &mut config.tuning;
    // Jitter and the retry limit may legitimately be zero; the rest must be
    // positive or the dispatcher degenerates (no workers, no pacing, a
    // breaker that trips on the first failure).
    override_positive_from_env("AWARD_MAX_IN_FLIGHT", &mut tuning.max_in_flight);
    override_positive_from_env("AWARD_DISPATCH_INTERVAL_MS", &mut tuning.dispatch_interval_ms);
    override_from_env("AWARD_DISPATCH_JITTER_MS", &mut tuning.dispatch_jitter_ms);
    override_from_env("AWARD_RETRY_LIMIT", &mut tuning.retry_limit);
    override_positive_from_env(
        "AWARD_FAILURE_ABORT_THRESHOLD",
        &mut tuning.failure_abort_threshold,
    );
    override_positive_from_env("AWARD_DEST_CONCURRENCY", &mut tuning.destination_concurrency);
}

/// Apply `name` to `slot` when set and parseable; otherwise leave the slot
/// untouched.
fn override_from_env<T>(name: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(raw) = std::env::var(name) else { return };
    match raw.trim().parse() {
        Ok(value) => {
            debug!("{name}={raw}");
            *slot = value;
        }
        Err(e) => debug!("ignoring {name}={raw}: {e}"),
    }
}

/// Like [`override_from_env`], but the knob must be a positive integer;
/// zero falls back to the configured value like any other invalid input.
fn override_positive_from_env<T>(name: &str, slot: &mut T)
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let Ok(raw) = std::env::var(name) else { return };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => {
            debug!("{name}={raw}");
            *slot = value;
        }
        Ok(_) => debug!("ignoring {name}={raw}: must be positive"),
        Err(e) => debug!("ignoring {name}={raw}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_overrides_apply_and_bad_values_fall_back() {
        // One test body: env vars are process-global.
        std::env::set_var("AWARD_MAX_IN_FLIGHT", "7");
        std::env::set_var("AWARD_RETRY_LIMIT", "three");
        std::env::set_var("AWARD_DISPATCH_INTERVAL_MS", " 900 ");

        let mut config = ScoutConfig::default();
        apply_env_overrides(&mut config);

        assert_eq!(config.tuning.max_in_flight, 7);
        assert_eq!(config.tuning.retry_limit, 2);
        assert_eq!(config.tuning.dispatch_interval_ms, 900);

        std::env::remove_var("AWARD_MAX_IN_FLIGHT");
        std::env::remove_var("AWARD_RETRY_LIMIT");
        std::env::remove_var("AWARD_DISPATCH_INTERVAL_MS");
    }

    #[test]
    fn zero_is_rejected_for_positive_only_knobs() {
        // Uses knobs the other env test never touches; tests share the
        // process environment.
        std::env::set_var("AWARD_FAILURE_ABORT_THRESHOLD", "0");
        std::env::set_var("AWARD_DEST_CONCURRENCY", "0");
        std::env::set_var("AWARD_DISPATCH_JITTER_MS", "0");

        let mut config = ScoutConfig::default();
        apply_env_overrides(&mut config);

        // A zero threshold would trip the breaker on the first failure, so
        // it falls back to the default instead of being applied.
        assert_eq!(config.tuning.failure_abort_threshold, 8);
        assert_eq!(config.tuning.destination_concurrency, 2);
        // Jitter may legitimately be disabled.
        assert_eq!(config.tuning.dispatch_jitter_ms, 0);

        std::env::remove_var("AWARD_FAILURE_ABORT_THRESHOLD");
        std::env::remove_var("AWARD_DEST_CONCURRENCY");
        std::env::remove_var("AWARD_DISPATCH_JITTER_MS");
    }

    #[test]
    fn toml_file_parses_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[cache]
freshness_secs = 600

[[routes]]
origin = "LHR"
destination = "JFK"
months = ["2026-09", "2026-10"]
"#
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.cache.freshness_secs, 600);
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].months.len(), 2);
        // Untouched sections keep their defaults. (Asserts a knob the env
        // override test never sets, since tests share the process env.)
        assert_eq!(config.tuning.failure_abort_threshold, 8);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }
}
