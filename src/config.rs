//! Hand-rolled `key=value` config file parser and defaults, matching the
//! source's own grammar rather than reaching for a generic format crate
//! (the source never used one, and neither does the teacher's config
//! layer for a grammar this small). Ported from
//! `original_source/src/agios_config.c`.

use std::fs;
use std::path::Path;

use crate::error::{AgiosError, Result};
use crate::policy::PolicyId;

#[derive(Debug, Clone)]
pub struct Config {
    pub default_policy: PolicyId,
    pub is_dynamic: bool,
    /// Minimum processed requests before a dynamic re-selection is even
    /// considered. Ported from `config_select_algorithm_min_reqnumber`.
    pub select_algorithm_min_reqnumber: i64,
    /// Interval (ns) between dynamic re-selection attempts; negative
    /// disables dynamic selection. Ported from `config_select_algorithm_period`.
    pub select_algorithm_period_ns: i64,
    pub max_aggregation_size: usize,
    pub performance_values: usize,
    pub waiting_time_ns: i64,
    pub twins_window_ns: i64,
    pub trace_enabled: bool,
    pub trace_file_prefix: String,
    pub trace_file_suffix: String,
    pub max_trace_buffer_size: usize,
    pub wfq_weights: Vec<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_policy: PolicyId::To,
            is_dynamic: false,
            select_algorithm_min_reqnumber: 100,
            select_algorithm_period_ns: -1,
            max_aggregation_size: 16,
            performance_values: 5,
            waiting_time_ns: 500_000,
            twins_window_ns: 1_000_000,
            trace_enabled: false,
            trace_file_prefix: "agios".to_string(),
            trace_file_suffix: "trace".to_string(),
            max_trace_buffer_size: 4096,
            wfq_weights: Vec::new(),
        }
    }
}

impl Config {
    /// Loads `path` if given, falling back to `Config::default()` when
    /// `path` is `None` or the file doesn't exist. Ported from
    /// `agios_config.c::process_config_file`: unknown keys are logged and
    /// ignored; a present-but-malformed value is a hard error.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = Config::default();
        let Some(path) = path else {
            return Ok(config);
        };
        let Ok(contents) = fs::read_to_string(path) else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(config);
        };

        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(AgiosError::ConfigError(format!(
                    "{}:{}: expected `key=value`",
                    path.display(),
                    lineno + 1
                )));
            };
            let key = key.trim();
            let value = value.trim();
            apply_key(&mut config, key, value, path, lineno + 1)?;
        }

        Ok(config)
    }
}

fn apply_key(config: &mut Config, key: &str, value: &str, path: &Path, line: usize) -> Result<()> {
    let parse_i64 = |v: &str| -> Result<i64> {
        v.parse().map_err(|_| {
            AgiosError::ConfigError(format!("{}:{}: `{}` is not an integer", path.display(), line, v))
        })
    };
    let parse_usize = |v: &str| -> Result<usize> {
        v.parse().map_err(|_| {
            AgiosError::ConfigError(format!("{}:{}: `{}` is not an integer", path.display(), line, v))
        })
    };

    match key {
        "scheduling_algorithm" => {
            config.default_policy = PolicyId::from_name(value).ok_or_else(|| {
                AgiosError::UnknownPolicy(value.to_string())
            })?;
        }
        "is_dynamic" => config.is_dynamic = value == "1" || value.eq_ignore_ascii_case("true"),
        "select_algorithm_min_reqnumber" => {
            config.select_algorithm_min_reqnumber = parse_i64(value)?;
        }
        "select_algorithm_period" => config.select_algorithm_period_ns = parse_i64(value)?,
        "max_aggregation_size" => config.max_aggregation_size = parse_usize(value)?,
        "performance_values" => config.performance_values = parse_usize(value)?,
        "waiting_time" => config.waiting_time_ns = parse_i64(value)?,
        "twins_window" => config.twins_window_ns = parse_i64(value)?,
        "trace" => config.trace_enabled = value == "1" || value.eq_ignore_ascii_case("true"),
        "trace_file_prefix" => config.trace_file_prefix = value.to_string(),
        "trace_file_suffix" => config.trace_file_suffix = value.to_string(),
        "max_trace_buffer_size" => config.max_trace_buffer_size = parse_usize(value)?,
        "wfq_weights" => {
            config.wfq_weights = value
                .split(',')
                .map(|w| parse_i64(w.trim()))
                .collect::<Result<Vec<_>>>()?;
        }
        unknown => {
            tracing::warn!(key = unknown, "unrecognized config key, ignoring");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/agios.conf"))).unwrap();
        assert_eq!(config.default_policy.name(), "TO");
    }

    #[test]
    fn unknown_key_is_ignored_not_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "totally_made_up_key=42").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.default_policy.name(), "TO");
    }

    #[test]
    fn malformed_value_in_a_present_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_aggregation_size=not_a_number").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn parses_scheduling_algorithm_and_wfq_weights() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduling_algorithm=WFQ").unwrap();
        writeln!(file, "wfq_weights=1,2,3").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.default_policy.name(), "WFQ");
        assert_eq!(config.wfq_weights, vec![1, 2, 3]);
    }
}
