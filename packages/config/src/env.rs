// ABOUTME: Environment variable parsing utilities
// ABOUTME: Reads trimmed strings, validated numbers and comma-separated lists with defaults

use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

/// Read a string environment variable, treating blank values as unset
pub fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `var_name` and keep it only if `validator` accepts it. An unset
/// variable silently yields `default`; a value that fails to parse or
/// validate yields `default` with a warning.
pub fn parse_env_or_default_with_validation<T, F>(var_name: &str, default: T, validator: F) -> T
where
    T: FromStr + Copy + Display,
    F: Fn(T) -> bool,
{
    let Some(raw) = env_string(var_name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(value) => value,
        Ok(_) => {
            warn!("{} is out of range ('{}'), using {}", var_name, raw, default);
            default
        }
        Err(_) => {
            warn!("{} is not a valid value ('{}'), using {}", var_name, raw, default);
            default
        }
    }
}

/// Parse a comma-separated environment variable into a list
/// Blank entries are dropped; an unset or blank variable yields the default list
pub fn parse_env_list(var_name: &str, default: &[&str]) -> Vec<String> {
    match env_string(var_name) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
