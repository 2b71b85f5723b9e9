//! Validation helpers and parsing utilities for environment values.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use closet_telemetry::LogFormat;

use crate::error::{ConfigError, ConfigResult};
use crate::model::StageCommand;

pub(crate) fn parse_port(field: &'static str, value: &str) -> ConfigResult<u16> {
    let port: u32 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", value))?;
    if port == 0 {
        return Err(ConfigError::invalid(field, "zero", value));
    }
    u16::try_from(port).map_err(|_| ConfigError::invalid(field, "out_of_range", value))
}

pub(crate) fn parse_bind_addr(field: &'static str, value: &str) -> ConfigResult<IpAddr> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    trimmed
        .parse()
        .map_err(|_| ConfigError::invalid(field, "not_an_ip_address", value))
}

pub(crate) fn parse_secs(field: &'static str, value: &str) -> ConfigResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", value))
}

pub(crate) fn parse_positive_secs(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let duration = parse_secs(field, value)?;
    if duration.is_zero() {
        return Err(ConfigError::invalid(field, "zero", value));
    }
    Ok(duration)
}

pub(crate) fn parse_positive_usize(field: &'static str, value: &str) -> ConfigResult<usize> {
    let parsed: usize = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", value))?;
    if parsed == 0 {
        return Err(ConfigError::invalid(field, "zero", value));
    }
    Ok(parsed)
}

pub(crate) fn parse_flag(field: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(field, "not_a_boolean", value)),
    }
}

pub(crate) fn parse_log_format(field: &'static str, value: &str) -> ConfigResult<LogFormat> {
    LogFormat::parse(value).ok_or_else(|| ConfigError::invalid(field, "unknown_format", value))
}

/// Split a whitespace-separated command line into program and fixed arguments.
pub(crate) fn parse_command(field: &'static str, value: &str) -> ConfigResult<StageCommand> {
    let mut parts = value.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| ConfigError::invalid(field, "empty", value))?;
    Ok(StageCommand::new(program, parts.collect()))
}

/// Resolve `value` against `base` unless it is already absolute.
pub(crate) fn resolve_dir(field: &'static str, base: &Path, value: &str) -> ConfigResult<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, "empty", value));
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(base.join(path))
    }
}
