// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, ProtocolConfig, ProtocolSection, RawConfigFile, SimulationConfig,
    SimulationSection,
};
use crate::errors::{MeshsimError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = MeshsimError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        Ok(ConfigFile {
            simulation: validate_simulation(&raw.simulation)?,
            protocol: validate_protocol(&raw.protocol)?,
        })
    }
}

fn validate_simulation(section: &SimulationSection) -> Result<SimulationConfig> {
    if section.node_exe.trim().is_empty() {
        return Err(MeshsimError::ConfigError(
            "[simulation].node_exe must not be empty".to_string(),
        ));
    }

    validate_speed(section.speed)?;

    if section.work_queue_length == 0 {
        return Err(MeshsimError::ConfigError(
            "[simulation].work_queue_length must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(SimulationConfig {
        node_exe: PathBuf::from(&section.node_exe),
        speed: section.speed,
        step: nonzero_duration("[simulation].step", &section.step)?,
        work_queue_length: section.work_queue_length,
    })
}

fn validate_protocol(section: &ProtocolSection) -> Result<ProtocolConfig> {
    if section.line_buffer_capacity == 0 {
        return Err(MeshsimError::ConfigError(
            "[protocol].line_buffer_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(ProtocolConfig {
        command_timeout: nonzero_duration(
            "[protocol].command_timeout",
            &section.command_timeout,
        )?,
        prompt_timeout: nonzero_duration("[protocol].prompt_timeout", &section.prompt_timeout)?,
        line_buffer_capacity: section.line_buffer_capacity,
        scan_window: parse_duration(&section.scan_window)
            .map_err(|e| MeshsimError::ConfigError(format!("[protocol].scan_window: {e}")))?,
    })
}

/// Reject speeds that would stall or reverse virtual time.
pub fn validate_speed(speed: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(MeshsimError::ConfigError(format!(
            "speed must be a positive number (got {speed})"
        )));
    }
    Ok(())
}

fn nonzero_duration(key: &str, s: &str) -> Result<Duration> {
    let dur = parse_duration(s).map_err(|e| MeshsimError::ConfigError(format!("{key}: {e}")))?;
    if dur.is_zero() {
        return Err(MeshsimError::ConfigError(format!("{key} must be > 0")));
    }
    Ok(dur)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
