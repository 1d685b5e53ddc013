// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; durations are still strings and
/// nothing has been range-checked. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults for missing keys (handled by `serde` + `Default` impls).
/// - Parses durations and checks ranges (capacities, speed, timeouts).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config at `path` if it exists, otherwise fall back to defaults.
///
/// Used for the implicit default path; an explicitly requested file that is
/// missing is still an error (see `lib::run`).
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        load_and_validate(path)
    } else {
        ConfigFile::try_from(RawConfigFile::default())
    }
}

/// Default config location: `meshsim.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("meshsim.toml")
}
