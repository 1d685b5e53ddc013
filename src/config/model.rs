// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [simulation]
/// node_exe = "./ot-cli-ftd"
/// speed = 1.0
/// step = "10ms"
/// work_queue_length = 64
///
/// [protocol]
/// command_timeout = "10s"
/// prompt_timeout = "1s"
/// line_buffer_capacity = 100
/// scan_window = "600ms"
/// ```
///
/// All sections are optional and have reasonable defaults. This is the raw
/// (string-typed) form; [`ConfigFile`] is the validated form the rest of the
/// crate consumes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub simulation: SimulationSection,

    #[serde(default)]
    pub protocol: ProtocolSection,
}

/// `[simulation]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    /// Device executable, spawned as `<node_exe> <node id>`.
    #[serde(default = "default_node_exe")]
    pub node_exe: String,

    /// Virtual seconds advanced per real second.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Virtual-time quantum advanced per step of the owning loop.
    #[serde(default = "default_step")]
    pub step: String,

    /// Capacity of the bounded work submission queue.
    #[serde(default = "default_work_queue_length")]
    pub work_queue_length: usize,
}

fn default_node_exe() -> String {
    "./ot-cli-ftd".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_step() -> String {
    "10ms".to_string()
}

fn default_work_queue_length() -> usize {
    64
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            node_exe: default_node_exe(),
            speed: default_speed(),
            step: default_step(),
            work_queue_length: default_work_queue_length(),
        }
    }
}

/// `[protocol]` section: constants of the device shell protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolSection {
    /// Deadline for each expected line of a command exchange.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// Short deadline used by the first two prompt-sync attempts.
    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout: String,

    /// Per-node pending line capacity; oldest lines are dropped beyond it.
    #[serde(default = "default_line_buffer_capacity")]
    pub line_buffer_capacity: usize,

    /// How long `scan` keeps collecting asynchronous result rows.
    #[serde(default = "default_scan_window")]
    pub scan_window: String,
}

fn default_command_timeout() -> String {
    "10s".to_string()
}

fn default_prompt_timeout() -> String {
    "1s".to_string()
}

fn default_line_buffer_capacity() -> usize {
    100
}

fn default_scan_window() -> String {
    "600ms".to_string()
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            command_timeout: default_command_timeout(),
            prompt_timeout: default_prompt_timeout(),
            line_buffer_capacity: default_line_buffer_capacity(),
            scan_window: default_scan_window(),
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub simulation: SimulationConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub node_exe: PathBuf,
    pub speed: f64,
    pub step: Duration,
    pub work_queue_length: usize,
}

/// Timing and buffering constants handed to every node driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub command_timeout: Duration,
    pub prompt_timeout: Duration,
    pub line_buffer_capacity: usize,
    pub scan_window: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            prompt_timeout: Duration::from_secs(1),
            line_buffer_capacity: 100,
            scan_window: Duration::from_millis(600),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig {
                node_exe: PathBuf::from(default_node_exe()),
                speed: default_speed(),
                step: Duration::from_millis(10),
                work_queue_length: default_work_queue_length(),
            },
            protocol: ProtocolConfig::default(),
        }
    }
}
