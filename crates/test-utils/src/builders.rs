#![allow(dead_code)]

use std::path::Path;

use meshsim::config::{ConfigFile, ProtocolConfig, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the same defaults as an empty TOML file, with timeouts short
/// enough for tests.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.protocol.command_timeout = "2s".to_string();
        config.protocol.prompt_timeout = "200ms".to_string();
        config.protocol.scan_window = "300ms".to_string();
        config.simulation.step = "10ms".to_string();
        Self { config }
    }

    pub fn node_exe(mut self, exe: impl AsRef<Path>) -> Self {
        self.config.simulation.node_exe = exe.as_ref().display().to_string();
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.config.simulation.speed = speed;
        self
    }

    pub fn step(mut self, step: &str) -> Self {
        self.config.simulation.step = step.to_string();
        self
    }

    pub fn work_queue_length(mut self, len: usize) -> Self {
        self.config.simulation.work_queue_length = len;
        self
    }

    pub fn command_timeout(mut self, timeout: &str) -> Self {
        self.config.protocol.command_timeout = timeout.to_string();
        self
    }

    pub fn prompt_timeout(mut self, timeout: &str) -> Self {
        self.config.protocol.prompt_timeout = timeout.to_string();
        self
    }

    pub fn line_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.protocol.line_buffer_capacity = capacity;
        self
    }

    pub fn scan_window(mut self, window: &str) -> Self {
        self.config.protocol.scan_window = window.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn build_protocol(self) -> ProtocolConfig {
        self.build().protocol
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
