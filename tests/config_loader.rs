// tests/config_loader.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::{NamedTempFile, tempdir};

use meshsim::config::{ConfigFile, load_and_validate, load_or_default, parse_duration};
use meshsim::errors::MeshsimError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_is_parsed_and_validated() {
    let file = config_file(
        r#"
[simulation]
node_exe = "/opt/ot/ot-cli-ftd"
speed = 50.0
step = "5ms"
work_queue_length = 8

[protocol]
command_timeout = "3s"
prompt_timeout = "250ms"
line_buffer_capacity = 32
scan_window = "1s"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.simulation.node_exe, PathBuf::from("/opt/ot/ot-cli-ftd"));
    assert_eq!(cfg.simulation.speed, 50.0);
    assert_eq!(cfg.simulation.step, Duration::from_millis(5));
    assert_eq!(cfg.simulation.work_queue_length, 8);
    assert_eq!(cfg.protocol.command_timeout, Duration::from_secs(3));
    assert_eq!(cfg.protocol.prompt_timeout, Duration::from_millis(250));
    assert_eq!(cfg.protocol.line_buffer_capacity, 32);
    assert_eq!(cfg.protocol.scan_window, Duration::from_secs(1));
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let file = config_file(
        r#"
[simulation]
speed = 2.0
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let defaults = ConfigFile::default();

    assert_eq!(cfg.simulation.speed, 2.0);
    assert_eq!(cfg.simulation.node_exe, defaults.simulation.node_exe);
    assert_eq!(cfg.protocol, defaults.protocol);
}

#[test]
fn zero_capacity_is_a_config_error() {
    let file = config_file(
        r#"
[protocol]
line_buffer_capacity = 0
"#,
    );

    match load_and_validate(file.path()) {
        Err(MeshsimError::ConfigError(msg)) => assert!(msg.contains("line_buffer_capacity")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn non_positive_speed_is_a_config_error() {
    let file = config_file(
        r#"
[simulation]
speed = 0.0
"#,
    );

    match load_and_validate(file.path()) {
        Err(MeshsimError::ConfigError(msg)) => assert!(msg.contains("speed")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn bad_duration_names_the_key() {
    let file = config_file(
        r#"
[protocol]
command_timeout = "10 parsecs"
"#,
    );

    match load_and_validate(file.path()) {
        Err(MeshsimError::ConfigError(msg)) => {
            assert!(msg.contains("[protocol].command_timeout"), "{msg}");
            assert!(msg.contains("unsupported duration unit"), "{msg}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = config_file("[simulation\nspeed = ");

    match load_and_validate(file.path()) {
        Err(MeshsimError::TomlError(_)) => {}
        Err(e) => panic!("Expected TomlError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn absent_default_file_gives_defaults_but_explicit_one_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("meshsim.toml");

    let cfg = load_or_default(&missing).unwrap();
    assert_eq!(cfg.protocol, ConfigFile::default().protocol);

    match load_and_validate(&missing) {
        Err(MeshsimError::IoError(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        Err(e) => panic!("Expected IoError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn duration_strings() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("15").unwrap_err().contains("unit"));
    assert!(parse_duration("1.5s").is_err());
    assert!(parse_duration("18446744073709551615h").unwrap_err().contains("too large"));
    assert!(parse_duration("18446744073709551615s").is_ok());
}

#[test]
fn overflowing_duration_is_a_config_error() {
    let file = config_file(
        r#"
[protocol]
scan_window = "9999999999999999999m"
"#,
    );

    match load_and_validate(file.path()) {
        Err(MeshsimError::ConfigError(msg)) => {
            assert!(msg.contains("[protocol].scan_window"), "{msg}");
            assert!(msg.contains("too large"), "{msg}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}
