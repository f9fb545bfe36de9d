//! Configuration loading and validation.

use roach_mc::config::Settings;
use std::io::Write;
use std::time::Duration;

#[test]
fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
supervisor_host = "dto-gateway"
supervisor_port = 50020
refresh_interval = "2s"
"#
    )
    .unwrap();
    let settings = Settings::load_from(file.path()).unwrap();
    assert_eq!(settings.endpoint(), "dto-gateway:50020");
    assert_eq!(settings.refresh_interval, Duration::from_secs(2));
    // Unset fields keep their defaults.
    assert_eq!(settings.object_id, "DSS-43");
    assert!(settings.validate().is_ok());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let settings = Settings::load_from("does/not/exist.toml").unwrap();
    assert_eq!(settings.endpoint(), "localhost:50015");
    assert!(settings.validate().is_ok());
}

#[test]
fn unparsable_interval_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"refresh_interval = "soon""#).unwrap();
    assert!(Settings::load_from(file.path()).is_err());
}

#[test]
fn validation_rejects_empty_host() {
    let settings = Settings {
        supervisor_host: String::new(),
        ..Settings::default()
    };
    assert!(settings.validate().is_err());
}
