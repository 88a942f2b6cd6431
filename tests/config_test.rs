// Integration test: loading telemetry config files

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use trainscope::config::{load_config, GpuBackend, SinkKind, TelemetryConfig};
use trainscope::errors::TelemetryError;

#[test]
fn test_load_full_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("telemetry.toml");
    fs::write(
        &path,
        r#"
log_dir = "runs/arm_policy"
batch_size = 64
sink = "jsonl"
gpu = "none"
gpu_device = 2
flush_secs = 30
"#,
    )?;

    let config = load_config(&path)?;
    assert_eq!(config.log_dir, PathBuf::from("runs/arm_policy"));
    assert_eq!(config.batch_size, 64);
    assert_eq!(config.sink, SinkKind::Jsonl);
    assert_eq!(config.gpu, GpuBackend::None);
    assert_eq!(config.gpu_device, 2);
    assert_eq!(config.flush_secs, 30);
    Ok(())
}

#[test]
fn test_empty_file_gives_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("telemetry.toml");
    fs::write(&path, "")?;

    let config = load_config(&path)?;
    assert_eq!(config, TelemetryConfig::default());
    Ok(())
}

#[test]
fn test_invalid_flush_interval_is_typed_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("telemetry.toml");
    fs::write(&path, "flush_secs = 0\n")?;

    let err = load_config(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TelemetryError>(),
        Some(TelemetryError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_missing_file_names_the_path() {
    let err = load_config("/definitely/not/here/telemetry.toml").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here/telemetry.toml"));
}
