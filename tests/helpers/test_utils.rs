#![allow(dead_code)]
use runwatch::config::{Config, DestinationKind};
use std::{fs::File, io::Write, path::PathBuf};
use tempfile::TempDir;

/// Writes `content` to `name` inside a fresh temporary directory.
///
/// The directory is returned so that it outlives the test body.
pub fn write_temp_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let mut file = File::create(&path).unwrap();
    write!(file, "{}", content).unwrap();
    (dir, path)
}

/// A quiet configuration with one enabled callback and no terminal mirroring.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tty_output = false;
    config.notify.callbacks = vec![DestinationKind::Webhook];
    config
}
