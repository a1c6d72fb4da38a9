//! Command line behavior against real netCDF files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn write_flat_file(path: &Path) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("record", 4).unwrap();

    let mut lat = file.add_variable::<f32>("lat", &["record"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&[10.0f32, 11.0, 12.0, 13.0], ..).unwrap();

    let mut lon = file.add_variable::<f32>("lon", &["record"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&[20.0f32; 4], ..).unwrap();

    let mut time = file.add_variable::<f64>("time", &["record"]).unwrap();
    time.put_attribute("units", "seconds since 1970-01-01").unwrap();
    time.put_values(&[0.0f64, 1.0, 2.0, 3.0], ..).unwrap();

    let mut temp = file.add_variable::<f32>("temp", &["record"]).unwrap();
    temp.put_values(&[5.0f32, 6.0, 7.0, 8.0], ..).unwrap();
}

fn pointflat() -> Command {
    Command::cargo_bin("pointflat").unwrap()
}

#[test]
fn prints_flattened_points() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.nc");
    write_flat_file(&path);

    pointflat()
        .arg(&path)
        .args(["--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("POINT record"))
        .stdout(predicate::str::contains("1970-01-01T00:00:01Z"))
        .stdout(predicate::str::contains("1970-01-01T00:00:02Z").not());
}

#[test]
fn show_describes_the_analysis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.nc");
    write_flat_file(&path);

    pointflat()
        .arg(&path)
        .arg("--show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configurer = default"));
}

#[test]
fn unknown_feature_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.nc");
    write_flat_file(&path);

    pointflat()
        .arg(&path)
        .args(["--feature-type", "grid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown feature type"));
}

#[test]
fn missing_file_fails() {
    pointflat()
        .arg("/nonexistent/data.nc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn log_file_is_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.nc");
    let log = dir.path().join("pointflat.log");
    write_flat_file(&path);

    pointflat()
        .arg(&path)
        .arg("--log")
        .arg(&log)
        .env("RUST_LOG", "info")
        .assert()
        .success();
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("Starting pointflat"));
}
