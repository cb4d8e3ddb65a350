use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sheetocr() -> Command {
    Command::cargo_bin("sheetocr").unwrap()
}

fn write_config(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, json).unwrap();
    path
}

fn write_table(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("regions.csv");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn help_lists_commands() {
    sheetocr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn check_reports_malformed_cells() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "{}");
    let table = write_table(
        dir.path(),
        "code,revenue,profit\nVNM,\"1,A1,0,0,100,50\",\"x,A1,0,0,100\"\nHPG,\"2,B2,0,0,100,50\"\n",
    );

    sheetocr()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&table)
        .assert()
        .failure()
        .stdout(predicate::str::contains("2 entities"))
        .stdout(predicate::str::contains("column 3 [x,A1,0,0,100]"))
        .stdout(predicate::str::contains("found 5"));
}

#[test]
fn check_accepts_valid_table() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "{}");
    let table = write_table(dir.path(), "VNM,\"1,A1,0,0,100,50\",\"2,B2,0,0,100,50\"\n");

    sheetocr()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg("--no-header")
        .arg(&table)
        .assert()
        .success()
        .stdout(predicate::str::contains("VNM"))
        .stdout(predicate::str::contains("No problems found"));
}

#[test]
fn check_rejects_dpi_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"raster": {"dpi": 300}}"#);
    let table = write_table(dir.path(), "VNM,\"1,A1,0,0,100,50\"\n");

    sheetocr()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg("--no-header")
        .arg(&table)
        .assert()
        .failure()
        .stdout(predicate::str::contains("region_dpi"));
}

#[test]
fn config_get_reads_given_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"run": {"concurrency": 3}}"#);

    sheetocr()
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "run.concurrency"])
        .assert()
        .success()
        .stdout(predicate::str::diff("3\n"));

    sheetocr()
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "raster.dpi"])
        .assert()
        .success()
        .stdout(predicate::str::diff("200\n"));
}

#[test]
fn config_set_round_trips() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.json");

    sheetocr()
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "sink.empty_text", "-"])
        .assert()
        .success();

    sheetocr()
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "sink.empty_text"])
        .assert()
        .success()
        .stdout(predicate::str::diff("\"-\"\n"));

    sheetocr()
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "run.bogus", "1"])
        .assert()
        .failure();
}

#[test]
fn run_without_models_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!(r#"{{"ocr": {{"model_dir": {:?}}}}}"#, dir.path().join("models")),
    );
    let table = write_table(dir.path(), "VNM,\"1,A1,0,0,100,50\"\n");

    sheetocr()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--no-header")
        .arg("--dry-run")
        .arg(&table)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load OCR models"));
}
