mod common;

use std::fs;

use agristat::config::PipelineConfig;
use assert_cmd::Command;
use common::{CROP_WIDE, LAND_WIDE, TestWorkspace, read_csv, row};
use predicates::str::contains;

fn agristat() -> Command {
    Command::cargo_bin("agristat").expect("binary exists")
}

#[test]
fn run_writes_fact_table_and_prints_summary() {
    let ws = TestWorkspace::new();
    let land = ws.write("land.csv", LAND_WIDE);
    let crop = ws.write("crop.csv", CROP_WIDE);
    let output = ws.join("out").join("final.csv");
    agristat()
        .args([
            "run",
            "--land",
            land.to_str().unwrap(),
            "--crop",
            crop.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--variant",
            "clean",
        ])
        .assert()
        .success()
        .stdout(contains("rows_written"))
        .stdout(contains("name-match"));

    let (_, rows) = read_csv(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], row(&["Bihar", "2018_2019", "150", "30"]));
}

#[test]
fn run_reads_settings_from_config_file() {
    let ws = TestWorkspace::new();
    let mut config = ws.config(LAND_WIDE, CROP_WIDE);
    config.restrict_to_common_periods = true;
    config.variant = agristat::reconcile::JoinVariant::Complete;
    let config_path = ws.join("pipeline.yml");
    config.save(&config_path).expect("save config");

    agristat()
        .args(["run", "-c", config_path.to_str().unwrap(), "--quiet"])
        .assert()
        .success()
        .stdout(predicates::str::is_empty());
    let (_, rows) = read_csv(&config.output);
    assert_eq!(rows.len(), 6);
}

#[test]
fn normalize_rewrites_headers_and_drops_district() {
    let ws = TestWorkspace::new();
    let land = ws.write("land.csv", LAND_WIDE);
    let output = ws.join("normalized.csv");
    agristat()
        .args([
            "normalize",
            "-i",
            land.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    let (headers, rows) = read_csv(&output);
    assert_eq!(headers[1], "2018_2019_Forest_Area");
    assert!(!headers.iter().any(|h| h.contains("District")));
    assert_eq!(rows[0][0], "Bihar");
}

#[test]
fn inspect_reports_keys_and_metric_tier() {
    let ws = TestWorkspace::new();
    let crop = ws.write("crop.tsv", "State\tYear\tRice_Production\nGoa\t2019\t12\n");
    agristat()
        .args(["inspect", "-i", crop.to_str().unwrap(), "--domain", "crop"])
        .assert()
        .success()
        .stdout(contains("region_tier"))
        .stdout(contains("keyword"))
        .stdout(contains("Rice_Production"));
}

#[test]
fn init_config_writes_loadable_defaults_and_refuses_overwrite() {
    let ws = TestWorkspace::new();
    let path = ws.join("agristat.yml");
    agristat()
        .args(["init-config", "-o", path.to_str().unwrap()])
        .assert()
        .success();
    let loaded = PipelineConfig::load(&path).expect("load written config");
    assert_eq!(loaded, PipelineConfig::default());
    assert!(fs::read_to_string(&path).unwrap().contains("chunk_size"));

    agristat()
        .args(["init-config", "-o", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("already exists"));
}

#[test]
fn missing_input_is_reported() {
    let ws = TestWorkspace::new();
    agristat()
        .args([
            "run",
            "--land",
            ws.join("absent.csv").to_str().unwrap(),
            "--crop",
            ws.join("absent_too.csv").to_str().unwrap(),
            "-o",
            ws.join("final.csv").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error:"));
}
