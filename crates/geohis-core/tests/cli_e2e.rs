//! End-to-end tests for the `geohis` binary: exit codes, output files and
//! the config/schema subcommands.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const SESSION: &str = "6f1c9a52-8d3e-4b7a-a1f0-2c4d5e6f7a8b";

fn geohis(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("geohis");
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("GEOHIS_CONFIG");
    cmd.env_remove("GEOHIS_CONFIG_DIR");
    cmd.env("XDG_CONFIG_HOME", home);
    cmd.env("GEOHIS_LOG", "error");
    cmd
}

fn point(i: usize) -> Value {
    let t = (i % 10) as f64 / 10.0;
    json!({
        "id": format!("p{:02}", i),
        "latitude": 5.55 + 0.01 * i as f64,
        "longitude": -0.2,
        "factors": {
            "elevation": 100.0 * t,
            "slope": 30.0 * t,
            "drainage_proximity": 900.0 * t,
            "land_use": if t < 0.5 { "built_up" } else { "forest" },
            "soil_permeability": "moderate",
            "aspect": 200.0 * t,
            "geology": "togo_quartzite",
            "land_cover": "grassland",
            "rainfall": 850.0 + 300.0 * t
        }
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn input_doc(n: usize) -> Value {
    json!({
        "session_id": SESSION,
        "seed": 11,
        "options": { "bootstrap_b": 20 },
        "points": (0..n).map(point).collect::<Vec<_>>()
    })
}

fn stderr_json(output: &std::process::Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .expect("a JSON line on stderr");
    serde_json::from_str(line).expect("stderr JSON")
}

mod analyze {
    use super::*;

    #[test]
    fn writes_result_into_output_directory() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(6));
        let out = dir.path().join("results");
        std::fs::create_dir(&out).unwrap();

        let output = geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&input)
            .arg("--output")
            .arg(&out)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let summary: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(summary["session_id"], SESSION);
        assert_eq!(summary["points"], 6);
        assert_eq!(summary["cancelled"], false);

        let written = out.join(format!("{}.json", SESSION));
        let result: Value =
            serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(result["flood_scores"].as_array().unwrap().len(), 6);
        assert_eq!(result["landslide_scores"].as_array().unwrap().len(), 6);
        assert_eq!(result["combined_risk"].as_array().unwrap().len(), 6);
        assert_eq!(result["seed"], 11);
    }

    #[test]
    fn prints_full_result_without_output() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(3));

        let output = geohis(dir.path())
            .args(["analyze", "-i"])
            .arg(&input)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let result: Value = serde_json::from_slice(&output).unwrap();
        assert!(result["flood_weights"].is_object());
        assert!(result["frequency_ratios"].as_array().unwrap().len() > 0);
    }

    #[test]
    fn summary_format_is_one_line() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(2));
        geohis(dir.path())
            .args(["--format", "summary", "analyze", "--input"])
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains(SESSION))
            .stdout(predicate::str::contains("2 points"));
    }

    #[test]
    fn events_file_receives_jsonl() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(2));
        let events = dir.path().join("events.jsonl");
        geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&input)
            .arg("--events")
            .arg(&events)
            .assert()
            .success();

        let content = std::fs::read_to_string(&events).unwrap();
        let names: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("analysis_started"));
        assert_eq!(names.last().map(String::as_str), Some("analysis_completed"));
    }

    #[test]
    fn same_seed_same_bytes() {
        let dir = TempDir::new().unwrap();
        let mut doc = input_doc(4);
        doc["requested_at"] = json!("2026-01-01T00:00:00Z");
        let input = write_json(dir.path(), "input.json", &doc);
        let run = || {
            geohis(dir.path())
                .args(["analyze", "--seed", "5", "--input"])
                .arg(&input)
                .assert()
                .success()
                .get_output()
                .stdout
                .clone()
        };
        assert_eq!(run(), run());
    }
}

mod exit_codes {
    use super::*;

    #[test]
    fn empty_point_set_is_malformed() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &json!({ "points": [] }));
        let output = geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&input)
            .assert()
            .code(2)
            .get_output()
            .clone();
        assert_eq!(stderr_json(&output)["kind"], "MalformedInput");
    }

    #[test]
    fn unreadable_input_is_malformed() {
        let dir = TempDir::new().unwrap();
        geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(dir.path().join("missing.json"))
            .assert()
            .code(2);

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ points: ").unwrap();
        geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&garbage)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("MalformedInput"));
    }

    #[test]
    fn bad_bbox_is_malformed() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(2));
        geohis(dir.path())
            .args(["analyze", "--study-area", "6.1,5.4,-0.5", "--input"])
            .arg(&input)
            .assert()
            .code(2);
    }

    #[test]
    fn inconsistent_pairwise_override_exits_three() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(3));
        let weights = write_json(
            dir.path(),
            "weights.json",
            &json!({
                "flood_pairwise": {
                    "factors": ["elevation", "slope", "land_use"],
                    "matrix": [[1.0, 9.0, 1.0], [0.1111111111111111, 1.0, 9.0], [1.0, 0.1111111111111111, 1.0]]
                }
            }),
        );
        let output = geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&input)
            .arg("--weights")
            .arg(&weights)
            .assert()
            .code(3)
            .get_output()
            .clone();
        let failure = stderr_json(&output);
        assert_eq!(failure["kind"], "InconsistentJudgments");
        assert_eq!(failure["stage"], "weighting");
        assert_eq!(failure["context"]["matrix"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn too_few_inventory_samples_exits_four() {
        let dir = TempDir::new().unwrap();
        let mut doc = input_doc(10);
        let inventory: serde_json::Map<String, Value> = (0..10)
            .map(|i| (format!("p{:02}", i), json!(u8::from(i < 4))))
            .collect();
        doc["inventory"] = Value::Object(inventory);
        let input = write_json(dir.path(), "input.json", &doc);

        let output = geohis(dir.path())
            .args(["analyze", "--input"])
            .arg(&input)
            .assert()
            .code(4)
            .get_output()
            .clone();
        assert_eq!(stderr_json(&output)["kind"], "InsufficientSamples");
    }

    #[test]
    fn missing_config_file_is_malformed() {
        let dir = TempDir::new().unwrap();
        let input = write_json(dir.path(), "input.json", &input_doc(2));
        geohis(dir.path())
            .arg("--config")
            .arg(dir.path().join("nope.json"))
            .args(["analyze", "--input"])
            .arg(&input)
            .assert()
            .code(2);
    }
}

mod config {
    use super::*;

    #[test]
    fn show_reports_builtin_defaults() {
        let dir = TempDir::new().unwrap();
        let output = geohis(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let json: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["source"]["source"], "builtin default");
        assert!(json["config"]["flood"].is_object());
    }

    #[test]
    fn validate_accepts_written_defaults() {
        let dir = TempDir::new().unwrap();
        let shown = geohis(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let json: Value = serde_json::from_slice(&shown).unwrap();
        let path = write_json(dir.path(), "engine.json", &json["config"]);

        geohis(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"status\":\"valid\""));
    }

    #[test]
    fn validate_rejects_broken_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{ not json").unwrap();
        geohis(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(2);
    }
}

mod schema {
    use super::*;

    #[test]
    fn list_names_result_types() {
        let dir = TempDir::new().unwrap();
        geohis(dir.path())
            .args(["schema", "--list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("AnalysisResult"))
            .stdout(predicate::str::contains("ValidationReport"));
    }

    #[test]
    fn prints_named_schema() {
        let dir = TempDir::new().unwrap();
        let output = geohis(dir.path())
            .args(["schema", "AnalysisResult"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let schema: Value = serde_json::from_slice(&output).unwrap();
        assert!(schema["properties"]["flood_scores"].is_object());
    }

    #[test]
    fn unknown_schema_is_malformed() {
        let dir = TempDir::new().unwrap();
        geohis(dir.path())
            .args(["schema", "NoSuchType"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("NoSuchType"));
    }
}
