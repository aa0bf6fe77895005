//! Prediction output tests.
//!
//! Runs `predict` end to end against a randomly initialised checkpoint and
//! checks the JSON/JSONL output shape.

#![allow(clippy::unwrap_used)]
#![allow(deprecated)] // cargo_bin deprecation

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use predicates::prelude::*;
use rt_gene_core::{BackboneVariant, DualBranchGazeRegressor, ModelConfig};
use rt_gene_test_support::SyntheticEyeBuilder;
use serde_json::Value;

/// Runs the binary inside `home` so no user config leaks in.
fn rt_gene(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rt-gene").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"));
    cmd
}

/// Saves a randomly initialised ResNet-18 regressor.
fn write_checkpoint(dir: &Path, num_outputs: usize) -> PathBuf {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = ModelConfig::new(BackboneVariant::Resnet18).with_num_outputs(num_outputs);
    DualBranchGazeRegressor::new(config, vb).unwrap();

    let path = dir.join(format!("gaze_{num_outputs}.safetensors"));
    varmap.save(&path).unwrap();
    path
}

/// Writes `n` left/right eye pairs and returns their paths.
fn write_eyes(dir: &Path, n: usize) -> Vec<(PathBuf, PathBuf)> {
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f32 * 0.5 - 0.5;
            let eye = SyntheticEyeBuilder::eye_looking(60, 36, offset);
            (
                SyntheticEyeBuilder::write(&eye, dir, &format!("left_{i:06}_rgb.png")).unwrap(),
                SyntheticEyeBuilder::write(&eye, dir, &format!("right_{i:06}_rgb.png")).unwrap(),
            )
        })
        .collect()
}

fn predict(home: &Path, checkpoint: &Path, pairs: &[(PathBuf, PathBuf)]) -> Command {
    let mut cmd = rt_gene(home);
    cmd.args(["predict", "--variant", "resnet18", "--checkpoint"])
        .arg(checkpoint);
    for (left, right) in pairs {
        cmd.arg("--left").arg(left).arg("--right").arg(right);
    }
    cmd
}

// === JSONL Format Tests ===

#[test]
fn test_jsonl_one_prediction_per_pair() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 2);

    let output = predict(home.path(), &checkpoint, &pairs)
        .args(["--head-pose", "0.1,-0.2", "--head-pose", "0,0.3"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    for (value, (left, right)) in lines.iter().zip(&pairs) {
        assert_eq!(value["left"], left.display().to_string());
        assert_eq!(value["right"], right.display().to_string());
        assert_eq!(value["variant"], "resnet18");
        assert_eq!(value["outputs"].as_array().unwrap().len(), 2);
        assert!(value["gaze"]["pitch"].as_f64().unwrap().is_finite());
        assert!(value["gaze"]["yaw"].as_f64().unwrap().is_finite());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }
    assert!((lines[0]["head_pose"]["yaw"].as_f64().unwrap() + 0.2).abs() < 1e-6);
    assert!((lines[1]["head_pose"]["yaw"].as_f64().unwrap() - 0.3).abs() < 1e-6);
}

#[test]
fn test_untrained_checkpoint_is_deterministic() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 1);

    let run = || {
        let output = predict(home.path(), &checkpoint, &pairs)
            .args(["--head-pose", "0,0"])
            .output()
            .unwrap();
        let value: Value = serde_json::from_slice(&output.stdout).unwrap();
        value["outputs"].clone()
    };
    assert_eq!(run(), run());
}

// === JSON Format Tests ===

#[test]
fn test_json_array_pretty() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 3);

    let output = predict(home.path(), &checkpoint, &pairs)
        .args(["--format", "json", "--pretty", "--head-pose", "0,0"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with('['));
    assert!(stdout.contains("\n  "));
    let value: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 3);
}

#[test]
fn test_project_config_selects_json() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 1);
    std::fs::write(home.path().join(".rt-gene.toml"), "[output]\nformat = 'json'\n").unwrap();

    predict(home.path(), &checkpoint, &pairs)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["));

    predict(home.path(), &checkpoint, &pairs)
        .args(["--format", "jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"));
}

// === Output Width ===

#[test]
fn test_extra_outputs_omit_gaze() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 3);
    let pairs = write_eyes(home.path(), 1);

    let output = predict(home.path(), &checkpoint, &pairs)
        .args(["--num-outputs", "3"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["outputs"].as_array().unwrap().len(), 3);
    assert!(value.get("gaze").is_none());
}

// === Failure Modes ===

#[test]
fn test_checkpoint_variant_mismatch_fails() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 1);

    let mut cmd = rt_gene(home.path());
    cmd.args(["predict", "--variant", "resnet50", "--checkpoint"])
        .arg(&checkpoint)
        .arg("--left")
        .arg(&pairs[0].0)
        .arg("--right")
        .arg(&pairs[0].1);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load checkpoint"));
}

#[test]
fn test_init_head_on_checkpoint_fails() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let pairs = write_eyes(home.path(), 1);

    predict(home.path(), &checkpoint, &pairs)
        .arg("--init-head")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot re-initialise"));
}

#[test]
fn test_missing_eye_image_fails() {
    let home = tempfile::tempdir().unwrap();
    let checkpoint = write_checkpoint(home.path(), 2);
    let missing = vec![(home.path().join("nope.png"), home.path().join("nope.png"))];

    predict(home.path(), &checkpoint, &missing)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nope.png"));
}

#[test]
#[ignore = "downloads ResNet-18 weights from the Hugging Face hub"]
fn test_predict_with_pretrained_backbones() {
    let home = tempfile::tempdir().unwrap();
    let pairs = write_eyes(home.path(), 1);

    rt_gene(home.path())
        .args(["predict", "--variant", "resnet18", "--init-head", "--head-pose", "0,0"])
        .arg("--left")
        .arg(&pairs[0].0)
        .arg("--right")
        .arg(&pairs[0].1)
        .assert()
        .success()
        .stderr(predicate::str::contains("untrained"));
}
