use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ambient_cli"))
}

fn fixture_file(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8(stdout.to_vec())
        .expect("stdout UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ambient-cli-{}-{}", std::process::id(), name))
}

#[test]
fn interpolate_reports_coverage() {
    let output = cli()
        .args([
            "interpolate",
            "--profile",
            &fixture_file("linear.profile"),
            "--lux",
            "500",
            "1000",
            "2000",
        ])
        .output()
        .expect("failed to run ambient_cli interpolate");
    assert!(output.status.success());

    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["brightness"], 128);
    assert_eq!(lines[1]["brightness"], 255);
    assert!(lines[2]["brightness"].is_null());
}

#[test]
fn simulate_steady_trace_commits() {
    let output = cli()
        .args([
            "simulate",
            "--profile",
            &fixture_file("linear.profile"),
            "--trace",
            &fixture_file("steady.trace"),
            "--period-ms",
            "0",
        ])
        .output()
        .expect("failed to run ambient_cli simulate");
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output.stdout);
    let outcome = lines.last().expect("outcome line");
    assert_eq!(outcome["outcome"], "committed");
    assert_eq!(outcome["brightness"], 128);
    assert!(
        lines.iter().any(|line| line["mode"] == "average"),
        "expected at least one progress line"
    );
}

#[test]
fn simulate_constant_lux_without_period_fills_buffer() {
    let output = cli()
        .args([
            "simulate",
            "--profile",
            &fixture_file("linear.profile"),
            "--lux",
            "500",
            "--period-ms",
            "0",
        ])
        .output()
        .expect("failed to run constant simulate");
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output.stdout);
    let outcome = lines.last().expect("outcome line");
    assert_eq!(outcome["outcome"], "committed");
    assert_eq!(outcome["brightness"], 128);
    assert_eq!(outcome["snapshot"]["count"], 6);
}

#[test]
fn simulate_flicker_times_out() {
    let config_path = temp_path("flicker.json");
    std::fs::write(&config_path, r#"{ "session": { "max_session_ms": 2000 } }"#).unwrap();

    let output = cli()
        .args([
            "--config",
            &config_path.to_string_lossy(),
            "simulate",
            "--profile",
            &fixture_file("linear.profile"),
            "--trace",
            &fixture_file("flicker.trace"),
            "--period-ms",
            "0",
        ])
        .output()
        .expect("failed to run flicker simulate");
    assert_eq!(output.status.code(), Some(2));

    let lines = json_lines(&output.stdout);
    assert_eq!(lines.last().unwrap()["outcome"], "timed_out");
    let _ = std::fs::remove_file(config_path);
}

#[test]
fn import_then_list_profiles() {
    let dir = temp_path("profiles");
    let _ = std::fs::remove_dir_all(&dir);
    let dir_arg = dir.to_string_lossy().into_owned();

    let import = cli()
        .args([
            "import",
            "--name",
            "office",
            "--dir",
            &dir_arg,
            &fixture_file("office.profile"),
        ])
        .output()
        .expect("failed to run import");
    assert!(import.status.success());

    let stored = std::fs::read_to_string(dir.join("office")).unwrap();
    assert_eq!(stored.lines().count(), 5);

    let list = cli()
        .args(["profiles", "--dir", &dir_arg])
        .output()
        .expect("failed to run profiles");
    let stdout = String::from_utf8(list.stdout).unwrap();
    assert!(stdout.contains("office (5 points)"), "got {stdout}");
    let _ = std::fs::remove_dir_all(dir);
}
