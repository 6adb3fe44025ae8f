//! CLI end-to-end tests
//!
//! Tests for the audiobinder command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

mod common;

/// Get a command for the audiobinder binary
#[allow(deprecated)]
fn audiobinder_cmd() -> Command {
    Command::cargo_bin("audiobinder").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = audiobinder_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = audiobinder_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("audiobinder"))
        .stdout(predicate::str::contains("bind"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = audiobinder_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("audiobinder"));
}

#[test]
fn test_cli_check_tools_lists_ffmpeg() {
    let mut cmd = audiobinder_cmd();
    // Exit status depends on the host; the report is printed either way.
    cmd.arg("check-tools")
        .assert()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_chapters_from_cue() {
    let dir = tempdir().unwrap();
    let cue = dir.path().join("book.cue");
    fs::write(&cue, common::TWO_CHAPTER_CUE).unwrap();

    let mut cmd = audiobinder_cmd();
    cmd.arg("chapters")
        .arg("--cue")
        .arg(&cue)
        .arg("--duration")
        .arg("600")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(";FFMETADATA1"))
        .stdout(predicate::str::contains(
            "[CHAPTER]\nTIMEBASE=1/10\nSTART=0\nEND=2100\ntitle=Intro\n",
        ))
        .stdout(predicate::str::contains(
            "[CHAPTER]\nTIMEBASE=1/10\nSTART=2100\nEND=6000\ntitle=Chapter One\n",
        ));
}

#[test]
fn test_cli_chapters_missing_cue_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("chapters")
        .arg("--cue")
        .arg(dir.path().join("missing.cue"))
        .arg("--duration")
        .arg("10")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CUE sheet"));
}

#[test]
fn test_cli_bind_missing_input_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("files")
        .arg("--input")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input directory does not exist"));
}

#[test]
fn test_cli_bind_rejects_bad_chapter_mode() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("tracks")
        .arg("--input")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown chapter mode"));
}

#[test]
fn test_cli_bind_rejects_zero_segment_length() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("files")
        .arg("--input")
        .arg(dir.path())
        .arg("--segment-secs")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("segment_length_secs"));
}

#[test]
fn test_cli_bind_requires_chapter_mode() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--input")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--chapters"));
}

#[test]
fn test_cli_bind_accepts_negative_one_bitrate() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("files")
        .arg("--input")
        .arg(dir.path())
        .arg("-b")
        .arg("-1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument").not())
        .stderr(predicate::str::contains("invalid value").not());
}

#[test]
fn test_cli_bind_rejects_huge_segment_length() {
    let dir = tempdir().unwrap();
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("files")
        .arg("--input")
        .arg(dir.path())
        .arg("-s")
        .arg("1e20")
        .assert()
        .failure()
        .stderr(predicate::str::contains("segment_length_secs is out of range"));
}

#[test]
fn test_cli_chapters_rejects_huge_duration() {
    let dir = tempdir().unwrap();
    let cue = dir.path().join("book.cue");
    fs::write(&cue, common::TWO_CHAPTER_CUE).unwrap();

    let mut cmd = audiobinder_cmd();
    cmd.arg("chapters")
        .arg("--cue")
        .arg(&cue)
        .arg("--duration")
        .arg("1e20")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid duration"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("audiobinder.toml");
    fs::write(
        &config_path,
        "[pipeline]\nsegment_length_secs = 300\nworkers = 2\nbitrate = \"source\"\n",
    )
    .unwrap();

    let mut cmd = audiobinder_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Workers: 2"))
        .stdout(predicate::str::contains("Bitrate: source"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "[pipeline]\nworkers = 0\n").unwrap();

    let mut cmd = audiobinder_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers"));
}

/// Full run against real ffmpeg, skipped when it is not installed.
#[test]
fn test_cli_bind_with_ffmpeg() {
    let (Ok(ffmpeg), Ok(_)) = (which::which("ffmpeg"), which::which("ffprobe")) else {
        eprintln!("ffmpeg not available, skipping");
        return;
    };

    let dir = tempdir().unwrap();
    for (i, freq) in [440, 660].iter().enumerate() {
        let path = dir.path().join(format!("{:02}.wav", i + 1));
        let status = Command::new(&ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
            .arg(format!("sine=frequency={}:duration=3", freq))
            .args(["-metadata", "album=Tone Book"])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success());
    }

    let out = dir.path().join("out");
    let mut cmd = audiobinder_cmd();
    cmd.arg("bind")
        .arg("--chapters")
        .arg("files")
        .arg("--input")
        .arg(dir.path())
        .arg("--output")
        .arg(&out)
        .arg("--segment-secs")
        .arg("2")
        .arg("--workers")
        .arg("2")
        .assert()
        .success();

    let books: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "m4b").unwrap_or(false))
        .collect();
    assert_eq!(books.len(), 1);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".audiobinder-"))
        .collect();
    assert!(leftovers.is_empty());
}
