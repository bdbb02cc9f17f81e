//! Integration tests for disarm-cli.
//!
//! Note: Tests use `unwrap`/`expect` which is acceptable in test code.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

fn disarm_cmd() -> Command {
    cargo_bin_cmd!("disarm")
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_version_flag() {
    disarm_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("disarm"));
}

#[test]
fn test_help_flag() {
    disarm_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Command-line utility"));
}

#[test]
fn test_scan_help() {
    disarm_cmd()
        .arg("scan")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scan a file"));
}

#[test]
fn test_scan_clean_text_file() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("note.txt");
    fs::write(&input, "nothing to see here").unwrap();

    disarm_cmd()
        .arg("scan")
        .arg(&input)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("clean"));
}

#[test]
fn test_scan_reports_cleaned_html() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("page.html");
    fs::write(&input, "<p>ok</p><script>evil()</script>").unwrap();

    disarm_cmd()
        .arg("scan")
        .arg(&input)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("cleaned"));
}

#[test]
fn test_scan_directory_is_rejected() {
    let temp = TempDir::new().expect("failed to create temp dir");

    disarm_cmd()
        .arg("scan")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("is a directory"));
}

#[test]
fn test_clean_rewrites_html_file() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("page.html");
    let output = temp.path().join("page.clean.html");
    fs::write(&input, "<p>ok</p><script>evil()</script>").unwrap();

    disarm_cmd()
        .arg("clean")
        .arg(&input)
        .arg(&output)
        .assert()
        .code(1);

    assert_eq!(fs::read(&output).unwrap(), b"<p>ok</p>");
}

#[test]
fn test_clean_blocked_input_writes_nothing() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("blob.bin");
    let output = temp.path().join("blob.clean.bin");
    fs::write(&input, [0u8, 1, 2, 200, 9]).unwrap();

    disarm_cmd()
        .arg("clean")
        .arg(&input)
        .arg(&output)
        .assert()
        .code(2);

    assert!(!output.exists());
}

#[test]
fn test_clean_permissive_passes_unknown_binary() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("blob.bin");
    let output = temp.path().join("blob.clean.bin");
    fs::write(&input, [0u8, 1, 2, 200, 9]).unwrap();

    disarm_cmd()
        .arg("clean")
        .arg("--permissive")
        .arg(&input)
        .arg(&output)
        .assert()
        .code(0);

    assert_eq!(fs::read(&output).unwrap(), [0u8, 1, 2, 200, 9]);
}

#[test]
fn test_clean_refuses_existing_output() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("note.txt");
    let output = temp.path().join("out.txt");
    fs::write(&input, "hello").unwrap();
    fs::write(&output, "already here").unwrap();

    disarm_cmd()
        .arg("clean")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(fs::read(&output).unwrap(), b"already here");
}

#[test]
fn test_clean_zip_with_scripted_member() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("bundle.zip");
    let output = temp.path().join("bundle.clean.zip");
    fs::write(
        &input,
        build_zip(&[
            ("a.txt", b"plain"),
            ("p.html", b"<b>hi</b><script>evil()</script>"),
        ]),
    )
    .unwrap();

    disarm_cmd()
        .arg("clean")
        .arg(&input)
        .arg(&output)
        .assert()
        .code(1);

    let bytes = fs::read(&output).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut html = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("p.html").unwrap(), &mut html).unwrap();
    assert_eq!(html, "<b>hi</b>");
}

#[test]
fn test_clean_directory_tree() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let src = temp.path().join("src");
    let dest = temp.path().join("dest");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("a.txt"), "alpha").unwrap();

    disarm_cmd()
        .arg("clean")
        .arg(&src)
        .arg(&dest)
        .assert()
        .code(0);

    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
}

#[test]
fn test_scan_json_output_format() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("note.txt");
    fs::write(&input, "nothing to see here").unwrap();

    let output = disarm_cmd()
        .arg("scan")
        .arg("--json")
        .arg(&input)
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).expect("invalid JSON output");
    assert_eq!(json["status"], "success");
    assert_eq!(json["operation"], "scan");
    assert_eq!(json["data"]["status"], "clean");
    assert!(json["data"]["verdict"].is_object());
}

#[test]
fn test_max_depth_flag_blocks_nesting() {
    let temp = TempDir::new().expect("failed to create temp dir");
    let input = temp.path().join("nested.zip");
    let inner = build_zip(&[("a.txt", b"deep")]);
    fs::write(&input, build_zip(&[("inner.zip", inner.as_slice())])).unwrap();

    disarm_cmd()
        .arg("scan")
        .arg("--max-depth")
        .arg("1")
        .arg(&input)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("depth limit"));
}
