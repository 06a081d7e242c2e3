use std::process::Command;

use crate::{uring_available, write_file};

fn wordstats() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wordstats"));
    cmd.env_remove("WORDSTATS_LOG");
    cmd
}

#[test]
fn prints_one_line_per_file_in_order() {
    if !uring_available() {
        return;
    }
    let tmp = tempfile::tempdir().expect("create temp dir");
    let a = write_file(tmp.path(), "a.txt", b"abcd\nef\n");
    let b = write_file(tmp.path(), "b.txt", b"\n");

    let output = wordstats()
        .args(["--workers", "2"])
        .arg(&a)
        .arg(&b)
        .output()
        .expect("run wordstats");

    assert!(
        output.status.success(),
        "wordstats failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!("Average word length in {} is 3", a.display()),
            format!("Average word length in {} is 0", b.display()),
        ]
    );
}

#[test]
fn file_without_newlines_is_reported_as_not_available() {
    if !uring_available() {
        return;
    }
    let tmp = tempfile::tempdir().expect("create temp dir");
    let f = write_file(tmp.path(), "flat.txt", b"no newline here");

    let output = wordstats().arg(&f).output().expect("run wordstats");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is n/a (no newlines)"), "{stdout}");
}

#[test]
fn missing_file_exits_non_zero_and_names_it() {
    if !uring_available() {
        return;
    }
    let tmp = tempfile::tempdir().expect("create temp dir");
    let ok = write_file(tmp.path(), "ok.txt", b"x\n");
    let missing = tmp.path().join("nope.txt");

    let output = wordstats()
        .arg(&ok)
        .arg(&missing)
        .output()
        .expect("run wordstats");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "no partial output expected");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.txt"), "{stderr}");
}

#[test]
fn keep_going_reports_survivors_and_fails() {
    if !uring_available() {
        return;
    }
    let tmp = tempfile::tempdir().expect("create temp dir");
    let ok = write_file(tmp.path(), "ok.txt", b"xy\n");
    let missing = tmp.path().join("nope.txt");

    let output = wordstats()
        .arg("--keep-going")
        .arg(&missing)
        .arg(&ok)
        .output()
        .expect("run wordstats");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim_end(),
        format!("Average word length in {} is 2", ok.display())
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.txt"), "{stderr}");
}

#[test]
fn no_files_is_a_usage_error() {
    let output = wordstats().output().expect("run wordstats");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn logs_go_to_stderr() {
    if !uring_available() {
        return;
    }
    let tmp = tempfile::tempdir().expect("create temp dir");
    let f = write_file(tmp.path(), "f.txt", b"a\n");

    let output = wordstats()
        .args(["--log-level", "debug"])
        .arg(&f)
        .output()
        .expect("run wordstats");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("file done"), "{stderr}");
}
