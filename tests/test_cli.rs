mod fixtures;

use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn ptom_dump() -> Command {
    Command::new(assert_cmd::cargo_bin!("ptom_dump"))
}

#[test]
fn it_writes_next_to_input_by_default() {
    let d = tempdir().unwrap();
    let input = function_container().write_to(d.path(), "absval.p");

    ptom_dump()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved to"));

    let written = fs::read_to_string(d.path().join("absval.m")).unwrap();
    assert!(written.starts_with("function y=absval(x)\n    if x>0\n"));
}

#[test]
fn it_respects_output_target() {
    let d = tempdir().unwrap();
    let input = assignment_container().write_to(d.path(), "x.p");
    let f = d.path().join("nested").join("dir").join("x_out.m");

    ptom_dump()
        .args(["-f", &f.to_string_lossy(), input.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&f).unwrap(), "x=1;\n");
}

#[test]
fn it_prints_to_stdout() {
    let d = tempdir().unwrap();
    let input = assignment_container().write_to(d.path(), "x.p");

    ptom_dump()
        .args(["--stdout", "--raw", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout("x=1; ");

    assert!(!d.path().join("x.m").exists());
}

#[test]
fn test_it_refuses_to_overwrite_directory() {
    let d = tempdir().unwrap();
    let input = assignment_container().write_to(d.path(), "x.p");

    ptom_dump()
        .args(["-f", &d.path().to_string_lossy(), input.to_str().unwrap()])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_it_does_not_overwrite_without_confirmation() {
    let d = tempdir().unwrap();
    let input = assignment_container().write_to(d.path(), "x.p");
    let f = d.path().join("x.m");
    fs::write(&f, "I'm a file!").unwrap();

    // No terminal to confirm on, so the prompt cannot succeed.
    ptom_dump().arg(&input).assert().failure();

    assert_eq!(fs::read_to_string(&f).unwrap(), "I'm a file!");
}

#[test]
fn test_it_overwrites_file_anyways_if_passed_flag() {
    let d = tempdir().unwrap();
    let input = assignment_container().write_to(d.path(), "x.p");
    let f = d.path().join("x.m");
    fs::write(&f, "I'm a file!").unwrap();

    ptom_dump()
        .args(["--no-confirm-overwrite", input.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&f).unwrap(), "x=1;\n");
}

#[test]
fn it_exits_with_status_of_failure_kind() {
    let d = tempdir().unwrap();
    let short = d.path().join("short.p");
    fs::write(&short, b"v01.00").unwrap();

    ptom_dump()
        .arg(&short)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid p-file header"));

    let corrupt = assignment_container()
        .raw_payload(vec![0xff; 40])
        .write_to(d.path(), "corrupt.p");

    ptom_dump().arg(&corrupt).assert().code(4);
}

#[test]
fn it_converts_several_inputs() {
    let d = tempdir().unwrap();
    let a = assignment_container().write_to(d.path(), "a.p");
    let b = function_container().write_to(d.path(), "b.p");
    let bad = d.path().join("missing.p");

    ptom_dump()
        .args(["-t", "2"])
        .args([&a, &bad, &b])
        .assert()
        .code(2);

    assert_eq!(fs::read_to_string(d.path().join("a.m")).unwrap(), "x=1;\n");
    assert!(d.path().join("b.m").exists());
}

#[test]
fn it_rejects_output_target_with_several_inputs() {
    let d = tempdir().unwrap();
    let a = assignment_container().write_to(d.path(), "a.p");
    let b = assignment_container().write_to(d.path(), "b.p");

    ptom_dump()
        .args(["-f", "out.m"])
        .args([&a, &b])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single input"));
}

#[cfg(unix)]
#[test]
fn it_exits_with_cancelled_status_on_interrupt() {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;

    let d = tempdir().unwrap();
    // Reading from a fifo blocks until we feed it, which holds the conversion mid-run.
    let input = d.path().join("slow.p");
    let status = Command::new("mkfifo").arg(&input).status().unwrap();
    assert!(status.success());

    let mut child = ptom_dump()
        .args(["-vv", input.to_str().unwrap()])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stderr = BufReader::new(child.stderr.take().unwrap());

    let mut wait_for = |needle: &str| {
        let mut line = String::new();
        loop {
            line.clear();
            let read = stderr.read_line(&mut line).unwrap();
            assert_ne!(read, 0, "ptom_dump exited before printing `{needle}`");
            if line.contains(needle) {
                break;
            }
        }
    };

    wait_for("Installed interrupt handler");
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
    wait_for("Interrupted, cancelling");

    fs::write(&input, assignment_container().build()).unwrap();

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));
    assert!(!d.path().join("slow.m").exists());
}
