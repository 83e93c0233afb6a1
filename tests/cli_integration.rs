//! CLI integration tests for extbuild.
//!
//! These tests drive the binary against small shell scripts standing in for
//! compilers and the host interpreter.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the extbuild binary command, isolated from user configuration.
fn extbuild(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("extbuild").unwrap();
    cmd.env("HOME", home).env_remove("EXTBUILD_PYTHON").current_dir(home);
    cmd
}

/// Create a temporary directory for test projects.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// A compiler that logs its arguments, answers `--version` like GCC,
/// prints a dependency rule for `-M` and creates the `-o` output.
fn fake_compiler(dir: &Path) -> PathBuf {
    write_script(
        &dir.join("fake-g++"),
        r#"
echo "$@" >> "$(dirname "$0")/invocations.log"
if [ "$1" = "--version" ]; then
    echo "g++ (GCC) 11.2.0"
    echo "Copyright (C) 2021 Free Software Foundation, Inc."
    exit 0
fi
out=""
prev=""
for arg in "$@"; do
    if [ "$arg" = "-M" ]; then
        echo "a.o: a.cpp \\"
        echo " include/a.h include/b.h"
        exit 0
    fi
    if [ "$prev" = "-o" ]; then
        out="$arg"
    fi
    prev="$arg"
done
if [ -n "$out" ]; then
    : > "$out"
fi
"#,
    )
}

fn failing_compiler(dir: &Path) -> PathBuf {
    write_script(
        &dir.join("broken-g++"),
        "echo \"a.cpp:1:1: error: expected ';'\" >&2\nexit 1\n",
    )
}

fn invocations(dir: &Path) -> String {
    fs::read_to_string(dir.join("invocations.log")).unwrap_or_default()
}

/// A fake interpreter whose build Makefile names `compiler`.
fn fake_python(dir: &Path, compiler: &Path) -> PathBuf {
    let makefile = dir.join("Makefile");
    fs::write(
        &makefile,
        format!(
            "VERSION=3.11\n\
             SOABI=cpython-311-x86_64-linux-gnu\n\
             EXT_SUFFIX=.cpython-311-x86_64-linux-gnu.so\n\
             CXX={}\n\
             CFLAGS=-Wall -Wstrict-prototypes -O2 -DNDEBUG\n\
             CFLAGSFORSHARED=-fPIC\n\
             LDSHARED=gcc -shared\n\
             INCLUDEPY=/usr/include/python3.11\n\
             LIBDIR=/usr/lib\n",
            compiler.display()
        ),
    )
    .unwrap();

    write_script(
        &dir.join("fake-python"),
        &format!("echo {}\n", makefile.display()),
    )
}

// ============================================================================
// extbuild build
// ============================================================================

#[test]
fn test_build_object_with_explicit_compiler() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());

    extbuild(tmp.path())
        .args(["build", "--object", "-o", "mod", "-I", "include", "-D", "FAST", "a.cpp"])
        .arg("--cc")
        .arg(&cc)
        .assert()
        .success()
        .stdout(predicate::str::ends_with("mod.o\n"));

    assert!(tmp.path().join("mod.o").exists());
    let log = invocations(tmp.path());
    assert!(log.contains("-fPIC -c -DFAST -Iinclude a.cpp -o mod.o"));
}

#[test]
fn test_build_extension_with_optimization() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());

    extbuild(tmp.path())
        .args(["build", "--extension", "-o", "mod.so", "--opt", "3", "a.cpp"])
        .arg("--cc")
        .arg(&cc)
        .assert()
        .success();

    let log = invocations(tmp.path());
    assert!(log.contains("--version"));
    assert!(log.contains("-fPIC -O3 -DNDEBUG -march=native -mtune=native -shared a.cpp -o mod.so"));
}

#[test]
fn test_build_debug_echoes_command() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());

    extbuild(tmp.path())
        .args(["build", "--link", "--debug", "-o", "mod.so", "a.o", "b.o"])
        .arg("--cc")
        .arg(&cc)
        .assert()
        .success()
        .stderr(predicate::str::contains("-shared a.o b.o -o mod.so"));
}

#[test]
fn test_build_failure_reports_command_line() {
    let tmp = temp_dir();
    let cc = failing_compiler(tmp.path());

    extbuild(tmp.path())
        .args(["build", "--object", "-o", "mod.o", "a.cpp"])
        .arg("--cc")
        .arg(&cc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("-c a.cpp -o mod.o"))
        .stderr(predicate::str::contains("expected ';'"));
}

#[test]
fn test_build_requires_a_mode() {
    let tmp = temp_dir();

    extbuild(tmp.path())
        .args(["build", "-o", "mod.o", "a.cpp"])
        .assert()
        .failure();
}

#[test]
fn test_build_rejects_invalid_opt_level() {
    let tmp = temp_dir();

    extbuild(tmp.path())
        .args(["build", "--object", "--opt", "fast", "-o", "mod.o", "a.cpp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid optimization level"));
}

// ============================================================================
// extbuild deps
// ============================================================================

#[test]
fn test_deps_lists_headers() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());

    extbuild(tmp.path())
        .args(["deps", "a.cpp"])
        .arg("--cc")
        .arg(&cc)
        .assert()
        .success()
        .stdout("a.cpp\ninclude/a.h\ninclude/b.h\n");
}

// ============================================================================
// extbuild show
// ============================================================================

#[test]
fn test_show_discovers_toolchain() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());
    let python = fake_python(tmp.path(), &cc);

    extbuild(tmp.path())
        .env("EXTBUILD_PYTHON", &python)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Toolchain (gcc)"))
        .stdout(predicate::str::contains("-Wall -O2 -fPIC"))
        .stdout(predicate::str::contains("Version:     11.2.0"))
        .stdout(predicate::str::contains("Fingerprint:"))
        .stdout(predicate::str::contains("-Wstrict-prototypes").not());
}

#[test]
fn test_show_json() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());
    let python = fake_python(tmp.path(), &cc);

    let output = extbuild(tmp.path())
        .env("EXTBUILD_PYTHON", &python)
        .args(["show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["version"], "11.2.0");
    assert_eq!(json["fingerprint"]["host_version"], "cpython-311-x86_64-linux-gnu");
    assert_eq!(json["digest"].as_str().unwrap().len(), 64);
}

#[test]
fn test_show_uses_project_config() {
    let tmp = temp_dir();
    let cc = fake_compiler(tmp.path());
    let python = fake_python(tmp.path(), Path::new("/nonexistent/c++"));

    let config_dir = tmp.path().join(".extbuild");
    fs::create_dir(&config_dir).unwrap();
    fs::write(
        config_dir.join("toolchain.toml"),
        format!(
            "[discovery]\npython = \"{}\"\ncc = \"{}\"\n",
            python.display(),
            cc.display()
        ),
    )
    .unwrap();

    extbuild(tmp.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("fake-g++"));
}

#[test]
fn test_show_fails_for_unknown_compiler() {
    let tmp = temp_dir();
    let cc = write_script(&tmp.path().join("mystery-cc"), "echo \"mystery 1.0\"\n");
    let python = fake_python(tmp.path(), &cc);

    extbuild(tmp.path())
        .env("EXTBUILD_PYTHON", &python)
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown compiler"));
}
