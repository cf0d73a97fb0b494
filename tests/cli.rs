//! End-to-end tests driving the wasmstow binary against temporary trees.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("wasmstow").unwrap()
}

/// A working directory carrying build-output evidence, so sessions survive
/// between invocations instead of being reset as a fresh build.
fn working_dir_with_evidence() -> TempDir {
    let dir = TempDir::new().unwrap();
    let unit = dir.path().join("obj").join("unit-a");
    fs::create_dir_all(&unit).unwrap();
    fs::write(unit.join("unit-a.pkgobj"), b"").unwrap();
    dir
}

fn spec_tree(root: &Path) {
    fs::create_dir_all(root.join("one/2.5/3.75")).unwrap();
    fs::create_dir_all(root.join("one/two/3.5/four")).unwrap();
    fs::create_dir_all(root.join("one/two/three/four")).unwrap();
}

#[test]
fn help_lists_the_command_surface() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("components"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("preprocess"));
}

#[test]
fn components_help_lists_the_dependency_operations() {
    cmd()
        .args(["components", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all-deps"))
        .stdout(predicate::str::contains("unique-deps"))
        .stdout(predicate::str::contains("target-with-all-deps"))
        .stdout(predicate::str::contains("target-with-unique-deps"))
        .stdout(predicate::str::contains("transformed-config"))
        .stdout(predicate::str::contains("staged-tree"));
}

#[test]
fn directory_markup_matches_the_tree() {
    let tree = TempDir::new().unwrap();
    spec_tree(tree.path());
    let out_dir = TempDir::new().unwrap();

    let mut assert = cmd()
        .args(["build", "directories"])
        .arg(tree.path())
        .args(["--with-prefix", "PREFIX"])
        .args(["--out-dir"])
        .arg(out_dir.path())
        .assert()
        .success();

    for id in [
        "PREFIX_ONE",
        "PREFIX_ONE_2_5",
        "PREFIX_ONE_2_5_3_75",
        "PREFIX_ONE_TWO",
        "PREFIX_ONE_TWO_3_5",
        "PREFIX_ONE_TWO_3_5_FOUR",
        "PREFIX_ONE_TWO_THREE",
        "PREFIX_ONE_TWO_THREE_FOUR",
    ] {
        assert = assert.stdout(predicate::str::contains(format!("Id='{id}'")));
    }
}

#[test]
fn missing_module_surfaces_as_an_inline_error_marker() {
    let out_dir = TempDir::new().unwrap();

    cmd()
        .args(["components", "unique-deps", "no-such-module.wasm", "--out-dir"])
        .arg(out_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("<?error wasmstow:"))
        .stdout(predicate::str::contains("no-such-module.wasm"));
}

#[test]
fn staged_tree_emits_components_and_honors_ignores() {
    let staged = TempDir::new().unwrap();
    fs::create_dir_all(staged.path().join("assets")).unwrap();
    fs::write(staged.path().join("index.html"), b"<html/>").unwrap();
    fs::write(staged.path().join("assets").join("style.css"), b"body{}").unwrap();
    fs::write(staged.path().join("assets").join("debug.log"), b"junk").unwrap();
    let out_dir = TempDir::new().unwrap();

    cmd()
        .args(["components", "staged-tree"])
        .arg(staged.path())
        .args([
            "--root-directory",
            "SITE_ROOT",
            "--in-directories-with-prefix",
            "SITE",
            "--ignore-extensions",
            ".log",
        ])
        .args(["--out-dir"])
        .arg(out_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Directory='SITE_ROOT'"))
        .stdout(predicate::str::contains("Directory='SITE_ASSETS'"))
        .stdout(predicate::str::contains("style.css"))
        .stdout(predicate::str::contains("debug.log").not());
}

#[test]
fn staged_tree_paths_deduplicate_across_invocations() {
    let working_dir = working_dir_with_evidence();
    let staged = TempDir::new().unwrap();
    fs::create_dir_all(staged.path().join("assets")).unwrap();
    fs::write(staged.path().join("assets").join("style.css"), b"body{}").unwrap();
    let out_dir = TempDir::new().unwrap();

    let run = |check: fn(&str)| {
        let output = cmd()
            .current_dir(working_dir.path())
            .args(["components", "staged-tree"])
            .arg(staged.path())
            .args(["--root-directory", "SITE_ROOT", "--in-directories-with-prefix", "SITE"])
            .args(["--out-dir"])
            .arg(out_dir.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        check(&String::from_utf8_lossy(&output.stdout));
    };

    run(|stdout| assert_eq!(stdout.matches("<Component").count(), 1));
    run(|stdout| {
        assert_eq!(
            stdout.matches("<Component").count(),
            0,
            "second invocation sees the persisted path set"
        );
    });

    assert!(out_dir.path().join("session.txt").is_file());
}

#[test]
fn transformed_config_merges_and_emits_one_component() {
    let dir = TempDir::new().unwrap();
    let module = dir.path().join("app.wasm");
    fs::write(dir.path().join("app.wasm.toml"), "flag = \"WRONG\"\n").unwrap();
    fs::write(dir.path().join("config.release.toml"), "flag = \"CORRECT\"\n").unwrap();
    let out_dir = TempDir::new().unwrap();

    cmd()
        .args(["components", "transformed-config"])
        .arg(&module)
        .args(["--with-id", "AppConfig", "--in", "INSTALLFOLDER"])
        .args(["--out-dir"])
        .arg(out_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Id='AppConfig'"))
        .stdout(predicate::str::contains("file_AppConfig"))
        .stdout(predicate::str::contains("Directory='INSTALLFOLDER'"));

    let merged = fs::read_to_string(dir.path().join("app.wasm.toml")).unwrap();
    assert!(merged.contains("CORRECT"));
}

#[test]
fn transformed_config_without_inputs_fails() {
    let out_dir = TempDir::new().unwrap();

    cmd()
        .args(["components", "transformed-config", "missing.wasm"])
        .args(["--with-id", "X", "--out-dir"])
        .arg(out_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn preprocess_expands_directives_and_passes_the_rest_through() {
    let tree = TempDir::new().unwrap();
    fs::create_dir_all(tree.path().join("one")).unwrap();

    let source_dir = TempDir::new().unwrap();
    let source = source_dir.path().join("unit.src");
    fs::write(
        &source,
        format!(
            "<Fragment><?stow build.directoriesMatching \"{}\" withPrefix \"P\"?></Fragment>\n",
            tree.path().display()
        ),
    )
    .unwrap();
    let out_dir = TempDir::new().unwrap();

    cmd()
        .arg("preprocess")
        .arg(&source)
        .args(["--out-dir"])
        .arg(out_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("<Fragment><Directory Id='P_ONE'"))
        .stdout(predicate::str::contains("<?stow").not());
}

#[test]
fn preprocess_writes_to_the_output_file_when_asked() {
    let source_dir = TempDir::new().unwrap();
    let source = source_dir.path().join("unit.src");
    fs::write(&source, "plain text, no directives\n").unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = source_dir.path().join("unit.expanded");

    cmd()
        .arg("preprocess")
        .arg(&source)
        .args(["--out-dir"])
        .arg(out_dir.path())
        .args(["-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "plain text, no directives\n"
    );
}
