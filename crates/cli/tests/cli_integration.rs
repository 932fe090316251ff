//! CLI integration tests for the `parse`, `check` and `generate` subcommands.
//!
//! Uses `assert_cmd` to spawn the `braid` binary and verify exit codes,
//! stdout content, and stderr content. Grammar and input fixtures are
//! written into a fresh `TempDir` per test.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PRIMARY: &str = "Grammar: Primary\nEmbeddedLanguages: Expr\n";
const RESOLVED: &str = "y = 1 @CONTEXT[Expr] y + 1 @ENDCONTEXT";
const UNRESOLVED: &str = "total = 1 @CONTEXT[Expr] y + 1 @ENDCONTEXT";

/// Helper: create a Command for the `braid` binary with logging silenced.
fn braid() -> Command {
    let mut cmd = cargo_bin_cmd!("braid");
    cmd.env_remove("BRAID_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Writes `primary.grammar` and `input.txt` into a new temp dir.
fn fixture(grammar: &str, input: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let g = write(tmp.path(), "primary.grammar", grammar);
    let i = write(tmp.path(), "input.txt", input);
    (tmp, g, i)
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    braid()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Braid context-sensitive parser and code generator",
        ));
}

#[test]
fn version_exits_0() {
    braid()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("braid"));
}

#[test]
fn unknown_subcommand_is_usage_error() {
    braid().arg("frobnicate").assert().code(2);
}

// ──────────────────────────────────────────────
// 2. parse
// ──────────────────────────────────────────────

#[test]
fn parse_text_lists_contexts_and_references() {
    let (_tmp, g, i) = fixture(PRIMARY, RESOLVED);
    braid()
        .args(["parse"])
        .arg(&g)
        .arg(&i)
        .assert()
        .success()
        .stdout(predicate::str::contains("Primary: "))
        .stdout(predicate::str::contains("Expr"))
        .stdout(predicate::str::contains("(resolved)"));
}

#[test]
fn parse_json_is_tagged_success() {
    let (_tmp, g, i) = fixture(PRIMARY, RESOLVED);
    let output = braid()
        .args(["--output", "json", "parse"])
        .arg(&g)
        .arg(&i)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["outcome"], "success");
    assert_eq!(json["grammar"], "Primary");
    let languages: Vec<&str> = json["contexts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["language"].as_str())
        .collect();
    assert!(languages.contains(&"Expr"));
}

#[test]
fn parse_context_only_skips_language_switching() {
    let (_tmp, g, i) = fixture(PRIMARY, "let x\nfn run { let y }");
    let output = braid()
        .args(["--output", "json", "parse", "--context-only"])
        .arg(&g)
        .arg(&i)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["outcome"], "success");
    assert!(json.get("cross_language_references").is_none());
    assert!(json["metrics"]["tokens"].as_u64().unwrap() > 0);
}

#[test]
fn parse_unterminated_region_exits_1() {
    let (_tmp, g, i) = fixture(PRIMARY, "@CONTEXT[Expr] y + 1");
    braid()
        .args(["parse"])
        .arg(&g)
        .arg(&i)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("UNTERMINATED_CONTEXT"));
}

#[test]
fn parse_missing_grammar_exits_1() {
    let tmp = TempDir::new().unwrap();
    let i = write(tmp.path(), "input.txt", RESOLVED);
    braid()
        .args(["parse"])
        .arg(tmp.path().join("absent.grammar"))
        .arg(&i)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read grammar source"));
}

#[test]
fn parse_import_cycle_exits_1() {
    let tmp = TempDir::new().unwrap();
    let a = write(
        tmp.path(),
        "a.grammar",
        "Grammar: A\n@IMPORT B FROM \"b.grammar\"\n",
    );
    write(
        tmp.path(),
        "b.grammar",
        "Grammar: B\n@IMPORT A FROM \"a.grammar\"\n",
    );
    let i = write(tmp.path(), "input.txt", "x");
    braid()
        .args(["parse"])
        .arg(&a)
        .arg(&i)
        .assert()
        .failure()
        .stderr(predicate::str::contains("import cycle detected"));
}

#[test]
fn strict_inheritance_flag_fails_on_missing_base() {
    let (_tmp, g, i) = fixture("Grammar: Page\nInherits: Missing\n", "let x");
    braid()
        .args(["parse"])
        .arg(&g)
        .arg(&i)
        .assert()
        .success();
    braid()
        .args(["--strict-inheritance", "parse"])
        .arg(&g)
        .arg(&i)
        .assert()
        .failure()
        .stderr(predicate::str::contains("INHERITANCE_UNRESOLVED"));
}

// ──────────────────────────────────────────────
// 3. check
// ──────────────────────────────────────────────

#[test]
fn check_clean_input_exits_0() {
    let grammar = format!("{PRIMARY}@VALIDATE {{ binding: Expr -> Primary }}\n");
    let (_tmp, g, i) = fixture(&grammar, RESOLVED);
    braid()
        .args(["check"])
        .arg(&g)
        .arg(&i)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 0 error(s)"));
}

#[test]
fn check_unresolved_reference_exits_1() {
    let (_tmp, g, i) = fixture(PRIMARY, UNRESOLVED);
    braid()
        .args(["check"])
        .arg(&g)
        .arg(&i)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("'y'"))
        .stdout(predicate::str::contains("failed:"));
}

#[test]
fn check_json_reports_summary() {
    let (_tmp, g, i) = fixture(PRIMARY, UNRESOLVED);
    let output = braid()
        .args(["--output", "json", "check"])
        .arg(&g)
        .arg(&i)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert!(json["summary"]["errors"].as_u64().unwrap() >= 1);
    assert!(json["reference_validation_results"].is_array());
}

#[test]
fn check_quiet_prints_nothing_but_still_fails() {
    let (_tmp, g, i) = fixture(PRIMARY, UNRESOLVED);
    braid()
        .args(["--quiet", "check"])
        .arg(&g)
        .arg(&i)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. generate
// ──────────────────────────────────────────────

#[test]
fn generate_typescript_writes_sources_and_declarations() {
    let (tmp, g, i) = fixture(PRIMARY, RESOLVED);
    let out = tmp.path().join("gen");
    braid()
        .args(["generate", "typescript"])
        .arg(&g)
        .arg(&i)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"))
        .stdout(predicate::str::contains("estimate (not measured)"));
    assert!(out.join("symbolTable.ts").exists());
    assert!(out.join("symbolTable.d.ts").exists());
}

#[test]
fn generate_unknown_language_exits_1() {
    let (tmp, g, i) = fixture(PRIMARY, RESOLVED);
    braid()
        .args(["generate", "cobol"])
        .arg(&g)
        .arg(&i)
        .arg("--out")
        .arg(tmp.path().join("gen"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cobol"));
}

#[test]
fn generate_reads_config_and_flag_wins() {
    let (tmp, g, i) = fixture(PRIMARY, RESOLVED);
    let config = write(
        tmp.path(),
        "braid.toml",
        "[generation]\nmodule_name = \"page_ctx\"\n",
    );
    let out = tmp.path().join("go");
    braid()
        .arg("--config")
        .arg(&config)
        .args(["generate", "go"])
        .arg(&g)
        .arg(&i)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let table = fs::read_to_string(out.join("symbol_table.go")).unwrap();
    assert!(table.contains("package page_ctx"));

    let out = tmp.path().join("go2");
    braid()
        .arg("--config")
        .arg(&config)
        .args(["generate", "go", "--module-name", "other"])
        .arg(&g)
        .arg(&i)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let table = fs::read_to_string(out.join("symbol_table.go")).unwrap();
    assert!(table.contains("package other"));
}

#[test]
fn generate_json_lists_written_files() {
    let (tmp, g, i) = fixture(PRIMARY, RESOLVED);
    let out = tmp.path().join("rs");
    let output = braid()
        .args(["--output", "json", "generate", "rust"])
        .arg(&g)
        .arg(&i)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["metadata"]["target_language"], "rust");
    assert!(!json["written"].as_array().unwrap().is_empty());
}

// ──────────────────────────────────────────────
// 5. Configuration errors
// ──────────────────────────────────────────────

#[test]
fn bad_config_exits_1() {
    let (tmp, g, i) = fixture(PRIMARY, RESOLVED);
    let config = write(tmp.path(), "braid.toml", "[server]\nport = 1\n");
    braid()
        .arg("--config")
        .arg(&config)
        .args(["parse"])
        .arg(&g)
        .arg(&i)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn json_errors_go_to_stderr_as_objects() {
    let tmp = TempDir::new().unwrap();
    let i = write(tmp.path(), "input.txt", RESOLVED);
    let output = braid()
        .args(["--output", "json", "parse"])
        .arg(tmp.path().join("absent.grammar"))
        .arg(&i)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(err["error"].as_str().unwrap().contains("absent.grammar"));
}
