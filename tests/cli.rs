//! Integration tests for the invowk CLI.
//!
//! These tests run the compiled binary against throwaway project trees.
//! `HOME` (and the XDG variables) point into the temp tree so user config
//! and user commands never leak in from the machine running the tests.

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get an invowk command rooted in `project`, isolated from the real HOME.
fn invowk(home: &TempDir, project: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("invowk").unwrap();
    cmd.current_dir(project);
    cmd.env("HOME", home.path());
    cmd.env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd.env_remove("INVOWK_LOG");
    cmd.env("SHELL", "sh");
    cmd
}

/// A project directory holding an invowk.toml, inside an isolated HOME.
fn project_with(invowkfile: &str) -> (TempDir, std::path::PathBuf) {
    let home = TempDir::new().unwrap();
    let project = home.child("project");
    project.create_dir_all().unwrap();
    project.child("invowk.toml").write_str(invowkfile).unwrap();
    let path = project.path().to_path_buf();
    (home, path)
}

// ============================================================================
// Basic CLI tests
// ============================================================================

#[test]
fn cli_help_flag_shows_help() {
    let (home, project) = project_with("");
    invowk(&home, &project)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declarative command runner"));
}

#[test]
fn cli_version_flag_shows_version() {
    let (home, project) = project_with("");
    invowk(&home, &project)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("invowk"));
}

#[test]
fn unknown_command_exits_1() {
    let (home, project) = project_with("");
    invowk(&home, &project)
        .arg("nope")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Execution and projection
// ============================================================================

#[test]
fn flag_projection_and_exit_code_passthrough() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"

          [[cmd.flags]]
          name = "target"
          default = "dev"

          [[cmd.impl]]
          runtimes = ["native"]
          script = '''
          test "$INVOWK_FLAG_TARGET" = prod || exit 40
          test "$ARGC" = 0 || exit 41
          exit 7
          '''
        "#,
    );
    invowk(&home, &project)
        .args(["build", "--target=prod"])
        .assert()
        .code(7);
}

#[test]
fn flag_default_applies_without_user_value() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"

          [[cmd.flags]]
          name = "target"
          default = "dev"

          [[cmd.impl]]
          runtimes = ["native"]
          script = 'test "$INVOWK_FLAG_TARGET" = dev'
        "#,
    );
    invowk(&home, &project).arg("build").assert().success();
}

#[test]
fn variadic_projection() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "run"

          [[cmd.args]]
          name = "name"
          required = true

          [[cmd.args]]
          name = "rest"
          variadic = true

          [[cmd.impl]]
          runtimes = ["native"]
          script = '''
          test "$INVOWK_ARG_NAME" = alpha || exit 40
          test "$INVOWK_ARG_REST_COUNT" = 3 || exit 41
          test "$INVOWK_ARG_REST_1" = one || exit 42
          test "$INVOWK_ARG_REST_2" = two || exit 43
          test "$INVOWK_ARG_REST_3" = three || exit 44
          test "$INVOWK_ARG_REST" = "one two three" || exit 45
          test "$ARGC" = 4 || exit 46
          test "$ARG1" = alpha || exit 47
          '''
        "#,
    );
    invowk(&home, &project)
        .args(["run", "alpha", "one", "two", "three"])
        .assert()
        .success();
}

#[test]
fn positional_args_reach_the_script() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "echoer"

          [[cmd.args]]
          name = "word"
          required = true

          [[cmd.impl]]
          runtimes = ["native"]
          script = 'test "$1" = hello'
        "#,
    );
    invowk(&home, &project)
        .args(["echoer", "hello"])
        .assert()
        .success();
}

#[test]
fn missing_required_argument_exits_1() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "run"
          [[cmd.args]]
          name = "name"
          required = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project)
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("name"));
}

#[test]
fn run_subcommand_form_is_equivalent() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "exit 5"
        "#,
    );
    invowk(&home, &project)
        .args(["run", "build"])
        .assert()
        .code(5);
}

#[test]
fn nested_commands_resolve_by_token_and_dotted_path() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "ops"
          [[cmd.subcmd]]
          name = "deploy"
            [[cmd.subcmd.impl]]
            runtimes = ["native"]
            script = "exit 11"
        "#,
    );
    invowk(&home, &project)
        .args(["ops", "deploy"])
        .assert()
        .code(11);
    invowk(&home, &project)
        .arg("ops.deploy")
        .assert()
        .code(11);
}

// ============================================================================
// Sources and ambiguity
// ============================================================================

/// Layout: home/project/invowk.toml + home/foo.invowk/invowk.toml, both
/// declaring `deploy`.
fn ambiguous_pair() -> (TempDir, std::path::PathBuf) {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "deploy"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "exit 21"
        "#,
    );
    let module = home.child("foo.invowk");
    module.create_dir_all().unwrap();
    module
        .child("invowk.toml")
        .write_str(
            r#"
            [[cmd]]
            name = "deploy"
              [[cmd.impl]]
              runtimes = ["native"]
              script = "exit 22"
            "#,
        )
        .unwrap();
    (home, project)
}

#[test]
fn ambiguous_bare_name_fails_with_sources() {
    let (home, project) = ambiguous_pair();
    invowk(&home, &project)
        .arg("deploy")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Ambiguous"))
        .stderr(predicate::str::contains("invowkfile"))
        .stderr(predicate::str::contains("foo"));
}

#[test]
fn source_prefix_disambiguates() {
    let (home, project) = ambiguous_pair();
    invowk(&home, &project)
        .args(["@foo", "deploy"])
        .assert()
        .code(22);
    invowk(&home, &project)
        .args(["@invowkfile", "deploy"])
        .assert()
        .code(21);
}

#[test]
fn from_flag_disambiguates() {
    let (home, project) = ambiguous_pair();
    invowk(&home, &project)
        .args(["run", "--from", "foo", "deploy"])
        .assert()
        .code(22);
}

#[test]
fn list_groups_by_source_and_marks_ambiguity() {
    let (home, project) = ambiguous_pair();
    invowk(&home, &project)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("@invowkfile"))
        .stdout(predicate::str::contains("@foo"))
        .stdout(predicate::str::contains("ambiguous"));
}

#[test]
fn list_json_format_is_parseable() {
    let (home, project) = ambiguous_pair();
    let output = invowk(&home, &project)
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["name"] == "deploy"));
    assert!(rows.iter().all(|r| r["ambiguous"] == true));
    assert!(
        rows.iter()
            .any(|r| r["source"] == "invowkfile")
    );
    assert!(rows.iter().any(|r| r["source"] == "foo"));
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn tool_dep_or_semantics_pass_with_one_alternative() {
    let (home, project) = project_with(
        r#"
        [deps]
        tools = [ { alternatives = ["definitely-not-a-real-tool-xyz", "sh"] } ]

        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project).arg("build").assert().success();
}

#[test]
fn tool_dep_failure_names_both_alternatives() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
        [[cmd.deps.tools]]
        alternatives = ["no-such-tool-aaa", "no-such-tool-bbb"]
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project)
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no-such-tool-aaa"))
        .stderr(predicate::str::contains("no-such-tool-bbb"));
}

#[test]
fn env_dep_checks_captured_environment() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
        [[cmd.deps.env]]
        alternatives = ["INVOWK_TEST_SENTINEL"]
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project)
        .arg("build")
        .env("INVOWK_TEST_SENTINEL", "1")
        .assert()
        .success();
    invowk(&home, &project).arg("build").assert().code(1);
}

#[test]
fn execute_deps_run_first_in_order_and_deduplicated() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "all"
        [[cmd.deps.commands]]
        alternatives = ["prep"]
        execute = true
        [[cmd.deps.commands]]
        alternatives = ["lint"]
        execute = true
        [[cmd.deps.commands]]
        alternatives = ["prep"]
        execute = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "printf main >> order.txt"

        [[cmd]]
        name = "prep"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "printf 'prep;' >> order.txt"

        [[cmd]]
        name = "lint"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "printf 'lint;' >> order.txt"
        "#,
    );
    invowk(&home, &project).arg("all").assert().success();
    let order = std::fs::read_to_string(project.join("order.txt")).unwrap();
    assert_eq!(order, "prep;lint;main");
}

#[test]
fn failing_execute_dep_blocks_the_command() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "all"
        [[cmd.deps.commands]]
        alternatives = ["broken"]
        execute = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "touch should-not-exist.txt"

        [[cmd]]
        name = "broken"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "exit 3"
        "#,
    );
    invowk(&home, &project)
        .arg("all")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("broken"));
    assert!(!project.join("should-not-exist.txt").exists());
}

#[test]
fn static_execute_dep_cycle_is_rejected() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "a"
        [[cmd.deps.commands]]
        alternatives = ["b"]
        execute = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"

        [[cmd]]
        name = "b"
        [[cmd.deps.commands]]
        alternatives = ["a"]
        execute = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project)
        .arg("a")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cycle"));
}

// ============================================================================
// Structure validation
// ============================================================================

#[test]
fn args_with_subcommands_fail_validation() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "ops"
          [[cmd.args]]
          name = "env"
          [[cmd.subcmd]]
          name = "deploy"
            [[cmd.subcmd.impl]]
            runtimes = ["native"]
            script = "true"
        "#,
    );
    invowk(&home, &project)
        .args(["ops", "deploy"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("args_subcommand_conflict"));
}

#[test]
fn parse_failure_in_one_source_leaves_others_usable() {
    let (home, project) = project_with("this is [not toml");
    let module = home.child("ok.invowk");
    module.create_dir_all().unwrap();
    module
        .child("invowk.toml")
        .write_str(
            r#"
            [[cmd]]
            name = "fine"
              [[cmd.impl]]
              runtimes = ["native"]
              script = "true"
            "#,
        )
        .unwrap();
    invowk(&home, &project)
        .arg("fine")
        .assert()
        .success()
        .stderr(predicate::str::contains("invokefile_parse_failed"));
}

// ============================================================================
// Runtime policy
// ============================================================================

#[test]
fn disallowed_runtime_override_exits_1() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project)
        .args(["run", "--runtime", "virtual", "build"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not allowed"))
        .stderr(predicate::str::contains("native"));
}

#[test]
fn config_default_runtime_applies() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native", "virtual"]
          script = "exit 13"
        "#,
    );
    let config_dir = home.child(".config/invowk");
    config_dir.create_dir_all().unwrap();
    config_dir
        .child("config.toml")
        .write_str("default_runtime = \"virtual\"\n")
        .unwrap();
    invowk(&home, &project).arg("build").assert().code(13);
}

#[test]
fn explicit_malformed_config_is_fatal() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    let bad = home.child("bad-config.toml");
    bad.write_str("default_runtime = [broken").unwrap();
    invowk(&home, &project)
        .args(["--config"])
        .arg(bad.path())
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config"));
}

#[test]
fn malformed_config_at_default_path_is_error_severity_but_not_fatal() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    let config_dir = home.child(".config/invowk");
    config_dir.create_dir_all().unwrap();
    config_dir
        .child("config.toml")
        .write_str("default_runtime = [broken")
        .unwrap();
    invowk(&home, &project)
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("config_load_failed"));
}

// ============================================================================
// Timeout and dry-run
// ============================================================================

#[test]
fn timeout_cancels_the_child_with_exit_2() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "slow"
        timeout = "500ms"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "sleep 10"
        "#,
    );
    let start = std::time::Instant::now();
    invowk(&home, &project)
        .arg("slow")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timed out"));
    assert!(start.elapsed() < std::time::Duration::from_secs(15));
}

#[test]
fn malformed_timeout_fails_fast() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
        timeout = "banana"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "true"
        "#,
    );
    invowk(&home, &project).arg("build").assert().code(1);
}

#[test]
fn dry_run_ignores_malformed_timeout() {
    // The plan renders and exits 0 even when the declared timeout string
    // would fail to parse; only a real execution trips on it.
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
        timeout = "banana"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "touch ran.txt"
        "#,
    );
    invowk(&home, &project)
        .args(["run", "--dry-run", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run"));
    assert!(!project.join("ran.txt").exists());
}

#[test]
fn dry_run_has_no_side_effects() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "all"
        [[cmd.deps.commands]]
        alternatives = ["prep"]
        execute = true
          [[cmd.impl]]
          runtimes = ["native"]
          script = "touch ran-main.txt"

        [[cmd]]
        name = "prep"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "touch ran-prep.txt"
        "#,
    );
    invowk(&home, &project)
        .args(["run", "--dry-run", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run"));
    assert!(!project.join("ran-main.txt").exists());
    assert!(!project.join("ran-prep.txt").exists());
}

// ============================================================================
// Environment contract
// ============================================================================

#[test]
fn declared_env_and_cli_env_merge_with_cli_winning() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
        [cmd.env]
        FROM_FILE = "file"
        OVERRIDDEN = "file"
          [[cmd.impl]]
          runtimes = ["native"]
          script = '''
          test "$FROM_FILE" = file || exit 40
          test "$OVERRIDDEN" = cli || exit 41
          '''
        "#,
    );
    invowk(&home, &project)
        .args(["run", "--env", "OVERRIDDEN=cli", "build"])
        .assert()
        .success();
}

#[test]
fn env_inherit_none_blocks_caller_environment() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = 'test -z "$LEAKY_VARIABLE"'
        "#,
    );
    invowk(&home, &project)
        .args(["run", "--env-inherit-mode", "none", "build"])
        .env("LEAKY_VARIABLE", "leak")
        .assert()
        .success();
}

#[test]
fn env_file_values_are_loaded() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "build"
          [[cmd.impl]]
          runtimes = ["native"]
          script = 'test "$FROM_DOTENV" = yes'
        "#,
    );
    let dotenv = home.child("extra.env");
    dotenv.write_str("FROM_DOTENV=yes\n").unwrap();
    invowk(&home, &project)
        .args(["run", "--env-file"])
        .arg(dotenv.path())
        .arg("build")
        .assert()
        .success();
}

#[test]
fn workdir_declaration_is_honored() {
    let (home, project) = project_with(
        r#"
        [[cmd]]
        name = "inner"
        workdir = "sub"
          [[cmd.impl]]
          runtimes = ["native"]
          script = "test -f marker.txt"
        "#,
    );
    let sub = home.child("project/sub");
    sub.create_dir_all().unwrap();
    sub.child("marker.txt").write_str("x").unwrap();
    invowk(&home, &project).arg("inner").assert().success();
}
