#![cfg(all(feature = "cli", any(target_os = "linux", target_os = "macos")))]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::tempdir;

const MANIFEST: &str = r#"{
  "classes": [
    {"name": "com.example.Foo", "branches": [1], "lines": [10, 11]},
    {"name": "com.example.FooTest",
     "methods": [{"name": "testPositive", "annotations": ["org.junit.Test"]}]}
  ],
  "mutants": [
    {"id": 7, "class_name": "com.example.Foo", "method_name": "isPositive", "line": 11,
     "operator": "ReplaceComparisonOperator"}
  ]
}"#;

/// Launcher that runs `FooTest#testPositive`, taking both edges of branch 1
/// and executing mutant 7; the test fails while mutant 7 is active.
const LAUNCHER: &str = r#"#!/usr/bin/env sh
set -e

mutant=""
while [ $# -gt 0 ]; do
  case "$1" in
    --mutant) mutant="$2"; shift 2 ;;
    --format|--classpath|--method) shift 2 ;;
    *) shift ;;
  esac
done

echo "fake launcher starting"
echo '{"event":"test_started","class_name":"com.example.FooTest","method_name":"testPositive"}'
echo '{"event":"trace","fragment":{"true_branches":[1],"false_branches":[1],"touched_mutants":[7]}}'
failures=0
if [ "$mutant" = "7" ]; then
  failures=1
  echo '{"event":"test_failure","class_name":"com.example.FooTest","failure":{"exception_class":"java.lang.AssertionError","method_name":"testPositive"}}'
fi
echo '{"event":"test_finished","class_name":"com.example.FooTest","method_name":"testPositive"}'
echo "{\"event\":\"run_finished\",\"class_name\":\"com.example.FooTest\",\"run_count\":1,\"failure_count\":$failures}"
"#;

fn write_script(path: &Path, body: &str) {
    let mut file = File::create(path).expect("script should be created");
    file.write_all(body.as_bytes())
        .expect("script should be written");
    file.sync_all().expect("script should be flushed");
    fs::set_permissions(path, PermissionsExt::from_mode(0o755))
        .expect("script should be executable");
}

fn fixture(tmp: &Path, launcher: &str) -> (PathBuf, PathBuf) {
    let manifest = tmp.join("manifest.json");
    fs::write(&manifest, MANIFEST).expect("manifest should be written");
    let program = tmp.join("launcher.sh");
    write_script(&program, launcher);
    (manifest, program)
}

fn run_cli(manifest: &Path, launcher: &Path, args: &[&str]) -> std::process::Output {
    let binary = PathBuf::from(env!("CARGO_BIN_EXE_suite-oracle"));
    Command::new(binary)
        .args([
            "--target",
            "com.example.Foo",
            "--test-prefix",
            "com.example.FooTest",
            "--manifest",
            manifest.to_str().expect("manifest path should be valid utf-8"),
            "--launcher",
            launcher.to_str().expect("launcher path should be valid utf-8"),
        ])
        .args(args)
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("cli command should run")
}

#[test]
fn e2e_coverage_reports_json_and_writes_matrix_and_statistics() {
    let tmp = tempdir().expect("tempdir should be created");
    let (manifest, launcher) = fixture(tmp.path(), LAUNCHER);
    let report_dir = tmp.path().join("report");

    let output = run_cli(
        &manifest,
        &launcher,
        &[
            "coverage",
            "--matrix",
            "--report-dir",
            report_dir.to_str().expect("report path should be valid utf-8"),
            "--format",
            "json",
        ],
    );
    assert!(
        output.status.success(),
        "coverage should succeed. stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report should be valid json");
    assert_eq!(report["tests_executed"].as_u64(), Some(1));
    let target = &report["targets"][0];
    assert_eq!(target["target"].as_str(), Some("com.example.Foo"));
    assert_eq!(target["total_goals"].as_u64(), Some(2));
    assert_eq!(target["covered_goals"].as_u64(), Some(2));
    assert_eq!(target["coverage"].as_f64(), Some(1.0));

    let matrix = fs::read_to_string(report_dir.join("data/com.example.Foo.matrix"))
        .expect("matrix should be written");
    assert_eq!(matrix, "1 1 +\n");

    let statistics = fs::read_to_string(report_dir.join("statistics.jsonl"))
        .expect("statistics should be written");
    assert_eq!(statistics.lines().count(), 1);
    let line: serde_json::Value =
        serde_json::from_str(statistics.trim()).expect("statistics line should be json");
    assert_eq!(line["variables"]["Tests_Executed"].as_u64(), Some(1));
    assert_eq!(line["variables"]["Coverage"].as_f64(), Some(1.0));
}

#[test]
fn e2e_mutate_reports_killed_mutant() {
    let tmp = tempdir().expect("tempdir should be created");
    let (manifest, launcher) = fixture(tmp.path(), LAUNCHER);

    let output = run_cli(&manifest, &launcher, &["mutate"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("killed\t7\tcom.example.FooTest#testPositive"));
    assert!(stdout.contains("summary: killed=1, live=0"));

    let json = run_cli(&manifest, &launcher, &["mutate", "--json"]);
    assert!(json.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&json.stdout).expect("mutate output should be valid json");
    assert_eq!(value["killed"], serde_json::json!([7]));
    assert_eq!(value["live"], serde_json::json!([]));
}

#[test]
fn e2e_coverage_fails_when_the_launcher_breaks() {
    let tmp = tempdir().expect("tempdir should be created");
    let (manifest, launcher) = fixture(
        tmp.path(),
        "#!/usr/bin/env sh\necho 'no jvm found' >&2\nexit 3\n",
    );

    let output = run_cli(&manifest, &launcher, &["coverage"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No target class was analyzed."));
}

/// Writer that dumps the request into `<dir>/<name>.java`.
const WRITER: &str = r#"#!/usr/bin/env sh
set -e
req=$(cat)
name=$(printf '%s' "$req" | sed -n 's/^{"name":"\([^"]*\)","dir":"\([^"]*\)".*/\1/p')
dir=$(printf '%s' "$req" | sed -n 's/^{"name":"\([^"]*\)","dir":"\([^"]*\)".*/\2/p')
printf '%s' "$req" > "$dir/$name.java"
echo "[{\"path\":\"$dir/$name.java\",\"class_name\":\"$name\",\"role\":\"test\"}]"
"#;

/// Compiler that rejects sources containing `syntax error`.
const COMPILER: &str = r#"#!/usr/bin/env sh
if [ "$1" = "-version" ]; then
  echo "javac 17"
  exit 0
fi
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -d) out="$2"; shift 2 ;;
    -classpath) shift 2 ;;
    *.java)
      if grep -q 'syntax error' "$1"; then
        echo "$1:3: error: ';' expected" >&2
        exit 1
      fi
      base=$(basename "$1" .java)
      : > "$out/$base.class"
      shift ;;
    *) shift ;;
  esac
done
"#;

/// Launcher where `test0` passes and `test2` throws a NullPointerException.
const VALIDATE_LAUNCHER: &str = r#"#!/usr/bin/env sh
echo '{"event":"test_started","class_name":"Foo_ESTest","method_name":"test0"}'
echo '{"event":"test_finished","class_name":"Foo_ESTest","method_name":"test0"}'
echo '{"event":"test_started","class_name":"Foo_ESTest","method_name":"test2"}'
echo '{"event":"test_failure","class_name":"Foo_ESTest","failure":{"exception_class":"java.lang.NullPointerException","hierarchy":["java.lang.RuntimeException"],"method_name":"test2"}}'
echo '{"event":"test_finished","class_name":"Foo_ESTest","method_name":"test2"}'
echo '{"event":"run_finished","class_name":"Foo_ESTest","run_count":2,"failure_count":1}'
"#;

#[test]
fn e2e_validate_filters_the_candidate_pool() {
    let tmp = tempdir().expect("tempdir should be created");
    let (manifest, launcher) = fixture(tmp.path(), VALIDATE_LAUNCHER);
    let writer = tmp.path().join("writer.sh");
    write_script(&writer, WRITER);
    let compiler = tmp.path().join("javac.sh");
    write_script(&compiler, COMPILER);

    let config = tmp.path().join("oracle.toml");
    fs::write(
        &config,
        format!(
            "log_level = \"warn\"\n\n[compiler]\nprogram = \"{}\"\n\n[writer]\nprogram = \"{}\"\n",
            compiler.display(),
            writer.display()
        ),
    )
    .expect("config should be written");

    let candidates = tmp.path().join("candidates.json");
    fs::write(
        &candidates,
        r#"[{"name":"test0","code":"ok();"},{"name":"test1","code":"syntax error"},{"name":"test2","code":"npe();"}]"#,
    )
    .expect("candidates should be written");
    let pool = tmp.path().join("pool.json");

    let output = run_cli(
        &manifest,
        &launcher,
        &[
            "--config",
            config.to_str().expect("config path should be valid utf-8"),
            "validate",
            candidates.to_str().expect("candidates path should be valid utf-8"),
            "--output",
            pool.to_str().expect("pool path should be valid utf-8"),
        ],
    );
    assert!(
        output.status.success(),
        "validate should succeed. stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let kept: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&pool).expect("pool should be written"))
            .expect("pool should be valid json");
    let names: Vec<&str> = kept
        .as_array()
        .expect("pool should be an array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["test0"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("candidates: 3, not compiling: 1, unchecked: 0, unstable: 0, kept: 1"));
}
