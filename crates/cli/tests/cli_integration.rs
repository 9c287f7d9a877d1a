//! CLI integration tests for the `provost` binary.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout
//! content, and stderr content. Every test gets its own temp directory
//! and store file, so tests are independent and repeatable.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper: create a Command for the `provost` binary with an isolated
/// store file inside `dir`.
fn provost(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("provost");
    cmd.current_dir(dir.path());
    cmd.arg("--store");
    cmd.arg(dir.path().join("store.json"));
    cmd
}

/// Run a command expected to succeed, parsing its stdout as JSON.
fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("spawn provost");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    cargo_bin_cmd!("provost")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provost record lifecycle toolchain"));
}

#[test]
fn version_exits_0() {
    cargo_bin_cmd!("provost")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("provost"));
}

// ──────────────────────────────────────────────
// 2. Workflows
// ──────────────────────────────────────────────

#[test]
fn workflows_lists_builtin_tables() {
    let dir = TempDir::new().unwrap();
    provost(&dir)
        .arg("workflows")
        .assert()
        .success()
        .stdout(predicate::str::contains("grade_submission"))
        .stdout(predicate::str::contains("pending_approval -> approved"))
        .stdout(predicate::str::contains("deletable at any status"));
}

// ──────────────────────────────────────────────
// 3. Submit / transition / show round trip
// ──────────────────────────────────────────────

#[test]
fn submit_transition_show_round_trip() {
    let dir = TempDir::new().unwrap();

    let record = json_output(provost(&dir).args([
        "--output",
        "json",
        "submit",
        "payment",
        "--payload",
        r#"{"amount": 1500, "department": "science"}"#,
    ]));
    let id = record["id"].as_str().expect("record id").to_string();
    assert_eq!(record["status"], "pending");
    assert_eq!(record["version"], 0);

    provost(&dir)
        .args(["transition", &id, "success", "--actor", "bursar1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now 'success'"));

    let shown = json_output(provost(&dir).args(["--output", "json", "show", &id]));
    assert_eq!(shown["status"], "success");
    assert_eq!(shown["version"], 1);
    assert_eq!(shown["history"][0]["actor"], "bursar1");
    assert_eq!(shown["history"][0]["from_status"], "pending");
}

#[test]
fn illegal_transition_exits_1_and_preserves_status() {
    let dir = TempDir::new().unwrap();

    let record = json_output(provost(&dir).args([
        "--output",
        "json",
        "submit",
        "payment",
        "--payload",
        r#"{"amount": 100}"#,
    ]));
    let id = record["id"].as_str().unwrap().to_string();

    provost(&dir)
        .args(["transition", &id, "success", "--actor", "system"])
        .assert()
        .success();

    provost(&dir)
        .args(["transition", &id, "pending", "--actor", "system"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("illegal transition"));

    let shown = json_output(provost(&dir).args(["--output", "json", "show", &id]));
    assert_eq!(shown["status"], "success");
}

#[test]
fn submit_rejects_non_start_status() {
    let dir = TempDir::new().unwrap();
    provost(&dir)
        .args(["submit", "payment", "--payload", "{}", "--status", "success"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid initial state"));
}

#[test]
fn submit_unknown_type_fails() {
    let dir = TempDir::new().unwrap();
    provost(&dir)
        .args(["submit", "invoice", "--payload", "{}"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown record type"));
}

// ──────────────────────────────────────────────
// 4. Update and delete policy
// ──────────────────────────────────────────────

#[test]
fn budget_update_then_delete_at_any_status() {
    let dir = TempDir::new().unwrap();

    let record = json_output(provost(&dir).args([
        "--output",
        "json",
        "submit",
        "budget",
        "--payload",
        r#"{"allocatedAmount": 2000, "department": "science"}"#,
    ]));
    let id = record["id"].as_str().unwrap().to_string();

    let updated = json_output(provost(&dir).args([
        "--output",
        "json",
        "update",
        &id,
        "--payload",
        r#"{"allocatedAmount": 5000}"#,
    ]));
    assert_eq!(updated["payload"]["allocatedAmount"], 5000);
    assert_eq!(updated["payload"]["department"], "science");

    provost(&dir)
        .args(["transition", &id, "approved", "--actor", "dean1"])
        .assert()
        .success();

    provost(&dir)
        .args(["delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted"));

    provost(&dir)
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("record not found"));
}

#[test]
fn settled_payment_cannot_be_deleted() {
    let dir = TempDir::new().unwrap();

    let record = json_output(provost(&dir).args([
        "--output", "json", "submit", "payment", "--payload", "{}",
    ]));
    let id = record["id"].as_str().unwrap().to_string();

    provost(&dir)
        .args(["transition", &id, "failed", "--actor", "system"])
        .assert()
        .success();

    provost(&dir)
        .args(["delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terminal"));
}

// ──────────────────────────────────────────────
// 5. Grade publication fan-out through the CLI
// ──────────────────────────────────────────────

#[test]
fn publishing_grades_creates_student_grade_rows() {
    let dir = TempDir::new().unwrap();

    let record = json_output(provost(&dir).args([
        "--output",
        "json",
        "submit",
        "grade_submission",
        "--payload",
        r#"{"courseCode": "CSC101", "grades": [{"studentId": "S1", "total": 84, "grade": "A"}]}"#,
    ]));
    let id = record["id"].as_str().unwrap().to_string();

    provost(&dir)
        .args(["transition", &id, "approved", "--actor", "examofficer1"])
        .assert()
        .success();
    provost(&dir)
        .args(["transition", &id, "published", "--actor", "examofficer1"])
        .assert()
        .success();

    let listing = json_output(provost(&dir).args(["--output", "json", "list", "student_grade"]));
    let rows = listing.as_array().expect("listing is an array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["payload"]["studentId"], "S1");
    assert_eq!(rows[0]["payload"]["submissionId"], serde_json::json!(id));
}

// ──────────────────────────────────────────────
// 6. Summary
// ──────────────────────────────────────────────

#[test]
fn summary_counts_and_sums() {
    let dir = TempDir::new().unwrap();

    for (amount, dept) in [(1500, "science"), (2500, "science"), (100, "arts")] {
        provost(&dir)
            .args([
                "submit",
                "payment",
                "--payload",
                &format!(r#"{{"amount": {}, "department": "{}"}}"#, amount, dept),
            ])
            .assert()
            .success();
    }

    let summary = json_output(provost(&dir).args([
        "--output",
        "json",
        "summary",
        "payment",
        "--group-by",
        "department",
    ]));
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["counts_by_status"]["pending"], 3);
    assert_eq!(summary["sums_by_group"]["science"], "4000");
    assert_eq!(summary["sums_by_group"]["arts"], "100");
}

// ──────────────────────────────────────────────
// 7. Config: term stamping
// ──────────────────────────────────────────────

#[test]
fn configured_term_is_stamped_into_payloads() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("provost.toml");
    fs::write(
        &config_path,
        "[term]\nacademic_year = \"2025/2026\"\nsemester = \"first\"\n",
    )
    .unwrap();

    let mut cmd = provost(&dir);
    cmd.arg("--config");
    cmd.arg(&config_path);
    let record = json_output(cmd.args([
        "--output",
        "json",
        "submit",
        "deferment_request",
        "--payload",
        r#"{"reason": "medical"}"#,
    ]));
    assert_eq!(record["payload"]["term"]["academic_year"], "2025/2026");
    assert_eq!(record["payload"]["term"]["semester"], "first");
}

// ──────────────────────────────────────────────
// 8. Payload from file
// ──────────────────────────────────────────────

#[test]
fn payload_can_be_read_from_file() {
    let dir = TempDir::new().unwrap();
    let payload_path = dir.path().join("payload.json");
    fs::write(&payload_path, r#"{"amount": 42}"#).unwrap();

    let record = json_output(provost(&dir).args([
        "--output",
        "json",
        "submit",
        "payment",
        "--payload",
        "@payload.json",
    ]));
    assert_eq!(record["payload"]["amount"], 42);
}
