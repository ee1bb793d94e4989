//! Integration tests for the complaintdesk CLI
//!
//! These tests exercise the full CLI workflow using a temporary database.
//! They verify that commands work end-to-end without mocking.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run complaintdesk with a specific database path
fn run_complaintdesk(args: &[&str], db_path: &Path) -> std::process::Output {
    let workdir = db_path.parent().unwrap_or(Path::new("."));
    Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .args(args)
        .current_dir(workdir)
        .env("COMPLAINTDESK_DB_PATH", db_path)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute complaintdesk")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn json(output: &std::process::Output) -> serde_json::Value {
    assert!(output.status.success(), "command failed: {}", stderr(output));
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

/// Seed a student (#1) and a staff member (#2)
fn seed_users(db_path: &Path) {
    let output = run_complaintdesk(&["user", "add", "ada", "--role", "student"], db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let output = run_complaintdesk(&["user", "add", "grace", "--role", "staff"], db_path);
    assert!(output.status.success(), "{}", stderr(&output));
}

fn submit(db_path: &Path, title: &str, extra: &[&str]) -> std::process::Output {
    let mut args = vec![
        "complaint",
        "submit",
        "--student",
        "1",
        "--title",
        title,
        "--description",
        "details",
    ];
    args.extend_from_slice(extra);
    run_complaintdesk(&args, db_path)
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("complaintdesk"));
    assert!(out.contains("Complaint tracking"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("complaintdesk"));
}

#[test]
fn test_completion_zsh() {
    let output = Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .args(["completion", "zsh"])
        .output()
        .expect("Failed to execute");

    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(stdout(&output).contains("#compdef complaintdesk"));
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("complaintdesk"));
}

// =============================================================================
// Init
// =============================================================================

#[test]
fn test_init_creates_workspace() {
    let temp_dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_complaintdesk"))
        .args(["init", "--sla-hours", "24"])
        .current_dir(temp_dir.path())
        .env_remove("COMPLAINTDESK_DB_PATH")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "init failed: {}", stderr(&output));
    let workspace = temp_dir.path().join(".complaintdesk");
    assert!(workspace.join("complaintdesk.db").exists());
    let config = std::fs::read_to_string(workspace.join("config.toml")).unwrap();
    assert!(config.contains("resolution_time_hours = 24"));
}

// =============================================================================
// Users, categories, SLA rows
// =============================================================================

#[test]
fn test_user_add_and_list() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);

    let users = json(&run_complaintdesk(&["user", "list", "--json"], &db_path));
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "ada");
    assert_eq!(users[1]["role"], "staff");
}

#[test]
fn test_duplicate_username_fails() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);

    let output = run_complaintdesk(&["user", "add", "ada"], &db_path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists"));
}

#[test]
fn test_invalid_role_rejected() {
    let (_tmp, db_path) = setup();
    let output = run_complaintdesk(&["user", "add", "bob", "--role", "janitor"], &db_path);
    assert!(!output.status.success());
}

#[test]
fn test_category_lifecycle() {
    let (_tmp, db_path) = setup();

    let output = run_complaintdesk(&["category", "add", "Housing", "-d", "Dorm issues"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let output = run_complaintdesk(&["category", "add", "Housing"], &db_path);
    assert!(!output.status.success(), "category names are unique");

    let output = run_complaintdesk(&["category", "deactivate", "1"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));

    let active = json(&run_complaintdesk(&["category", "list", "--json"], &db_path));
    assert!(active.as_array().unwrap().is_empty());
    let all = json(&run_complaintdesk(&["category", "list", "--all", "--json"], &db_path));
    assert_eq!(all[0]["name"], "Housing");
    assert_eq!(all[0]["is_active"], false);
}

#[test]
fn test_category_list_sorted_by_name() {
    let (_tmp, db_path) = setup();
    for name in ["Parking", "Academics", "Housing"] {
        let output = run_complaintdesk(&["category", "add", name], &db_path);
        assert!(output.status.success(), "{}", stderr(&output));
    }

    let list = json(&run_complaintdesk(&["category", "list", "--json"], &db_path));
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Academics", "Housing", "Parking"]);
}

#[test]
fn test_sla_set_upserts_by_priority() {
    let (_tmp, db_path) = setup();

    let set = |hours: &str| {
        run_complaintdesk(
            &[
                "sla",
                "set",
                "high",
                "--response-hours",
                "4",
                "--resolution-hours",
                hours,
            ],
            &db_path,
        )
    };
    assert!(set("24").status.success());
    assert!(set("12").status.success());

    let configs = json(&run_complaintdesk(&["sla", "list", "--json"], &db_path));
    let configs = configs.as_array().unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0]["priority"], "high");
    assert_eq!(configs[0]["resolution_time_hours"], 12);
}

// =============================================================================
// Complaints
// =============================================================================

#[test]
fn test_submit_sets_deadline() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);

    let output = submit(&db_path, "Heating broken", &["--priority", "high"]);
    assert!(output.status.success(), "submit failed: {}", stderr(&output));
    assert!(stdout(&output).contains("#1 - Heating broken"));

    let detail = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert_eq!(detail["status"], "pending");
    assert_eq!(detail["priority"], "high");
    assert_eq!(detail["is_sla_breached"], false);
    assert_eq!(detail["is_overdue"], false);
    assert_eq!(detail["badge_class"], "bg-warning");
    assert!(detail["sla_deadline"].is_string());
    assert!(detail["resolved_at"].is_null());
}

#[test]
fn test_submit_with_past_deadline_is_breached() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);

    let output = submit(&db_path, "Old issue", &["--deadline", "2000-01-01T00:00:00Z"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let detail = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert_eq!(detail["is_sla_breached"], true);
    assert_eq!(detail["is_overdue"], true);

    let breached = json(&run_complaintdesk(&["complaint", "list", "--breached", "--json"], &db_path));
    assert_eq!(breached.as_array().unwrap().len(), 1);
}

#[test]
fn test_submit_with_huge_sla_window_fails_cleanly() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);

    for hours in ["100000000", "4294967295"] {
        let output = submit(&db_path, "Far future", &["--sla-hours", hours]);
        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(1), "should exit, not panic");
        assert!(stderr(&output).contains("SLA"), "{}", stderr(&output));
    }

    let all = json(&run_complaintdesk(&["complaint", "list", "--json"], &db_path));
    assert!(all.as_array().unwrap().is_empty());
}

#[test]
fn test_submit_for_missing_student_fails() {
    let (_tmp, db_path) = setup();
    let output = submit(&db_path, "Orphan", &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
}

#[test]
fn test_resolve_latches_resolution_time() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Wifi down", &[]);

    let output = run_complaintdesk(&["complaint", "resolve", "1", "-s", "Router rebooted"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let first = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert_eq!(first["status"], "resolved");
    assert_eq!(first["solution"], "Router rebooted");
    assert!(first["resolved_at"].is_string());
    assert!(first["time_to_resolve_secs"].is_number());

    // Reopen and resolve again: resolved_at keeps its first value
    run_complaintdesk(&["complaint", "status", "1", "in_progress"], &db_path);
    run_complaintdesk(&["complaint", "status", "1", "resolved"], &db_path);
    let second = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert_eq!(second["resolved_at"], first["resolved_at"]);
}

#[test]
fn test_assign_moves_pending_to_in_progress() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Leaky tap", &[]);

    let output = run_complaintdesk(&["complaint", "assign", "1", "2"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let detail = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert_eq!(detail["assigned_staff_id"], 2);
    assert_eq!(detail["status"], "in_progress");

    run_complaintdesk(&["complaint", "assign", "1"], &db_path);
    let detail = json(&run_complaintdesk(&["complaint", "show", "1", "--json"], &db_path));
    assert!(detail["assigned_staff_id"].is_null());
}

#[test]
fn test_list_filters() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "First", &["--priority", "low"]);
    submit(&db_path, "Second", &["--priority", "urgent"]);
    run_complaintdesk(&["complaint", "status", "2", "escalated"], &db_path);

    let all = json(&run_complaintdesk(&["complaint", "list", "--json"], &db_path));
    let titles: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Second", "First"], "newest first");

    let urgent = json(&run_complaintdesk(&["complaint", "list", "--priority", "urgent", "--json"], &db_path));
    assert_eq!(urgent.as_array().unwrap().len(), 1);
    let escalated = json(&run_complaintdesk(&["complaint", "list", "--status", "escalated", "--json"], &db_path));
    assert_eq!(escalated[0]["title"], "Second");
    assert_eq!(escalated[0]["badge_class"], "bg-danger");
}

#[test]
fn test_show_missing_complaint_fails() {
    let (_tmp, db_path) = setup();
    let output = run_complaintdesk(&["complaint", "show", "42"], &db_path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("complaint 42 not found"));
}

#[test]
fn test_check_sla_and_stats() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Fresh", &[]);
    submit(&db_path, "Stale", &["--deadline", "2000-01-01T00:00:00Z"]);

    let output = run_complaintdesk(&["complaint", "check-sla"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("No new SLA breaches"));

    let stats = json(&run_complaintdesk(&["complaint", "stats", "--json"], &db_path));
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["breached"], 1);
    assert_eq!(stats["overdue"], 1);
}

#[test]
fn test_deleting_student_removes_their_complaints() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Gone soon", &[]);

    let output = run_complaintdesk(&["user", "delete", "1"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let all = json(&run_complaintdesk(&["complaint", "list", "--json"], &db_path));
    assert!(all.as_array().unwrap().is_empty());
}

// =============================================================================
// Escalations and comments
// =============================================================================

#[test]
fn test_escalation_create_and_resolve() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Noise", &[]);

    let output = run_complaintdesk(
        &["escalation", "create", "1", "--reason", "complexity", "--by", "2", "-n", "Needs facilities"],
        &db_path,
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Escalation #1 for Complaint #1"));

    let output = run_complaintdesk(&["escalation", "resolve", "1"], &db_path);
    assert!(output.status.success(), "{}", stderr(&output));
    let list = json(&run_complaintdesk(&["escalation", "list", "1", "--json"], &db_path));
    assert_eq!(list[0]["reason"], "complexity");
    assert_eq!(list[0]["resolved"], true);
    assert!(list[0]["resolved_at"].is_string());

    let output = run_complaintdesk(&["escalation", "resolve", "1"], &db_path);
    assert!(stdout(&output).contains("already resolved"));
}

#[test]
fn test_comments_and_internal_notes() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Parking", &[]);

    run_complaintdesk(&["comment", "add", "1", "We are on it", "--author", "2"], &db_path);
    run_complaintdesk(&["comment", "add", "1", "Call the contractor", "--author", "2", "--internal"], &db_path);

    let all = json(&run_complaintdesk(&["comment", "list", "1", "--json"], &db_path));
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["content"], "We are on it");

    let public = json(&run_complaintdesk(&["comment", "list", "1", "--public", "--json"], &db_path));
    let public = public.as_array().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0]["is_internal"], false);
}

#[test]
fn test_empty_comment_rejected() {
    let (_tmp, db_path) = setup();
    seed_users(&db_path);
    submit(&db_path, "Parking", &[]);

    let output = run_complaintdesk(&["comment", "add", "1", "   "], &db_path);
    assert!(!output.status.success());
}
