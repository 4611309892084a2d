mod support;

use std::path::Path;

use predicates::str::contains;
use serde_json::Value;
use support::rota_cmd;

fn json(root: &Path, args: &[&str]) -> Value {
    let output = rota_cmd(root)
        .args(args)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

fn run(root: &Path, args: &[&str]) {
    rota_cmd(root).args(args).assert().success();
}

fn seeded(root: &Path) {
    run(root, &["init"]);
    run(root, &["queue", "add", "lab", "--random-factor", "0"]);
    run(root, &["queue", "join", "lab", "alice", "bob", "carol"]);
    run(root, &["template", "add", "Autoclave", "--queue", "lab", "--start", "2024-01"]);
}

#[test]
fn rota_help_works() {
    let dir = tempfile::tempdir().expect("tempdir");
    rota_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("fair task rotation"));
}

#[test]
fn subcommand_help_works() {
    let dir = tempfile::tempdir().expect("tempdir");
    for cmd in ["init", "queue", "template", "generate", "task", "swap", "stats"] {
        rota_cmd(dir.path()).arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn commands_need_init() {
    let dir = tempfile::tempdir().expect("tempdir");
    rota_cmd(dir.path())
        .args(["queue", "list"])
        .assert()
        .code(2)
        .stderr(contains("rota init"));
}

#[test]
fn init_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = json(dir.path(), &["init"]);
    assert_eq!(first["schema_version"], "rota.v1");
    assert_eq!(first["data"]["created"]["ledger"], true);
    assert!(dir.path().join(".rota.toml").exists());
    assert!(dir.path().join(".rota").join("ledger.json").exists());

    let second = json(dir.path(), &["init"]);
    assert_eq!(second["data"]["created"]["ledger"], false);
    assert_eq!(second["data"]["created"]["config"], false);
}

#[test]
fn generate_then_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    seeded(root);

    let generated = json(root, &["generate", "2024-01"]);
    assert_eq!(generated["command"], "generate");
    let result = &generated["data"]["2024-01"]["results"][0];
    assert_eq!(result["outcome"], "created");
    assert_eq!(result["instance"]["current_assignees"][0], "alice");

    let again = json(root, &["generate", "2024-01"]);
    assert_eq!(again["data"]["2024-01"]["results"][0]["outcome"], "existing");

    let listed = json(root, &["task", "list"]);
    let instances = listed["data"].as_array().expect("instances");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["period"], "2024-01");

    let notifications = std::fs::read_to_string(root.join(".rota").join("notifications.jsonl"))
        .expect("notification sink");
    assert!(notifications.contains("new_assignment"));
}

#[test]
fn preview_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    seeded(root);

    let preview = json(root, &["generate", "2024-01", "2024-02", "--preview"]);
    assert_eq!(preview["command"], "preview");
    assert_eq!(preview["data"]["2024-02"]["results"][0]["outcome"], "created");

    let listed = json(root, &["task", "list"]);
    assert!(listed["data"].as_array().expect("instances").is_empty());
}

#[test]
fn swap_round_trip_and_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    seeded(root);
    run(root, &["generate", "2024-01"]);

    let listed = json(root, &["task", "list"]);
    let task = listed["data"][0]["id"].as_str().expect("id").to_string();

    let request = json(
        root,
        &["--actor", "alice", "swap", "request", &task, "--to", "bob"],
    );
    assert_eq!(request["data"]["status"], "pending");
    let request_id = request["data"]["id"].as_str().expect("request id").to_string();

    let approved = json(root, &["--actor", "bob", "swap", "approve", &request_id[..8]]);
    assert_eq!(approved["data"]["status"], "approved");

    let shown = json(root, &["task", "show", &task[..8]]);
    assert_eq!(shown["data"]["current_assignees"][0], "bob");
    assert_eq!(shown["data"]["original_assignees"][0], "alice");

    rota_cmd(root)
        .args(["--actor", "alice", "task", "complete", &task, "--json"])
        .assert()
        .code(3)
        .stdout(contains("\"status\": \"error\""));

    let completed = json(
        root,
        &["--actor", "bob", "task", "complete", &task, "--hours", "1.5", "--rating", "4"],
    );
    assert_eq!(completed["data"]["status"], "completed");

    let stats = json(root, &["stats", "user", "bob"]);
    assert_eq!(stats["data"]["completed"], 1);
    assert_eq!(stats["data"]["total"], 1);
}

#[test]
fn templates_are_managed_by_administrators() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let init = json(root, &["--actor", "boss", "init"]);
    assert_eq!(init["data"]["admins"][0], "boss");
    run(root, &["queue", "add", "lab"]);

    let output = rota_cmd(root)
        .args(["--actor", "mallory", "template", "add", "Autoclave", "--queue", "lab", "--json"])
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("error json");
    assert_eq!(value["error"]["kind"], "authorization");

    run(root, &["--actor", "boss", "template", "add", "Autoclave", "--queue", "lab"]);
    rota_cmd(root)
        .args(["--actor", "mallory", "template", "deactivate", "Autoclave"])
        .assert()
        .code(3);
    run(root, &["--actor", "boss", "template", "deactivate", "Autoclave"]);
}

#[test]
fn unknown_queue_is_a_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    run(root, &["init"]);

    let output = rota_cmd(root)
        .args(["queue", "join", "nowhere", "alice", "--json"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("error json");
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "not_found");
}
