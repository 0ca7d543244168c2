//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QA: &str = "aaaa1111-0000-4000-8000-000000000001";
const QB: &str = "bbbb2222-0000-4000-8000-000000000002";

fn quizforge() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("quizforge").unwrap()
}

/// A command isolated from any real config, pointed at `service_url`.
fn isolated(dir: &Path, service_url: &str) -> Command {
    let mut cmd = quizforge();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("QUIZFORGE_SERVICE_URL", service_url)
        .env("QUIZFORGE_STATE_FILE", state_file(dir));
    cmd
}

fn state_file(dir: &Path) -> PathBuf {
    dir.join("state.json")
}

fn question_json(id: &str, engine: &str, status: &str) -> Value {
    json!({
        "id": id,
        "engine": engine,
        "exam_name": "Astronomy",
        "language": "English",
        "question_type": "multiple-choice",
        "difficulty": 5,
        "question": format!("Which planet is largest? ({engine})"),
        "options": ["Mars", "Jupiter", "Venus", "Mercury"],
        "answer": "Jupiter",
        "explanation": "Jupiter is the largest planet.",
        "version": 1,
        "status": status,
        "created_at": "2026-03-01T12:00:00Z",
        "updated_at": "2026-03-01T12:00:00Z"
    })
}

async fn mount_listing(server: &MockServer, status: &str, questions: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/questions"))
        .and(query_param("status", status))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "questions": questions })))
        .mount(server)
        .await;
}

async fn mount_empty_listings(server: &MockServer) {
    for status in ["in_progress", "approved", "deleted"] {
        mount_listing(server, status, vec![]).await;
    }
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    quizforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created quizforge.toml"));

    let content = std::fs::read_to_string(dir.path().join("quizforge.toml")).unwrap();
    assert!(content.contains("service_url = \"http://localhost:8000\""));
    assert!(content.contains("timeout_secs = 120"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    quizforge().current_dir(dir.path()).arg("init").assert().success();

    quizforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();

    quizforge()
        .current_dir(dir.path())
        .args(["round", "--config", "nowhere.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: config file not found"));
}

#[test]
fn round_without_history() {
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), "http://127.0.0.1:9")
        .arg("round")
        .assert()
        .success()
        .stdout(predicate::str::contains("No round yet"));
}

#[test]
fn purge_requires_confirmation() {
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), "http://127.0.0.1:9")
        .args(["purge", QA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_ranks_and_persists_round() {
    let server = MockServer::start().await;
    mount_empty_listings(&server).await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "questions": [
                question_json(QA, "A", "draft"),
                question_json(QB, "B", "draft"),
            ],
            "evaluations": {
                QA: { "A": { "score": 9, "verdict": "approve", "points": 2, "confidence": 0.9 } },
                QB: { "A": { "score": 7, "verdict": "needs_revision", "points": 1,
                             "issues": ["distractors too easy"] } }
            },
            "winner_id": QA
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["generate", "--exam", "Astronomy", "--engines", "A,B"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Generated 2 question(s); winner aaaa1111 (2 points)",
        ))
        .stdout(predicate::str::contains(format!("Winner: {QA} from A")));

    let output = isolated(dir.path(), &server.uri())
        .args(["round", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let view: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["winner_id"], QA);
    assert_eq!(view["exam_name"], "Astronomy");
    assert_eq!(view["rows"].as_array().unwrap().len(), 2);

    let summary = dir.path().join("out").join("round.md");
    isolated(dir.path(), &server.uri())
        .args(["round", "--format", "markdown", "--output"])
        .arg(&summary)
        .assert()
        .success()
        .stdout(predicate::str::contains("Round summary written to"));
    let md = std::fs::read_to_string(&summary).unwrap();
    assert!(md.contains("# Selection round: Astronomy"));
    assert!(md.contains("distractors too easy"));

    let json_summary = dir.path().join("out").join("round.json");
    isolated(dir.path(), &server.uri())
        .args(["round", "--format", "json", "--output"])
        .arg(&json_summary)
        .assert()
        .success();
    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&json_summary).unwrap()).unwrap();
    assert_eq!(written["winner_id"], QA);

    isolated(dir.path(), &server.uri())
        .args(["round", "--output"])
        .arg(dir.path().join("round.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output needs --format markdown or json"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_rejects_invalid_request() {
    let server = MockServer::start().await;
    mount_empty_listings(&server).await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["generate", "--exam", "Astronomy", "--difficulty", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("difficulty must be 1..=10, got 0"));

    assert!(!state_file(dir.path()).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_shows_one_partition() {
    let server = MockServer::start().await;
    mount_listing(&server, "in_progress", vec![question_json(QB, "B", "in_progress")]).await;
    mount_listing(&server, "approved", vec![question_json(QA, "A", "approved")]).await;
    mount_listing(&server, "deleted", vec![]).await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["list", "--status", "approved"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved: 1 question(s)"))
        .stdout(predicate::str::contains("aaaa1111"))
        .stdout(predicate::str::contains("bbbb2222").not());

    isolated(dir.path(), &server.uri())
        .args(["list", "--status", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in_progress: 1 question(s)"))
        .stdout(predicate::str::contains("deleted: 0 question(s)"));
}

#[test]
fn list_rejects_unknown_status() {
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), "http://127.0.0.1:9")
        .args(["list", "--status", "archived"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown status: archived"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn approve_by_prefix_exports() {
    let server = MockServer::start().await;
    mount_listing(&server, "in_progress", vec![question_json(QA, "A", "in_progress")]).await;
    mount_listing(&server, "approved", vec![]).await;
    mount_listing(&server, "deleted", vec![]).await;
    Mock::given(method("POST"))
        .and(path("/approve"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "question": question_json(QA, "A", "approved") })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/can-export/{QA}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "can_export": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "file_path": "exports/questions.csv"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["approve", "aaaa1111"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Question aaaa1111 approved and exported to exports/questions.csv",
        ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn approve_not_eligible_fails_with_current_status() {
    let server = MockServer::start().await;
    mount_listing(&server, "in_progress", vec![question_json(QA, "A", "in_progress")]).await;
    mount_listing(&server, "approved", vec![]).await;
    mount_listing(&server, "deleted", vec![]).await;
    Mock::given(method("POST"))
        .and(path("/approve"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "question": question_json(QA, "A", "approved") })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/can-export/{QA}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "can_export": false })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["approve", QA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not eligible for export"))
        .stderr(predicate::str::contains("it is now in_progress"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_question_is_an_error() {
    let server = MockServer::start().await;
    mount_empty_listings(&server).await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["delete", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown question: nope"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_service_warns_on_startup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/questions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "detail": "down" })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .args(["list", "--status", "all"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Warning: Loaded 0 question(s); could not list"))
        .stdout(predicate::str::contains("in_progress: 0 question(s)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_reports_reachable_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "QuizBuilder AI API",
            "version": "1.0.0"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "Question service at {}/ is up (version 1.0.0)",
            server.uri()
        )));
}

#[test]
fn status_fails_when_service_is_down() {
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), "http://127.0.0.1:9")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Error: question service at http://127.0.0.1:9/ is unreachable",
        ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exports_lists_files_newest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csv/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "filename": "biology.csv", "size_bytes": 512, "modified_at": 1_700_000_000 },
                { "filename": "astronomy.csv", "size_bytes": 2048, "modified_at": 1_760_000_000 }
            ]
        })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let output = isolated(dir.path(), &server.uri())
        .arg("exports")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let newest = stdout.find("astronomy.csv").unwrap();
    let oldest = stdout.find("biology.csv").unwrap();
    assert!(newest < oldest);
    assert!(stdout.contains("2.0 KiB"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exports_without_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csv/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    isolated(dir.path(), &server.uri())
        .arg("exports")
        .assert()
        .success()
        .stdout(predicate::str::contains("No export files yet."));
}
