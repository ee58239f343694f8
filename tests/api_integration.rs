//! HTTP API Integration Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use std::fs;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use playdash::core::{ConcurrentRuns, Config, PlaybookService, PlaybookStatus};
use playdash::server;

/// Service and server config rooted in a temp directory.
struct Harness {
    _temp: TempDir,
    config: Config,
    service: PlaybookService,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("playbooks")).unwrap();
        fs::create_dir_all(root.join("static")).unwrap();
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("static").join("app.css"), "body { margin: 0; }\n").unwrap();
        fs::write(
            root.join("templates").join("index.html"),
            "<html><body><h1>Playbooks</h1></body></html>\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.playbooks.dir = root.join("playbooks").to_string_lossy().into_owned();
        config.state.file = root.join("state.json");
        config.runner.program = "sh".to_string();
        config.server.static_dir = root.join("static");
        config.server.index_file = root.join("templates").join("index.html");
        customize(&mut config);

        let service = PlaybookService::open(&config);
        Self { _temp: temp, config, service }
    }

    fn playbook(&self, name: &str, body: &str) {
        fs::write(self.config.playbooks_dir().join(name), body).unwrap();
        self.service.list_playbooks();
    }

    fn app(&self) -> Router {
        server::router(self.service.clone(), &self.config.server)
    }

    async fn send(&self, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let request =
            Request::builder().method(method).uri(uri).body(Body::from(body.to_string())).unwrap();

        let response = self.app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Method::GET, uri, "").await
    }

    async fn post(&self, uri: &str, body: &str) -> (StatusCode, String) {
        self.send(Method::POST, uri, body).await
    }

    /// Wait until the playbook is no longer running.
    async fn wait_for(&self, name: &str) {
        for _ in 0..250 {
            if self.service.find(name).is_some_and(|e| !e.is_running()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} did not finish", name);
    }
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap()
}

// ============================================================================
// Page & Static Asset Tests
// ============================================================================

#[tokio::test]
async fn test_home_serves_index_page() {
    let h = Harness::new();
    let (status, body) = h.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<h1>Playbooks</h1>"));
}

#[tokio::test]
async fn test_home_without_template() {
    let h = Harness::with_config(|c| c.server.index_file = "/nonexistent/index.html".into());
    let (status, body) = h.get("/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Failed to load template\n");
}

#[tokio::test]
async fn test_static_assets() {
    let h = Harness::new();
    let (status, body) = h.get("/static/app.css").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("margin: 0"));

    let (status, _) = h.get("/static/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Listing Tests
// ============================================================================

#[tokio::test]
async fn test_list_playbooks() {
    let h = Harness::new();
    h.playbook("site.yml", "true\n");
    h.playbook("deploy.yaml", "true\n");
    fs::write(h.config.playbooks_dir().join("notes.txt"), "skip").unwrap();

    let (status, body) = h.get("/api/playbooks").await;
    assert_eq!(status, StatusCode::OK);

    let entries = json(&body);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "deploy.yaml");
    assert_eq!(entries[1]["name"], "site.yml");
    assert_eq!(entries[1]["status"], "Ready");
    assert_eq!(entries[1]["lastRunTime"], "0001-01-01T00:00:00Z");
    assert!(entries[1]["path"].as_str().unwrap().ends_with("site.yml"));
}

#[tokio::test]
async fn test_list_picks_up_new_files() {
    let h = Harness::new();
    let (_, body) = h.get("/api/playbooks").await;
    assert_eq!(json(&body), serde_json::json!([]));

    fs::write(h.config.playbooks_dir().join("new.yml"), "true\n").unwrap();
    let (_, body) = h.get("/api/playbooks").await;
    assert_eq!(json(&body).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_wrong_method() {
    let h = Harness::new();
    let (status, body) = h.post("/api/playbooks", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, "Method not allowed\n");
}

// ============================================================================
// Run Tests
// ============================================================================

#[tokio::test]
async fn test_run_and_fetch_result() {
    let h = Harness::new();
    h.playbook("deploy.yml", "echo 'TASK [ping] ok'\n");

    let (status, body) = h.post("/api/run", r#"{"playbookName":"deploy.yml"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({ "status": "Started" }));

    h.wait_for("deploy.yml").await;

    let (status, body) = h.get("/api/result/deploy.yml").await;
    assert_eq!(status, StatusCode::OK);
    let result = json(&body);
    assert_eq!(result["playbookName"], "deploy.yml");
    assert_eq!(result["output"], "TASK [ping] ok\n");
    assert_eq!(result["success"], true);

    let entry = h.service.find("deploy.yml").unwrap();
    assert_eq!(entry.status, PlaybookStatus::Success);
}

#[tokio::test]
async fn test_run_failing_playbook() {
    let h = Harness::new();
    h.playbook("broken.yml", "echo 'ERROR! no hosts matched'\nexit 1\n");

    let (status, _) = h.post("/api/run", r#"{"playbookName":"broken.yml"}"#).await;
    assert_eq!(status, StatusCode::OK);
    h.wait_for("broken.yml").await;

    let (_, body) = h.get("/api/result/broken.yml").await;
    let result = json(&body);
    assert_eq!(result["success"], false);
    assert_eq!(result["output"], "ERROR! no hosts matched\n");

    let (_, body) = h.get("/api/playbooks").await;
    assert_eq!(json(&body)[0]["status"], "Failed");
}

#[tokio::test]
async fn test_run_marks_running() {
    let h = Harness::new();
    h.playbook("slow.yml", "sleep 1\n");

    h.post("/api/run", r#"{"playbookName":"slow.yml"}"#).await;

    let (_, body) = h.get("/api/playbooks").await;
    let entry = &json(&body)[0];
    assert_eq!(entry["status"], "Running");
    assert_ne!(entry["lastRunTime"], "0001-01-01T00:00:00Z");

    h.wait_for("slow.yml").await;
}

#[tokio::test]
async fn test_run_unknown_playbook() {
    let h = Harness::new();
    h.playbook("site.yml", "true\n");

    let (status, body) = h.post("/api/run", r#"{"playbookName":"missing.yml"}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Playbook not found\n");

    let (status, _) = h.post("/api/run", "{}").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_malformed_body() {
    let h = Harness::new();
    let (status, body) = h.post("/api/run", "{playbookName").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid request\n");
}

#[tokio::test]
async fn test_run_wrong_method() {
    let h = Harness::new();
    let (status, body) = h.get("/api/run").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, "Method not allowed\n");
}

#[tokio::test]
async fn test_run_rejected_while_running() {
    let h = Harness::with_config(|c| c.runner.concurrent_runs = ConcurrentRuns::Reject);
    h.playbook("slow.yml", "sleep 1\n");

    let (status, _) = h.post("/api/run", r#"{"playbookName":"slow.yml"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.post("/api/run", r#"{"playbookName":"slow.yml"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);

    h.wait_for("slow.yml").await;
}

// ============================================================================
// Result & Status Tests
// ============================================================================

#[tokio::test]
async fn test_result_never_run() {
    let h = Harness::new();
    let (status, body) = h.get("/api/result/site.yml").await;
    assert_eq!(status, StatusCode::OK);

    let result = json(&body);
    assert_eq!(result["playbookName"], "site.yml");
    assert_eq!(result["output"], "No execution results available");
    assert_eq!(result["success"], false);
}

#[tokio::test]
async fn test_result_requires_name() {
    let h = Harness::new();
    let (status, body) = h.get("/api/result/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Playbook name required\n");
}

#[tokio::test]
async fn test_status() {
    let h = Harness::new();
    h.playbook("site.yml", "true\n");

    let (status, body) = h.get("/api/status").await;
    assert_eq!(status, StatusCode::OK);

    let report = json(&body);
    assert_eq!(report["healthy"], true);
    assert_eq!(report["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(report["playbookCount"], 1);
    assert_eq!(report["runningCount"], 0);
    assert_eq!(report["resultCount"], 0);
}
