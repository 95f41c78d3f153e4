use std::sync::Arc;

use chrono::Utc;
use docfleet_api::app::services::AppServices;
use docfleet_core::{AvailabilityZone, ChunkId, ChunkStatus, ContainerId, RequestId, WorkerHeartbeat};
use docfleet_infra::checkpoint::CheckpointStore;
use docfleet_infra::registry::WorkerRegistry;
use reqwest::StatusCode;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Serve `services` on an ephemeral port with the production router.
    async fn spawn(services: AppServices) -> Self {
        let app = docfleet_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(format!("{}{}", self.base_url, path)).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn zone() -> AvailabilityZone {
    AvailabilityZone::new("us-east-1a").unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn(AppServices::in_memory(zone())).await;
    assert_eq!(srv.get("/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn first_request_creates_service_and_second_scales_it() {
    let srv = TestServer::spawn(AppServices::in_memory(zone())).await;

    let res = srv.get("/user/acme/chat").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["service_name"], "user-service-1a");
    assert_eq!(body["action"], "created");
    assert_eq!(body["desired_count"], 1);
    assert_eq!(body["placement"]["assign_public_ip"], false);

    let res = srv.get("/user/globex/upload").await;
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["action"], "scaled_out");
    assert_eq!(body["desired_count"], 2);

    let res = srv.get("/admin/acme").await;
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["service_name"], "admin-service-1a");
    assert_eq!(body["action"], "created");
}

#[tokio::test]
async fn invalid_paths_are_rejected_with_next_step() {
    let srv = TestServer::spawn(AppServices::in_memory(zone())).await;

    for path in ["/bogus/acme/x", "/user", "/"] {
        let res = srv.get(path).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_path");
        assert!(body["next_step"].as_str().unwrap().contains("/user/{tenant}"));
    }
}

#[tokio::test]
async fn launch_failure_maps_to_bad_gateway() {
    let services = AppServices::in_memory(zone());
    services.orchestrator().fail_next_launches(1);
    let srv = TestServer::spawn(services).await;

    let res = srv.get("/admin/acme/x").await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "launch_failed");
    assert!(body["message"].as_str().unwrap().contains("admin-service-1a"));
}

#[tokio::test]
async fn scaling_past_max_capacity_is_a_conflict() {
    let srv = TestServer::spawn(AppServices::in_memory(zone())).await;

    // Default policy allows ten workers.
    for _ in 0..10 {
        assert_eq!(srv.get("/user/acme").await.status(), StatusCode::OK);
    }
    let res = srv.get("/user/acme").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "at_capacity");
}

#[tokio::test]
async fn failed_requests_are_listed() {
    let services = AppServices::in_memory(zone());
    let checkpoints = Arc::clone(&services.checkpoints);
    let (broken, done) = (RequestId::new("broken").unwrap(), RequestId::new("done").unwrap());
    checkpoints.record(&broken, ChunkId::new(0), ChunkStatus::Processed).unwrap();
    checkpoints.record(&broken, ChunkId::new(1), ChunkStatus::Failed).unwrap();
    checkpoints.record(&done, ChunkId::new(0), ChunkStatus::Processed).unwrap();
    let srv = TestServer::spawn(services).await;

    let body: serde_json::Value = srv.get("/requests/failed").await.json().await.unwrap();
    assert_eq!(body["requests"], serde_json::json!(["broken"]));
}

#[tokio::test]
async fn capacity_report_counts_silent_and_live_workers() {
    let services = AppServices::in_memory(zone());
    let registry = Arc::clone(&services.registry);
    let srv = TestServer::spawn(services).await;

    let first: serde_json::Value = srv.get("/user/acme").await.json().await.unwrap();
    srv.get("/user/acme").await;
    let live = ContainerId::new(first["container_id"].as_str().unwrap()).unwrap();
    registry
        .put_heartbeat(&WorkerHeartbeat::ok(live.clone(), None, None, Utc::now()))
        .unwrap();

    let report: serde_json::Value = srv.get("/services/user").await.json().await.unwrap();
    assert_eq!(report["desired_count"], 2);
    assert_eq!(report["live"], serde_json::json!([live.as_str()]));
    assert_eq!(report["silent"].as_array().unwrap().len(), 1);
    assert_eq!(report["deficit"], 1);

    let workers: serde_json::Value = srv.get("/workers").await.json().await.unwrap();
    assert_eq!(workers["live"], serde_json::json!([live.as_str()]));

    assert_eq!(srv.get("/services/admin").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.get("/services/robot").await.status(), StatusCode::BAD_REQUEST);
}
