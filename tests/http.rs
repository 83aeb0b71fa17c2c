use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_provider_mock::MockProvider;
use coding_agent::agent::AgentSettings;
use coding_agent::interpreter::CommandInterpreter;
use coding_agent::model::RetryingModel;
use coding_agent::project::WorkspaceProject;
use coding_agent::{AgentFactory, AgentRole, Copilot, SessionArbiter};
use ide_copilot::Server;
use serde_json::{json, Value};
use tempfile::TempDir;

const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

struct Harness {
    _dir: TempDir,
    server: Server,
    client: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("README.md"), "# demo\n").expect("seed readme");
        let project = Arc::new(WorkspaceProject::new(dir.path()).expect("workspace project"));

        let model = RetryingModel::new(Arc::new(MockProvider::default()))
            .with_retry(1, Duration::ZERO);
        let factory = AgentFactory::new(
            model,
            Arc::new(CommandInterpreter::new(project)),
            AgentSettings::default(),
        );
        let copilot = Copilot::new(
            Arc::new(SessionArbiter::new()),
            factory,
            AgentRole::Supervisor,
        )
        .with_intervals(Duration::from_millis(50), Duration::from_millis(10));

        let server = Server::bind(Arc::new(copilot), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind server");
        Self {
            _dir: dir,
            server,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.server.addr())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("send request");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.expect("json body");
        (status, body)
    }
}

#[tokio::test]
async fn send_message_claims_the_session_once() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post("/send_message", json!({ "session_id": "s1", "message": "hello" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "success" }));

    let (status, body) = harness
        .post("/send_message", json!({ "session_id": "s1", "message": "again" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "status": "error", "message": "Session is locked" }));
}

#[tokio::test]
async fn send_message_rejects_empty_message() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post("/send_message", json!({ "session_id": "s1", "message": "   " }))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["message"], "Empty message");
}

#[tokio::test]
async fn control_validates_session_and_command() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post("/control", json!({ "session_id": "", "command": "stop" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "empty session");

    let (status, body) = harness
        .post("/control", json!({ "session_id": "s1", "command": "pause" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "invalid command");

    let (status, body) = harness
        .post("/control", json!({ "session_id": "s1", "command": "stop" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "success" }));
}

#[tokio::test]
async fn events_require_a_session_id() {
    let harness = Harness::start().await;

    let response = harness
        .client
        .get(harness.url("/events"))
        .send()
        .await
        .expect("send request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn events_stream_a_queued_run_until_done() {
    let harness = Harness::start().await;
    let (status, _) = harness
        .post("/send_message", json!({ "session_id": "s1", "message": "say hi" }))
        .await;
    assert_eq!(status, 200);

    let mut response = harness
        .client
        .get(harness.url("/events?session_id=s1"))
        .send()
        .await
        .expect("open stream");
    assert_eq!(response.status().as_u16(), 200);

    let body = tokio::time::timeout(STREAM_TIMEOUT, async {
        let mut body = String::new();
        while !body.contains("data: [DONE]") {
            match response.chunk().await.expect("read chunk") {
                Some(chunk) => body.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
        body
    })
    .await
    .expect("stream finishes the run");

    assert!(body.contains(r#""type":"heartbeat""#));
    assert!(body.contains(r#""type":"status""#));
    assert!(body.contains("start SUPERVISOR..."));
    assert!(body.contains(r#""type":"end""#));
    assert!(body.contains("data: [DONE]"));
}
