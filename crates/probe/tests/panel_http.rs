use std::time::Duration;

use rigdeck_core::{Service, ToggleAction};
use rigdeck_probe::{classify, FailureKind, PanelClient};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PanelClient {
    PanelClient::new(&server.uri(), &server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn system_info_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cpu_usage": 12.5,
            "ram_usage": 48.25,
            "temperatures": { "coretemp Package id 0": 51.0 }
        })))
        .mount(&server)
        .await;

    let info = client(&server).system_info().await.unwrap();
    assert_eq!(info.cpu_usage, 12.5);
    assert_eq!(info.ram_usage, 48.25);
    assert_eq!(info.temperatures.get("coretemp Package id 0"), Some(&51.0));
}

#[tokio::test]
async fn gpu_error_body_surfaces_as_remote() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/gpu-info"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "NVIDIA driver not found or pynvml not installed."
        })))
        .mount(&server)
        .await;

    let err = client(&server).gpu_info().await.unwrap_err();
    assert_eq!(classify(&err), FailureKind::Remote);
    assert!(format!("{:#}", err).contains("NVIDIA driver not found"));
}

#[tokio::test]
async fn invokeai_status_decoded_even_on_500() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/invokeai-info"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "running": false, "is_generating": false, "error": "boom"
        })))
        .mount(&server)
        .await;

    let st = client(&server).invokeai_info().await.unwrap();
    assert!(!st.running);
    assert!(st.queue.is_none());
    assert_eq!(st.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn invokeai_queue_counters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/invokeai-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "running": true,
            "is_generating": true,
            "queue": { "total": 13, "completed": 10, "in_progress": 1, "pending": 2, "failed": 0, "canceled": 0 }
        })))
        .mount(&server)
        .await;

    let st = client(&server).invokeai_info().await.unwrap();
    let q = st.queue.unwrap();
    assert_eq!(q.active(), 3);
    assert_eq!(q.processed(), 10);
}

#[tokio::test]
async fn ollama_models_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ollama-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "running": true,
            "models": [{ "name": "llama3:8b", "model": "llama3:8b", "size": 5_000_000_000u64, "size_vram": 4_800_000_000u64, "expires_at": "2030-01-01T00:00:00Z" }]
        })))
        .mount(&server)
        .await;

    let st = client(&server).ollama_info().await.unwrap();
    assert!(st.running);
    assert_eq!(st.models.len(), 1);
    assert_eq!(st.models[0].name, "llama3:8b");
    assert_eq!(st.models[0].expires_at.as_deref(), Some("2030-01-01T00:00:00Z"));
}

#[tokio::test]
async fn toggle_posts_action_and_reads_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/invokeai/toggle"))
        .and(body_json(json!({ "action": "start" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "InvokeAI server started." })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server).toggle(Service::InvokeAi, ToggleAction::Start).await.unwrap();
    assert_eq!(reply.message.as_deref(), Some("InvokeAI server started."));
    assert!(reply.error.is_none());
}

#[tokio::test]
async fn control_error_reply_is_not_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ollama/toggle"))
        .and(body_json(json!({ "action": "stop" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "Ollama is not running." })))
        .mount(&server)
        .await;

    let reply = client(&server).toggle(Service::Ollama, ToggleAction::Stop).await.unwrap();
    assert_eq!(reply.error.as_deref(), Some("Ollama is not running."));
}

#[tokio::test]
async fn app_and_script_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/start-app"))
        .and(body_json(json!({ "app_name": "notepad" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Application \"notepad\" started." })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/stop-app"))
        .and(body_json(json!({ "app_name": "notepad" })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Application \"notepad\" not found or could not be stopped." })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/run-script"))
        .and(body_json(json!({ "script_name": "example.bat" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Script \"example.bat\" started." })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert!(c.start_app("notepad").await.unwrap().message.is_some());
    assert!(c.stop_app("notepad").await.unwrap().error.is_some());
    assert_eq!(c.run_script("example.bat").await.unwrap().message.as_deref(), Some("Script \"example.bat\" started."));
}

#[tokio::test]
async fn load_and_unload_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "llama3:8b", "stream": false, "keep_alive": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "model": "llama3:8b", "done": true, "done_reason": "unload" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "llama3:8b", "stream": false, "keep_alive": "10m" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "model": "llama3:8b", "done": true, "done_reason": "load" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "missing", "stream": false })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "model \"missing\" not found, try pulling it first" })))
        .mount(&server)
        .await;

    let c = client(&server);
    let r = c.unload_model("llama3:8b").await.unwrap();
    assert_eq!(r.message.as_deref(), Some("Model \"llama3:8b\" unloaded."));
    let r = c.load_model("llama3:8b", Some("10m")).await.unwrap();
    assert_eq!(r.message.as_deref(), Some("Model \"llama3:8b\" loaded."));
    let r = c.load_model("missing", None).await.unwrap();
    assert!(r.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn running_apps_keeps_rows_with_denied_usage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/running-apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "pid": 1, "name": "python", "username": "me", "cpu_percent": 2.0, "memory_percent": 1.5 },
            { "pid": 2, "name": "zombie", "username": "u", "cpu_percent": null, "memory_percent": null }
        ])))
        .mount(&server)
        .await;

    let rows = client(&server).running_apps().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].memory_percent, Some(1.5));
    assert_eq!(rows[1].name, "zombie");
    assert!(rows[1].cpu_percent.is_none());
}

#[tokio::test]
async fn load_model_keep_forever_is_numeric() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "llama3", "stream": false, "keep_alive": -1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "model": "llama3", "done": true, "done_reason": "load" })))
        .expect(1)
        .mount(&server)
        .await;

    let r = client(&server).load_model("llama3", Some("-1")).await.unwrap();
    assert_eq!(r.message.as_deref(), Some("Model \"llama3\" loaded."));
}

#[tokio::test]
async fn unreachable_panel_is_transport() {
    // Nothing listens on the discard port.
    let c = PanelClient::new("http://127.0.0.1:9", "http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let err = c.invokeai_info().await.unwrap_err();
    assert_eq!(classify(&err), FailureKind::Transport);
}
