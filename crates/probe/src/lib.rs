//! Rigdeck probe – HTTP wiring to the control panel and the local LLM server

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rigdeck_core::{ControlReply, GpuInfo, InvokeStatus, OllamaStatus, ProcessInfo, Service, SystemInfo, ToggleAction};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Non-success HTTP status from the panel, with the `error` string from its body when present.
#[derive(Debug, thiserror::Error)]
#[error("{message} (HTTP {status})")]
pub struct RemoteError {
    pub status: u16,
    pub message: String,
}

/// Coarse origin of a failed call, used by callers to pick an error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, DNS, timeout and other transport faults.
    Transport,
    /// The server answered with a non-success status.
    Remote,
    /// The server answered but the body did not match the expected shape.
    Decode,
}

pub fn classify(err: &anyhow::Error) -> FailureKind {
    for cause in err.chain() {
        if cause.downcast_ref::<RemoteError>().is_some() {
            return FailureKind::Remote;
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return FailureKind::Decode;
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return if e.is_decode() { FailureKind::Decode } else { FailureKind::Transport };
        }
    }
    FailureKind::Transport
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the panel's REST endpoints plus the model endpoints of the LLM server.
#[derive(Debug, Clone)]
pub struct PanelClient {
    http: reqwest::Client,
    panel_url: String,
    ollama_url: String,
}

impl PanelClient {
    pub fn new(panel_url: &str, ollama_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            panel_url: panel_url.trim_end_matches('/').to_string(),
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn panel_url(&self) -> &str { &self.panel_url }
    pub fn ollama_url(&self) -> &str { &self.ollama_url }

    fn panel(&self, path: &str) -> String { format!("{}{}", self.panel_url, path) }

    /// GET expecting a 2xx JSON body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let t0 = Instant::now();
        let resp = self.http.get(self.panel(path)).send().await.with_context(|| format!("GET {}", path))?;
        let status = resp.status();
        let body = resp.bytes().await.with_context(|| format!("reading {} body", path))?;
        debug!(path, status = status.as_u16(), bytes = body.len(), took_ms = %t0.elapsed().as_millis(), "probe: get");
        if !status.is_success() {
            return Err(remote_error(status.as_u16(), &body).into());
        }
        serde_json::from_slice(&body).with_context(|| format!("decoding {} body", path))
    }

    /// GET for the service status endpoints, which report failures inside a
    /// well-formed body even when the status is 5xx.
    async fn get_status<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let t0 = Instant::now();
        let resp = self.http.get(self.panel(path)).send().await.with_context(|| format!("GET {}", path))?;
        let status = resp.status();
        let body = resp.bytes().await.with_context(|| format!("reading {} body", path))?;
        debug!(path, status = status.as_u16(), bytes = body.len(), took_ms = %t0.elapsed().as_millis(), "probe: get status");
        match serde_json::from_slice(&body) {
            Ok(v) => Ok(v),
            Err(_) if !status.is_success() => Err(remote_error(status.as_u16(), &body).into()),
            Err(e) => Err(e).with_context(|| format!("decoding {} body", path)),
        }
    }

    /// POST a control payload. Both `{message}` and `{error}` bodies decode to a reply.
    async fn post_control(&self, url: String, payload: serde_json::Value) -> Result<ControlReply> {
        let t0 = Instant::now();
        let resp = self.http.post(&url).json(&payload).send().await.with_context(|| format!("POST {}", url))?;
        let status = resp.status();
        let body = resp.bytes().await.with_context(|| format!("reading {} body", url))?;
        debug!(url = %url, status = status.as_u16(), took_ms = %t0.elapsed().as_millis(), "probe: post");
        match serde_json::from_slice::<ControlReply>(&body) {
            Ok(reply) if reply.message.is_some() || reply.error.is_some() => Ok(reply),
            _ if !status.is_success() => Err(remote_error(status.as_u16(), &body).into()),
            Ok(reply) => Ok(reply),
            Err(e) => Err(e).with_context(|| format!("decoding {} reply", url)),
        }
    }

    pub async fn system_info(&self) -> Result<SystemInfo> {
        self.get_json("/api/system-info").await
    }

    pub async fn gpu_info(&self) -> Result<Vec<GpuInfo>> {
        self.get_json("/api/gpu-info").await
    }

    pub async fn running_apps(&self) -> Result<Vec<ProcessInfo>> {
        self.get_json("/api/running-apps").await
    }

    pub async fn ollama_info(&self) -> Result<OllamaStatus> {
        self.get_status("/api/ollama-info").await
    }

    pub async fn invokeai_info(&self) -> Result<InvokeStatus> {
        self.get_status("/api/invokeai-info").await
    }

    pub async fn toggle(&self, service: Service, action: ToggleAction) -> Result<ControlReply> {
        let url = self.panel(&format!("/api/{}/toggle", service.slug()));
        self.post_control(url, serde_json::json!({ "action": action })).await
    }

    pub async fn start_app(&self, app_name: &str) -> Result<ControlReply> {
        self.post_control(self.panel("/api/start-app"), serde_json::json!({ "app_name": app_name })).await
    }

    pub async fn stop_app(&self, app_name: &str) -> Result<ControlReply> {
        self.post_control(self.panel("/api/stop-app"), serde_json::json!({ "app_name": app_name })).await
    }

    pub async fn run_script(&self, script_name: &str) -> Result<ControlReply> {
        self.post_control(self.panel("/api/run-script"), serde_json::json!({ "script_name": script_name })).await
    }

    /// Ask the LLM server to load `model` into memory. `keep_alive` is a
    /// server duration such as `"10m"`, or a bare number of seconds such as
    /// `"-1"` (keep forever); `None` keeps its default.
    pub async fn load_model(&self, model: &str, keep_alive: Option<&str>) -> Result<ControlReply> {
        let mut payload = serde_json::json!({ "model": model, "stream": false });
        if let Some(ka) = keep_alive {
            payload["keep_alive"] = keep_alive_value(ka);
        }
        self.generate(model, payload, "loaded").await
    }

    /// Ask the LLM server to evict `model` from memory.
    pub async fn unload_model(&self, model: &str) -> Result<ControlReply> {
        let payload = serde_json::json!({ "model": model, "stream": false, "keep_alive": 0 });
        self.generate(model, payload, "unloaded").await
    }

    async fn generate(&self, model: &str, payload: serde_json::Value, verb: &str) -> Result<ControlReply> {
        let url = format!("{}/api/generate", self.ollama_url);
        let t0 = Instant::now();
        let resp = self.http.post(&url).json(&payload).send().await.with_context(|| format!("POST {}", url))?;
        let status = resp.status();
        let body = resp.bytes().await.context("reading generate reply")?;
        let reply: GenerateReply = serde_json::from_slice(&body).unwrap_or_default();
        debug!(model, status = status.as_u16(), reason = ?reply.done_reason, took_ms = %t0.elapsed().as_millis(), "probe: generate");
        if let Some(error) = reply.error {
            warn!(model, error = %error, "model request rejected");
            return Ok(ControlReply { message: None, error: Some(error) });
        }
        if !status.is_success() {
            return Err(remote_error(status.as_u16(), &body).into());
        }
        Ok(ControlReply { message: Some(format!("Model \"{}\" {}.", model, verb)), error: None })
    }
}

/// Unitless values go out as JSON numbers; the server only accepts strings with a unit.
fn keep_alive_value(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(secs) => serde_json::Value::from(secs),
        Err(_) => serde_json::Value::String(raw.to_string()),
    }
}

fn remote_error(status: u16, body: &[u8]) -> RemoteError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("request failed with status {}", status));
    RemoteError { status, message }
}
