//! Rigdeck public API façade.
//!
//! Frontends (CLI, poller) depend on the [`PanelApi`] trait only. [`HttpApi`]
//! talks to a live panel through `rigdeck-probe`; [`MockApi`] serves canned
//! data for tests.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rigdeck_core::{ControlReply, GpuInfo, InvokeStatus, OllamaStatus, ProcessInfo, Service, SystemInfo, ToggleAction};
use rigdeck_probe::{FailureKind, PanelClient};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_PANEL_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Endpoints and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub panel_url: String,
    pub ollama_url: String,
    pub http_timeout: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            panel_url: DEFAULT_PANEL_URL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            http_timeout: Duration::from_millis(2000),
        }
    }
}

impl PanelConfig {
    /// Read `RIGDECK_PANEL_URL`, `RIGDECK_OLLAMA_URL` and `RIGDECK_HTTP_TIMEOUT_MS`, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let panel_url = std::env::var("RIGDECK_PANEL_URL").ok().filter(|s| !s.is_empty()).unwrap_or(d.panel_url);
        let ollama_url = std::env::var("RIGDECK_OLLAMA_URL").ok().filter(|s| !s.is_empty()).unwrap_or(d.ollama_url);
        let http_timeout = std::env::var("RIGDECK_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.http_timeout);
        Self { panel_url, ollama_url, http_timeout }
    }
}

/// API errors; serialisable so they can be shown or logged as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RigError {
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("remote: {0}")]
    Remote(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type RigResult<T> = Result<T, RigError>;

impl From<anyhow::Error> for RigError {
    fn from(e: anyhow::Error) -> Self {
        let msg = format!("{:#}", e);
        match rigdeck_probe::classify(&e) {
            FailureKind::Transport => RigError::Unreachable(msg),
            FailureKind::Remote | FailureKind::Decode => RigError::Remote(msg),
        }
    }
}

/// Turn a control reply into the confirmation string, or a rejection.
pub fn reply_to_result(reply: ControlReply) -> RigResult<String> {
    match (reply.message, reply.error) {
        (_, Some(err)) => Err(RigError::Rejected(err)),
        (Some(msg), None) => Ok(msg),
        (None, None) => Ok(String::new()),
    }
}

pub fn validate_app_name(name: &str) -> RigResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RigError::Validation("application name not provided".into()));
    }
    Ok(name)
}

/// Scripts are batch files addressed by bare file name.
pub fn validate_script_name(name: &str) -> RigResult<&str> {
    let name = name.trim();
    if !name.ends_with(".bat") || name.len() == ".bat".len() {
        return Err(RigError::Validation(format!("invalid script name: {:?} (expect <name>.bat)", name)));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(RigError::Validation(format!("script name must not contain a path: {:?}", name)));
    }
    Ok(name)
}

pub fn validate_model_name(name: &str) -> RigResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RigError::Validation("model name not provided".into()));
    }
    Ok(name)
}

/// Control panel API surface.
#[async_trait::async_trait]
pub trait PanelApi: Send + Sync {
    async fn system_info(&self) -> RigResult<SystemInfo>;

    async fn gpu_info(&self) -> RigResult<Vec<GpuInfo>>;

    async fn running_apps(&self) -> RigResult<Vec<ProcessInfo>>;

    async fn ollama_info(&self) -> RigResult<OllamaStatus>;

    /// Image-generation service status including queue counters when available.
    async fn invokeai_info(&self) -> RigResult<InvokeStatus>;

    /// Start or stop a model-serving service; returns the panel's confirmation.
    async fn toggle(&self, service: Service, action: ToggleAction) -> RigResult<String>;

    async fn start_app(&self, app_name: &str) -> RigResult<String>;

    async fn stop_app(&self, app_name: &str) -> RigResult<String>;

    async fn run_script(&self, script_name: &str) -> RigResult<String>;

    async fn load_model(&self, model: &str, keep_alive: Option<&str>) -> RigResult<String>;

    async fn unload_model(&self, model: &str) -> RigResult<String>;
}

// ----------------- HTTP implementation -----------------

/// Live implementation over the panel's REST endpoints.
pub struct HttpApi {
    client: PanelClient,
}

impl HttpApi {
    pub fn new(cfg: &PanelConfig) -> RigResult<Self> {
        let client = PanelClient::new(&cfg.panel_url, &cfg.ollama_url, cfg.http_timeout)
            .map_err(|e| RigError::Internal(e.to_string()))?;
        info!(panel = %client.panel_url(), ollama = %client.ollama_url(), timeout_ms = %cfg.http_timeout.as_millis(), "api: http client ready");
        Ok(Self { client })
    }

    fn finish<T>(op: &'static str, t0: Instant, res: anyhow::Result<T>) -> RigResult<T> {
        match res {
            Ok(v) => {
                info!(took_ms = %t0.elapsed().as_millis(), "api: {} ok", op);
                Ok(v)
            }
            Err(e) => {
                let err = RigError::from(e);
                warn!(error = %err, took_ms = %t0.elapsed().as_millis(), "api: {} failed", op);
                Err(err)
            }
        }
    }

    fn control(op: &'static str, t0: Instant, res: anyhow::Result<ControlReply>) -> RigResult<String> {
        Self::finish(op, t0, res).and_then(reply_to_result)
    }
}

#[async_trait::async_trait]
impl PanelApi for HttpApi {
    async fn system_info(&self) -> RigResult<SystemInfo> {
        let t0 = Instant::now();
        Self::finish("system_info", t0, self.client.system_info().await)
    }

    async fn gpu_info(&self) -> RigResult<Vec<GpuInfo>> {
        let t0 = Instant::now();
        Self::finish("gpu_info", t0, self.client.gpu_info().await)
    }

    async fn running_apps(&self) -> RigResult<Vec<ProcessInfo>> {
        let t0 = Instant::now();
        let res = Self::finish("running_apps", t0, self.client.running_apps().await)?;
        info!(count = res.len(), "api: running_apps listed");
        Ok(res)
    }

    async fn ollama_info(&self) -> RigResult<OllamaStatus> {
        let t0 = Instant::now();
        Self::finish("ollama_info", t0, self.client.ollama_info().await)
    }

    async fn invokeai_info(&self) -> RigResult<InvokeStatus> {
        let t0 = Instant::now();
        Self::finish("invokeai_info", t0, self.client.invokeai_info().await)
    }

    async fn toggle(&self, service: Service, action: ToggleAction) -> RigResult<String> {
        let t0 = Instant::now();
        info!(service = %service, action = ?action, "api: toggle start");
        Self::control("toggle", t0, self.client.toggle(service, action).await)
    }

    async fn start_app(&self, app_name: &str) -> RigResult<String> {
        let app_name = validate_app_name(app_name)?;
        let t0 = Instant::now();
        info!(app = %app_name, "api: start_app start");
        Self::control("start_app", t0, self.client.start_app(app_name).await)
    }

    async fn stop_app(&self, app_name: &str) -> RigResult<String> {
        let app_name = validate_app_name(app_name)?;
        let t0 = Instant::now();
        info!(app = %app_name, "api: stop_app start");
        Self::control("stop_app", t0, self.client.stop_app(app_name).await)
    }

    async fn run_script(&self, script_name: &str) -> RigResult<String> {
        let script_name = validate_script_name(script_name)?;
        let t0 = Instant::now();
        info!(script = %script_name, "api: run_script start");
        Self::control("run_script", t0, self.client.run_script(script_name).await)
    }

    async fn load_model(&self, model: &str, keep_alive: Option<&str>) -> RigResult<String> {
        let model = validate_model_name(model)?;
        let t0 = Instant::now();
        info!(model = %model, keep_alive = ?keep_alive, "api: load_model start");
        Self::control("load_model", t0, self.client.load_model(model, keep_alive).await)
    }

    async fn unload_model(&self, model: &str) -> RigResult<String> {
        let model = validate_model_name(model)?;
        let t0 = Instant::now();
        info!(model = %model, "api: unload_model start");
        Self::control("unload_model", t0, self.client.unload_model(model).await)
    }
}

// ----------------- Mock implementation -----------------

/// Simple in-memory mock implementation for tests.
///
/// `invoke_script` is consumed one entry per `invokeai_info` call; once it is
/// empty, `invoke` is returned. Control calls are recorded in `calls` and
/// answered with `control_reply`.
pub struct MockApi {
    pub system: Option<SystemInfo>,
    pub gpus: Option<Vec<GpuInfo>>,
    pub processes: Vec<ProcessInfo>,
    pub ollama: OllamaStatus,
    pub invoke: InvokeStatus,
    pub invoke_script: Mutex<VecDeque<RigResult<InvokeStatus>>>,
    pub control_reply: ControlReply,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            system: None,
            gpus: None,
            processes: Vec::new(),
            ollama: OllamaStatus::default(),
            invoke: InvokeStatus::default(),
            invoke_script: Mutex::new(VecDeque::new()),
            control_reply: ControlReply { message: Some("ok".into()), error: None },
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockApi {
    pub fn new() -> Self { Self::default() }

    /// Queue readings to be returned by successive `invokeai_info` calls.
    pub fn with_invoke_script(self, script: Vec<RigResult<InvokeStatus>>) -> Self {
        if let Ok(mut q) = self.invoke_script.lock() {
            q.extend(script);
        }
        self
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) -> RigResult<String> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
        reply_to_result(self.control_reply.clone())
    }
}

#[async_trait::async_trait]
impl PanelApi for MockApi {
    async fn system_info(&self) -> RigResult<SystemInfo> {
        self.system.clone().ok_or_else(|| RigError::Unreachable("no system info".into()))
    }

    async fn gpu_info(&self) -> RigResult<Vec<GpuInfo>> {
        self.gpus.clone().ok_or_else(|| RigError::Remote("NVIDIA driver not found".into()))
    }

    async fn running_apps(&self) -> RigResult<Vec<ProcessInfo>> { Ok(self.processes.clone()) }

    async fn ollama_info(&self) -> RigResult<OllamaStatus> { Ok(self.ollama.clone()) }

    async fn invokeai_info(&self) -> RigResult<InvokeStatus> {
        let next = self.invoke_script.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Ok(self.invoke.clone()))
    }

    async fn toggle(&self, service: Service, action: ToggleAction) -> RigResult<String> {
        let action = match action { ToggleAction::Start => "start", ToggleAction::Stop => "stop" };
        self.record(format!("toggle {} {}", service.slug(), action))
    }

    async fn start_app(&self, app_name: &str) -> RigResult<String> {
        let app_name = validate_app_name(app_name)?;
        self.record(format!("start-app {}", app_name))
    }

    async fn stop_app(&self, app_name: &str) -> RigResult<String> {
        let app_name = validate_app_name(app_name)?;
        self.record(format!("stop-app {}", app_name))
    }

    async fn run_script(&self, script_name: &str) -> RigResult<String> {
        let script_name = validate_script_name(script_name)?;
        self.record(format!("run-script {}", script_name))
    }

    async fn load_model(&self, model: &str, keep_alive: Option<&str>) -> RigResult<String> {
        let model = validate_model_name(model)?;
        self.record(format!("load {} {}", model, keep_alive.unwrap_or("-")))
    }

    async fn unload_model(&self, model: &str) -> RigResult<String> {
        let model = validate_model_name(model)?;
        self.record(format!("unload {}", model))
    }
}
