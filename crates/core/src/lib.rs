//! Rigdeck core types: panel wire payloads and batch progress tracking.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod format;
pub mod progress;

pub use progress::{step, BatchState, BatchTracker, ProgressView};

/// One polled reading of the image-generation queue counters.
///
/// Counters are cumulative since an epoch chosen by the server. The wire
/// payload also carries a `total`, which nothing here relies on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub canceled: u64,
}

impl QueueSnapshot {
    /// Items not yet finished: `pending + in_progress`.
    pub fn active(&self) -> u64 {
        self.pending.saturating_add(self.in_progress)
    }

    /// Items that left the queue for any reason: `completed + failed + canceled`.
    pub fn processed(&self) -> u64 {
        self.completed.saturating_add(self.failed).saturating_add(self.canceled)
    }
}

/// Status of the image-generation service as reported by the panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvokeStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub is_generating: bool,
    /// Absent when the service is down or its queue could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A model currently held in memory by the LLM server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_vram: u64,
    #[serde(default)]
    pub digest: String,
    /// RFC 3339 timestamp after which the server evicts the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OllamaStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub models: Vec<LoadedModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Host CPU/RAM usage in percent, plus whatever temperature sensors the host exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub ram_usage: f64,
    #[serde(default)]
    pub temperatures: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GpuInfo {
    #[serde(default)]
    pub name: String,
    /// Degrees Celsius.
    #[serde(default)]
    pub temperature: u32,
    /// Percent of max fan speed.
    #[serde(default)]
    pub fan_speed: u32,
    #[serde(default)]
    pub memory_total: u64,
    #[serde(default)]
    pub memory_used: u64,
    #[serde(default)]
    pub memory_free: u64,
    #[serde(default)]
    pub utilization_gpu: u32,
    #[serde(default)]
    pub utilization_mem: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    /// `None` when the host denied access to the process or it exited mid-scan.
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_percent: Option<f64>,
}

/// Body returned by every control endpoint: either a confirmation or an error string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Model-serving services the panel can start and stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Ollama,
    #[serde(rename = "invokeai")]
    InvokeAi,
}

impl Service {
    /// Path segment used by the panel's toggle endpoint.
    pub fn slug(self) -> &'static str {
        match self {
            Service::Ollama => "ollama",
            Service::InvokeAi => "invokeai",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Ollama => f.write_str("Ollama"),
            Service::InvokeAi => f.write_str("InvokeAI"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Start,
    Stop,
}

pub mod prelude {
    pub use super::{
        BatchState, BatchTracker, ControlReply, GpuInfo, InvokeStatus, LoadedModel, OllamaStatus,
        ProcessInfo, ProgressView, QueueSnapshot, Service, SystemInfo, ToggleAction,
    };
}
