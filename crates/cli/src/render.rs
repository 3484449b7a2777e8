//! Human-readable rendering of panel data.

use rigdeck_core::format::{format_bytes, format_percent};
use rigdeck_core::{GpuInfo, InvokeStatus, LoadedModel, OllamaStatus, ProcessInfo, SystemInfo};
use rigdeck_store::{Dashboard, Feed};

pub fn system_lines(info: &SystemInfo) -> Vec<String> {
    let mut out = vec![
        format!("CPU: {}%", format_percent(info.cpu_usage)),
        format!("RAM: {}%", format_percent(info.ram_usage)),
    ];
    for (sensor, temp) in &info.temperatures {
        out.push(format!("{}: {:.1}°C", sensor.trim(), temp));
    }
    out
}

pub fn gpu_lines(gpu: &GpuInfo) -> Vec<String> {
    vec![
        gpu.name.clone(),
        format!("  Temperature: {}°C", gpu.temperature),
        format!("  Fan Speed: {}%", gpu.fan_speed),
        format!("  GPU Utilization: {}%", gpu.utilization_gpu),
        format!("  Memory: {} / {}", format_bytes(gpu.memory_used, 2), format_bytes(gpu.memory_total, 2)),
    ]
}

fn usage(v: Option<f64>) -> String {
    v.map(|v| format!("{:.1}%", v)).unwrap_or_else(|| "-".to_string())
}

pub fn process_line(p: &ProcessInfo) -> String {
    format!(
        "{} (PID: {}, User: {}, CPU: {}, Mem: {})",
        p.name, p.pid, p.username, usage(p.cpu_percent), usage(p.memory_percent)
    )
}

pub fn model_line(m: &LoadedModel, now_ts: i64) -> String {
    let name = if m.name.is_empty() { &m.model } else { &m.name };
    let expiry = m
        .expires_at
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| render_remaining(dt.timestamp() - now_ts))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<28} {:>10} {:>10} {}",
        name,
        format_bytes(m.size, 1),
        format_bytes(m.size_vram, 1),
        expiry
    )
}

pub fn ollama_summary(st: &OllamaStatus) -> String {
    if let Some(err) = &st.error {
        return format!("ollama: error ({})", err);
    }
    if !st.running {
        return "ollama: stopped".to_string();
    }
    match st.models.len() {
        0 => "ollama: running, no models loaded".to_string(),
        1 => "ollama: running, 1 model loaded".to_string(),
        n => format!("ollama: running, {} models loaded", n),
    }
}

pub fn invoke_summary(st: &InvokeStatus) -> String {
    if let Some(err) = &st.error {
        return format!("invokeai: error ({})", err);
    }
    if !st.running {
        return "invokeai: stopped".to_string();
    }
    let state = if st.is_generating { "generating" } else { "idle" };
    match &st.queue {
        Some(q) => format!(
            "invokeai: {} (pending {}, in progress {}, completed {}, failed {}, canceled {})",
            state, q.pending, q.in_progress, q.completed, q.failed, q.canceled
        ),
        None => format!("invokeai: {} (queue unavailable)", state),
    }
}

/// One status line for the live view. Progress appears only while a batch is visible.
pub fn dashboard_line(d: &Dashboard) -> String {
    let mut parts = Vec::new();
    match &d.system {
        Feed::Ready(s) => parts.push(format!("cpu {}% ram {}%", format_percent(s.cpu_usage), format_percent(s.ram_usage))),
        Feed::Failed(e) => parts.push(format!("system: {}", e)),
        Feed::Pending => {}
    }
    match &d.gpus {
        Feed::Ready(gpus) => {
            for (i, g) in gpus.iter().enumerate() {
                parts.push(format!("gpu{} {}°C {}%", i, g.temperature, g.utilization_gpu));
            }
        }
        Feed::Failed(e) => parts.push(format!("gpu: {}", e)),
        Feed::Pending => {}
    }
    match &d.invoke {
        Feed::Ready(st) if !st.running => parts.push("invokeai: stopped".to_string()),
        Feed::Ready(_) => match d.progress.label() {
            Some(label) => parts.push(format!("invokeai: {}", label)),
            None => parts.push("invokeai: idle".to_string()),
        },
        Feed::Failed(e) => parts.push(format!("invokeai: {}", e)),
        Feed::Pending => {}
    }
    match &d.ollama {
        Feed::Ready(st) => parts.push(ollama_summary(st)),
        Feed::Failed(e) => parts.push(format!("ollama: {}", e)),
        Feed::Pending => {}
    }
    parts.join(" | ")
}

fn render_remaining(secs: i64) -> String {
    if secs <= 0 {
        return "expired".to_string();
    }
    let mut secs = secs as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("in {}d{}h", days, hours) }
    else if hours > 0 { format!("in {}h{}m", hours, mins) }
    else if mins > 0 { format!("in {}m", mins) }
    else { format!("in {}s", secs) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigdeck_core::{ProgressView, QueueSnapshot};

    #[test]
    fn process_row_matches_panel_format() {
        let p = ProcessInfo { pid: 42, name: "python".into(), username: "me".into(), cpu_percent: Some(3.14159), memory_percent: Some(0.5) };
        assert_eq!(process_line(&p), "python (PID: 42, User: me, CPU: 3.1%, Mem: 0.5%)");
    }

    #[test]
    fn process_row_without_usage_shows_dash() {
        let p = ProcessInfo { pid: 7, name: "zombie".into(), username: "u".into(), ..Default::default() };
        assert_eq!(process_line(&p), "zombie (PID: 7, User: u, CPU: -, Mem: -)");
    }

    #[test]
    fn gpu_memory_uses_binary_units() {
        let g = GpuInfo { name: "RTX".into(), memory_used: 1024 * 1024 * 1024, memory_total: 8 * 1024 * 1024 * 1024, ..Default::default() };
        assert_eq!(gpu_lines(&g).last().map(String::as_str), Some("  Memory: 1 GB / 8 GB"));
    }

    #[test]
    fn model_expiry_rendered_relative() {
        let m = LoadedModel { name: "llama3:8b".into(), expires_at: Some("2030-01-01T00:05:00Z".into()), ..Default::default() };
        let now = chrono::DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap().timestamp();
        assert!(model_line(&m, now).ends_with("in 5m"));
        let gone = LoadedModel { expires_at: Some("garbage".into()), ..m };
        assert!(model_line(&gone, now).ends_with(" -"));
    }

    #[test]
    fn dashboard_line_shows_progress_only_when_visible() {
        let mut d = Dashboard {
            invoke: Feed::Ready(InvokeStatus {
                running: true,
                is_generating: true,
                queue: Some(QueueSnapshot { pending: 1, ..Default::default() }),
                error: None,
            }),
            progress: ProgressView { visible: true, processed: 2, total: 3 },
            ..Default::default()
        };
        assert_eq!(dashboard_line(&d), "invokeai: 2/3");
        d.progress = ProgressView::HIDDEN;
        assert_eq!(dashboard_line(&d), "invokeai: idle");
        d.invoke = Feed::Ready(InvokeStatus::default());
        assert_eq!(dashboard_line(&d), "invokeai: stopped");
    }

    #[test]
    fn summaries() {
        assert_eq!(ollama_summary(&OllamaStatus::default()), "ollama: stopped");
        let st = InvokeStatus { running: true, ..Default::default() };
        assert_eq!(invoke_summary(&st), "invokeai: idle (queue unavailable)");
    }
}
