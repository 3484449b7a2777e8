//! Rigdeck store: periodic polling of the panel and the published dashboard snapshot

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use metrics::{counter, gauge, histogram};
use rigdeck_api::{PanelApi, RigResult};
use rigdeck_core::{BatchState, BatchTracker, GpuInfo, InvokeStatus, OllamaStatus, ProcessInfo, ProgressView, SystemInfo};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Latest state of one polled feed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Feed<T> {
    #[default]
    Pending,
    Ready(T),
    /// Error string shown in place of the data.
    Failed(String),
}

impl<T> Feed<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Feed::Ready(v) => Some(v),
            _ => None,
        }
    }

    fn from_result(res: RigResult<T>) -> Self {
        match res {
            Ok(v) => Feed::Ready(v),
            Err(e) => Feed::Failed(e.to_string()),
        }
    }
}

/// Everything a frontend renders, swapped in whole on every completed poll.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Dashboard {
    pub epoch: u64,
    /// Unix seconds of the last publish.
    pub updated_at: i64,
    pub system: Feed<SystemInfo>,
    pub gpus: Feed<Vec<GpuInfo>>,
    pub processes: Feed<Vec<ProcessInfo>>,
    pub ollama: Feed<OllamaStatus>,
    pub invoke: Feed<InvokeStatus>,
    pub progress: ProgressView,
    pub batch: BatchState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    System,
    Gpu,
    Processes,
    /// Image-generation queue together with the LLM server status.
    Queue,
}

impl FeedKind {
    pub fn name(self) -> &'static str {
        match self {
            FeedKind::System => "system",
            FeedKind::Gpu => "gpu",
            FeedKind::Processes => "processes",
            FeedKind::Queue => "queue",
        }
    }
}

/// Poll intervals per feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub system_every: Duration,
    pub gpu_every: Duration,
    pub process_every: Duration,
    pub queue_every: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            system_every: Duration::from_secs(3),
            gpu_every: Duration::from_secs(5),
            process_every: Duration::from_secs(10),
            queue_every: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// Override defaults from `RIGDECK_{SYSTEM,GPU,PROCESS,QUEUE}_POLL_SECS`.
    pub fn from_env() -> Self {
        fn secs(var: &str, default: Duration) -> Duration {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        }
        let d = Self::default();
        Self {
            system_every: secs("RIGDECK_SYSTEM_POLL_SECS", d.system_every),
            gpu_every: secs("RIGDECK_GPU_POLL_SECS", d.gpu_every),
            process_every: secs("RIGDECK_PROCESS_POLL_SECS", d.process_every),
            queue_every: secs("RIGDECK_QUEUE_POLL_SECS", d.queue_every),
        }
    }
}

/// Feeds queue-status readings into the batch tracker.
#[derive(Debug, Default)]
pub struct QueueFeed {
    tracker: BatchTracker,
}

impl QueueFeed {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> BatchState { self.tracker.state() }

    /// A failed fetch counts as "no queue data": tracking survives it. Only a
    /// reading that says the service is down resets the batch.
    pub fn apply(&mut self, reading: &RigResult<InvokeStatus>) -> ProgressView {
        match reading {
            Ok(st) if !st.running => self.tracker.update(None, false),
            Ok(st) => self.tracker.update(st.queue.as_ref(), true),
            Err(_) => self.tracker.update(None, true),
        }
    }
}

/// Accumulates feed results and freezes them into snapshots.
#[derive(Debug, Default)]
pub struct DashboardBuilder {
    current: Dashboard,
}

impl DashboardBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn set_system(&mut self, res: RigResult<SystemInfo>) { self.current.system = Feed::from_result(res); }
    pub fn set_gpus(&mut self, res: RigResult<Vec<GpuInfo>>) { self.current.gpus = Feed::from_result(res); }
    pub fn set_processes(&mut self, res: RigResult<Vec<ProcessInfo>>) { self.current.processes = Feed::from_result(res); }
    pub fn set_ollama(&mut self, res: RigResult<OllamaStatus>) { self.current.ollama = Feed::from_result(res); }

    pub fn set_queue(&mut self, res: RigResult<InvokeStatus>, progress: ProgressView, batch: BatchState) {
        self.current.invoke = Feed::from_result(res);
        self.current.progress = progress;
        self.current.batch = batch;
    }

    /// Bump the epoch and return an immutable copy.
    pub fn freeze(&mut self) -> Arc<Dashboard> {
        self.current.epoch = self.current.epoch.saturating_add(1);
        self.current.updated_at = chrono::Utc::now().timestamp();
        Arc::new(self.current.clone())
    }
}

/// Single-writer poll driver. Owns the tracker; nothing else mutates it.
pub struct Poller {
    api: Arc<dyn PanelApi>,
    builder: DashboardBuilder,
    queue: QueueFeed,
}

impl Poller {
    pub fn new(api: Arc<dyn PanelApi>) -> Self {
        Self { api, builder: DashboardBuilder::new(), queue: QueueFeed::new() }
    }

    /// Fetch one feed and return the updated snapshot.
    pub async fn poll(&mut self, feed: FeedKind) -> Arc<Dashboard> {
        let t0 = Instant::now();
        let ok = match feed {
            FeedKind::System => {
                let res = self.api.system_info().await;
                let ok = res.is_ok();
                self.builder.set_system(res);
                ok
            }
            FeedKind::Gpu => {
                let res = self.api.gpu_info().await;
                let ok = res.is_ok();
                self.builder.set_gpus(res);
                ok
            }
            FeedKind::Processes => {
                let res = self.api.running_apps().await;
                let ok = res.is_ok();
                self.builder.set_processes(res);
                ok
            }
            FeedKind::Queue => {
                let (invoke, ollama) = tokio::join!(self.api.invokeai_info(), self.api.ollama_info());
                let ok = invoke.is_ok();
                let was_tracking = self.queue.state().is_tracking();
                let progress = self.queue.apply(&invoke);
                let batch = self.queue.state();
                match (was_tracking, batch.is_tracking()) {
                    (false, true) => info!(total = batch.batch_total(), "batch started"),
                    (true, false) => info!("batch drained"),
                    _ => {}
                }
                gauge!("batch_tracking", if batch.is_tracking() { 1.0 } else { 0.0 });
                self.builder.set_queue(invoke, progress, batch);
                self.builder.set_ollama(ollama);
                ok
            }
        };
        let took = t0.elapsed().as_secs_f64() * 1000.0;
        histogram!("poll_ms", took, "feed" => feed.name());
        if !ok {
            counter!("poll_errors", 1, "feed" => feed.name());
            debug!(feed = feed.name(), "poll failed");
        }
        self.builder.freeze()
    }
}

/// Handle for readers to access the current dashboard and subscribe to swaps.
pub struct PollerHandle {
    snap: Arc<ArcSwap<Dashboard>>,
    epoch_rx: watch::Receiver<u64>,
    task: tokio::task::JoinHandle<()>,
}

impl PollerHandle {
    pub fn current(&self) -> Arc<Dashboard> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }

    /// Stop polling. Tracking state is discarded with the task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

fn ticker(every: Duration) -> tokio::time::Interval {
    let mut t = tokio::time::interval(every);
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

/// Spawn the poll loop. Each feed ticks on its own interval; the first tick
/// of every feed fires immediately.
pub fn spawn_poller(api: Arc<dyn PanelApi>, cfg: PollConfig) -> PollerHandle {
    let snap = Arc::new(ArcSwap::from_pointee(Dashboard::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let snap_clone = Arc::clone(&snap);

    let task = tokio::spawn(async move {
        info!(?cfg, "poller started");
        let mut poller = Poller::new(api);
        let mut system = ticker(cfg.system_every);
        let mut gpu = ticker(cfg.gpu_every);
        let mut procs = ticker(cfg.process_every);
        let mut queue = ticker(cfg.queue_every);
        loop {
            let feed = tokio::select! {
                _ = queue.tick() => FeedKind::Queue,
                _ = system.tick() => FeedKind::System,
                _ = gpu.tick() => FeedKind::Gpu,
                _ = procs.tick() => FeedKind::Processes,
            };
            let next = poller.poll(feed).await;
            let epoch = next.epoch;
            snap_clone.store(next);
            if epoch_tx.send(epoch).is_err() {
                warn!("all epoch subscribers gone; poller stopping");
                break;
            }
        }
        info!("poller stopped");
    });

    PollerHandle { snap, epoch_rx, task }
}
