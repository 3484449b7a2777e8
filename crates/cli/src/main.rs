use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rigdeck_api::{HttpApi, PanelApi, PanelConfig, RigResult};
use rigdeck_core::{Service, ToggleAction};
use rigdeck_store::{spawn_poller, PollConfig};
use tokio::signal;
use tracing::{error, info, warn};

mod render;

#[derive(Parser, Debug)]
#[command(name = "rigctl", version, about = "Rigdeck control panel CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Control panel base URL
    #[arg(long = "panel-url", global = true, env = "RIGDECK_PANEL_URL")]
    panel_url: Option<String>,

    /// LLM server base URL (model load/unload)
    #[arg(long = "ollama-url", global = true, env = "RIGDECK_OLLAMA_URL")]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ServiceArg { Ollama, Invokeai }

impl From<ServiceArg> for Service {
    fn from(v: ServiceArg) -> Self {
        match v {
            ServiceArg::Ollama => Service::Ollama,
            ServiceArg::Invokeai => Service::InvokeAi,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ActionArg { Start, Stop }

impl From<ActionArg> for ToggleAction {
    fn from(v: ActionArg) -> Self {
        match v {
            ActionArg::Start => ToggleAction::Start,
            ActionArg::Stop => ToggleAction::Stop,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CPU, RAM and temperature sensors
    Sys,
    /// GPU telemetry
    Gpu,
    /// Running processes
    Ps {
        /// Limit rows
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },
    /// Models loaded by the LLM server
    Models,
    /// Image-generation service status and queue counters
    Queue,
    /// Start or stop a model-serving service
    Toggle {
        service: ServiceArg,
        action: ActionArg,
    },
    /// Start an allowed application by name
    StartApp { name: String },
    /// Stop every process with the given name
    StopApp { name: String },
    /// Run a batch script from the panel's scripts directory
    RunScript { name: String },
    /// Load a model into the LLM server
    Load {
        model: String,
        /// How long the server keeps the model loaded, e.g. "10m" or "-1"
        #[arg(long = "keep-alive", allow_hyphen_values = true)]
        keep_alive: Option<String>,
    },
    /// Unload a model from the LLM server
    Unload { model: String },
    /// Live dashboard with batch progress until Ctrl-C
    Watch,
}

fn init_tracing() {
    let env = std::env::var("RIGDECK_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RIGDECK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RIGDECK_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Print a control reply the way the panel shows it: the message, or the error.
fn report_control(what: &str, output: Output, res: RigResult<String>) -> Result<bool> {
    match (output, res) {
        (Output::Human, Ok(msg)) => {
            println!("{}", msg);
            Ok(true)
        }
        (Output::Json, Ok(msg)) => {
            print_json(&serde_json::json!({ "message": msg }))?;
            Ok(true)
        }
        (Output::Human, Err(e)) => {
            error!(error = %e, "{} failed", what);
            eprintln!("{} error: {}", what, e);
            Ok(false)
        }
        (Output::Json, Err(e)) => {
            print_json(&serde_json::json!({ "error": e.to_string() }))?;
            Ok(false)
        }
    }
}

/// Print a query failure; returns `false` so the caller can set the exit code.
fn report_failure(what: &str, e: &rigdeck_api::RigError) -> bool {
    error!(error = %e, "{} failed", what);
    eprintln!("{} error: {}", what, e);
    false
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let mut cfg = PanelConfig::from_env();
    if let Some(url) = cli.panel_url.clone() { cfg.panel_url = url; }
    if let Some(url) = cli.ollama_url.clone() { cfg.ollama_url = url; }
    let api: Arc<dyn PanelApi> = Arc::new(HttpApi::new(&cfg)?);

    let ok = match cli.command {
        Commands::Sys => match api.system_info().await {
            Ok(info) => {
                match cli.output {
                    Output::Human => render::system_lines(&info).iter().for_each(|l| println!("{}", l)),
                    Output::Json => print_json(&info)?,
                }
                true
            }
            Err(e) => report_failure("sys", &e),
        },
        Commands::Gpu => match api.gpu_info().await {
            Ok(gpus) => {
                match cli.output {
                    Output::Human => {
                        if gpus.is_empty() { println!("no GPUs reported"); }
                        for g in &gpus {
                            render::gpu_lines(g).iter().for_each(|l| println!("{}", l));
                        }
                    }
                    Output::Json => print_json(&gpus)?,
                }
                true
            }
            Err(e) => report_failure("gpu", &e),
        },
        Commands::Ps { limit } => match api.running_apps().await {
            Ok(procs) => {
                let shown: Vec<_> = procs.into_iter().take(limit).collect();
                match cli.output {
                    Output::Human => shown.iter().for_each(|p| println!("{}", render::process_line(p))),
                    Output::Json => print_json(&shown)?,
                }
                true
            }
            Err(e) => report_failure("ps", &e),
        },
        Commands::Models => match api.ollama_info().await {
            Ok(st) => {
                match cli.output {
                    Output::Human => {
                        println!("{}", render::ollama_summary(&st));
                        if !st.models.is_empty() {
                            println!("{:<28} {:>10} {:>10} {}", "NAME", "SIZE", "VRAM", "EXPIRES");
                            let now = chrono::Utc::now().timestamp();
                            for m in &st.models {
                                println!("{}", render::model_line(m, now));
                            }
                        }
                    }
                    Output::Json => print_json(&st)?,
                }
                true
            }
            Err(e) => report_failure("models", &e),
        },
        Commands::Queue => match api.invokeai_info().await {
            Ok(st) => {
                match cli.output {
                    Output::Human => println!("{}", render::invoke_summary(&st)),
                    Output::Json => print_json(&st)?,
                }
                true
            }
            Err(e) => report_failure("queue", &e),
        },
        Commands::Toggle { service, action } => {
            let (service, action): (Service, ToggleAction) = (service.into(), action.into());
            info!(service = %service, action = ?action, "toggle invoked");
            report_control("toggle", cli.output, api.toggle(service, action).await)?
        }
        Commands::StartApp { name } => report_control("start-app", cli.output, api.start_app(&name).await)?,
        Commands::StopApp { name } => report_control("stop-app", cli.output, api.stop_app(&name).await)?,
        Commands::RunScript { name } => report_control("run-script", cli.output, api.run_script(&name).await)?,
        Commands::Load { model, keep_alive } => {
            report_control("load", cli.output, api.load_model(&model, keep_alive.as_deref()).await)?
        }
        Commands::Unload { model } => report_control("unload", cli.output, api.unload_model(&model).await)?,
        Commands::Watch => {
            let cfg = PollConfig::from_env();
            info!(?cfg, "watch invoked");
            let handle = spawn_poller(api.clone(), cfg);
            let mut rx = handle.subscribe_epoch();
            let mut last_line = String::new();
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            warn!("poller ended; exiting watch loop");
                            break;
                        }
                        let d = handle.current();
                        match cli.output {
                            Output::Human => {
                                let line = render::dashboard_line(&d);
                                // Only print when something visible changed.
                                if line != last_line {
                                    println!("{}", line);
                                    last_line = line;
                                }
                            }
                            Output::Json => println!("{}", serde_json::to_string(&*d)?),
                        }
                    }
                    _ = signal::ctrl_c() => {
                        info!("Ctrl-C received; shutting down watch loop");
                        break;
                    }
                }
            }
            handle.shutdown();
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
