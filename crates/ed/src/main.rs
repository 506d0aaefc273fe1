use clap::{Parser, Subcommand};
use ed_core::types::RequestId;
use ed_core::{DispatchConfig, RequestContext};
use ed_events::types::EventSource;
use ed_serve::notify::LogSink;
use ed_serve::{AppState, with_dispatcher};
use owo_colors::OwoColorize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ed", about = "Emergency dispatch engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API with the deadline and sweep loops.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Escalate every dispatched request whose deadline has passed, once.
    Sweep,
    /// Print a request with its attempts and dispatch log.
    Show { id: String },
    /// Print the OpenAPI document.
    Openapi,
}

fn db_path() -> String {
    let path = std::env::var("ED_DB_PATH").unwrap_or_else(|_| ".ed/dispatch.db".to_string());
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    path
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `ED_LOG_FORMAT`; anything other than `json` logs as text.
    fn from_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ed=info,ed_core=info,ed_serve=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    let format = std::env::var("ED_LOG_FORMAT").ok();
    match LogFormat::from_value(format.as_deref()) {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { port } => serve(port).await,
        Command::Sweep => sweep().await,
        Command::Show { id } => show(&id).await,
        Command::Openapi => {
            println!("{}", ed_serve::openapi::generate_spec());
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{} {message}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn serve(port: Option<u16>) -> Result<(), String> {
    let port = port
        .or_else(|| {
            std::env::var("ED_PORT")
                .ok()
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(4830);
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let config = DispatchConfig::from_env();
    tracing::info!(?config, "dispatch configuration");

    let (state, fired) = AppState::new(db_path(), config).map_err(|err| err.to_string())?;
    ed_serve::serve(state, fired, Arc::new(LogSink), addr)
        .await
        .map_err(|err| format!("serve error: {err}"))
}

async fn sweep() -> Result<(), String> {
    let (state, _fired) =
        AppState::new(db_path(), DispatchConfig::from_env()).map_err(|err| err.to_string())?;
    let ctx = RequestContext::new(EventSource::Escalator, None);
    let escalated = with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().sweep_expired(&ctx)
    })
    .await
    .map_err(|err| err.to_string())?;

    if escalated.is_empty() {
        println!("{}", "no overdue requests".dimmed());
    }
    for id in escalated {
        println!("{} {id}", "escalated".yellow());
    }
    Ok(())
}

async fn show(id: &str) -> Result<(), String> {
    let id: RequestId = id.parse().map_err(|err: ed_core::types::IdError| err.to_string())?;
    let (state, _fired) =
        AppState::new(db_path(), DispatchConfig::from_env()).map_err(|err| err.to_string())?;
    let detail = with_dispatcher(&state, move |dispatcher| dispatcher.emergencies().detail(&id))
        .await
        .map_err(|err| err.to_string())?;

    let request = &detail.request;
    println!("{} {}", request.id.bold(), request.status.to_string().cyan());
    println!("  urgency   {}", request.urgency);
    println!("  address   {}", request.address);
    if let Some(worker) = &request.assigned_worker {
        println!("  assigned  {}", worker.green());
    }
    if let Some(reason) = &request.escalation_reason {
        println!("  escalated {reason:?}");
    }
    for attempt in &detail.attempts {
        println!(
            "  offer     {} {:.2} km {:?}",
            attempt.worker_id, attempt.distance_km, attempt.response
        );
    }
    for entry in &detail.dispatch_log {
        println!(
            "  log #{:<4} {} {:?} {}",
            entry.seq,
            entry.worker_id,
            entry.event,
            entry.at.to_rfc3339()
        );
    }
    Ok(())
}
