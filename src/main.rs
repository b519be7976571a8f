//! tickloop host binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────── Runtime (one thread) ─────────────────────────┐
//!                   │                                                                        │
//!   Client request  │  ┌──────────┐    ┌─────────────┐    ┌──────────────┐                   │
//!   ────────────────┼─▶│ listener │───▶│ connection  │───▶│     app      │                   │
//!                   │  │ (accept) │    │ (recv/parse)│    │ on_request   │                   │
//!                   │  └──────────┘    └─────────────┘    └──────┬───────┘                   │
//!   Client response │                        ▲                   │ send / send_file / close  │
//!   ◀───────────────┼────────────────────────┘                   │ start transfer            │
//!                   │                                            ▼                           │
//!                   │                                     ┌──────────────┐   HTTP            │
//!                   │                                     │   transfer   │◀─────────────────▶┼── Remote
//!                   │                                     │ manager/engine│                   │
//!                   │                                     └──────────────┘                   │
//!                   └────────────────────────────────────────────────────────────────────────┘
//!        host loop: tick → sleep(interval) → tick ...   Restart: shutdown, wait, rebuild
//! ```
//!
//! The bundled application serves files from a directory, echoes query
//! strings as JSON on `/echo`, and relays a remote resource on
//! `/fetch?url=...`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::thread;

use clap::Parser;
use serde_json::json;

use tickloop::app::{AppError, AppResult, Application, Context};
use tickloop::config::{self, validation::validate_config, ConfigError, RuntimeConfig};
use tickloop::http::Request;
use tickloop::lifecycle::{Control, Runtime};
use tickloop::net::ConnectionId;
use tickloop::observability::{logging, metrics};
use tickloop::transfer::{TransferId, TransferRequest};

#[derive(Parser)]
#[command(name = "tickloop")]
#[command(about = "Tick-driven file server and HTTP relay", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory served for plain GET requests.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

/// Demo application: static files, query echo and a fetch relay.
struct Site {
    root: PathBuf,
    relays: HashMap<TransferId, ConnectionId>,
}

impl Site {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            relays: HashMap::new(),
        }
    }

    fn echo(&self, ctx: &mut Context<'_>, connection: ConnectionId, request: &Request) -> AppResult {
        let body = json!({
            "method": request.method.as_str(),
            "path": request.path,
            "query": request.query,
            "body_bytes": request.body.as_ref().map(Vec::len),
        });
        ctx.send(connection, body.to_string().as_bytes(), JSON)?;
        Ok(())
    }

    fn relay(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, request: &Request) -> AppResult {
        let Some(url) = request.query_value("url") else {
            ctx.close(connection)?;
            return Ok(());
        };

        match ctx.start_transfer(TransferRequest::get(url)) {
            Ok(transfer) => {
                self.relays.insert(transfer, connection);
            }
            Err(e) => {
                let body = json!({ "error": e.to_string() });
                ctx.send(connection, body.to_string().as_bytes(), JSON)?;
            }
        }
        Ok(())
    }

    fn file(&self, ctx: &mut Context<'_>, connection: ConnectionId, request: &Request) -> AppResult {
        let relative = if request.path.is_empty() {
            "index.html"
        } else {
            request.path.as_str()
        };

        let Some(path) = resolve(&self.root, relative) else {
            ctx.close(connection)?;
            return Ok(());
        };

        if let Err(e) = ctx.send_file(connection, &path, content_type(&path)) {
            tracing::debug!(connection_id = %connection, path = %path.display(), error = %e, "File not served");
        }
        Ok(())
    }
}

const JSON: &str = "Content-Type: application/json\r\n";

impl Application for Site {
    fn on_request(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, request: Request) -> AppResult {
        match request.path.as_str() {
            "echo" => self.echo(ctx, connection, &request),
            "fetch" => self.relay(ctx, connection, &request),
            _ => self.file(ctx, connection, &request),
        }
    }

    fn on_transfer(
        &mut self,
        ctx: &mut Context<'_>,
        transfer: TransferId,
        ok: bool,
        body: Option<Vec<u8>>,
    ) -> AppResult {
        let connection = self
            .relays
            .remove(&transfer)
            .ok_or_else(|| AppError::msg(format!("no relay waiting for {transfer}")))?;

        match (ok, body) {
            (true, Some(body)) => ctx.send(connection, &body, "")?,
            _ => {
                let body = json!({ "error": "upstream request failed" });
                ctx.send(connection, body.to_string().as_bytes(), JSON)?;
            }
        }
        Ok(())
    }

    fn on_stop(&mut self, ctx: &mut Context<'_>) -> AppResult {
        for (transfer, connection) in self.relays.drain() {
            ctx.cancel_transfer(transfer);
            let _ = ctx.close(connection);
        }
        Ok(())
    }
}

/// Join `relative` under `root`, refusing anything that could escape it.
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        Some(root.join(relative))
    } else {
        None
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "Content-Type: text/html\r\n",
        Some("css") => "Content-Type: text/css\r\n",
        Some("js") => "Content-Type: application/javascript\r\n",
        Some("json") => JSON,
        Some("png") => "Content-Type: image/png\r\n",
        Some("jpg") | Some("jpeg") => "Content-Type: image/jpeg\r\n",
        Some("txt") => "Content-Type: text/plain\r\n",
        _ => "Content-Type: application/octet-stream\r\n",
    }
}

fn load(cli: &Cli) -> Result<RuntimeConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    let mut shipper = logging::init(&config.observability);

    tracing::info!("tickloop v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_transfers = config.transfers.max_active,
        root = %cli.root.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    loop {
        let mut runtime = Runtime::new(&config, Site::new(cli.root.clone()))?;
        if let Some(shipper) = shipper.take() {
            runtime = runtime.with_log_shipper(shipper);
        }

        let control = loop {
            match runtime.tick() {
                Control::Continue => thread::sleep(runtime.tick_interval()),
                other => break other,
            }
        };

        shipper = runtime.shutdown();

        match control {
            Control::Restart(delay) => {
                tracing::warn!(delay_ms = delay.as_millis() as u64, "Restarting runtime");
                thread::sleep(delay);
            }
            _ => break,
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
