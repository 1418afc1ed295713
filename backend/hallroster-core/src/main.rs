// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use axum_server::tls_rustls::RustlsConfig;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod audit;
mod config;
mod derivation;
mod directory;
mod export;
mod firestore_store;
mod firestore_value;
mod memory_store;
mod model;
mod payroll;
mod reconcile;
mod roster;
mod session;
mod store;

use crate::config::{AppConfig, StoreBackend};
use crate::export::{ExportKind, ExportParams};
use crate::firestore_store::FirestoreStore;
use crate::memory_store::MemoryStore;
use crate::roster::RosterSnapshot;
use crate::store::SharedStore;

#[derive(Parser, Debug)]
#[command(name = "hallroster", version, about = "Staff and hall attendance bookkeeping")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (the default).
    Serve,
    /// Check hall aggregates and counters against the employee records.
    Audit,
    /// Write a CSV export (range, board, payroll or halls).
    Export {
        kind: String,
        #[arg(long)]
        employee: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        hall: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = open_store(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, store).await,
        Command::Audit => run_audit(store).await,
        Command::Export {
            kind,
            employee,
            start,
            end,
            date,
            hall,
            name,
            output,
        } => {
            let kind: ExportKind = kind.parse()?;
            let params = ExportParams {
                employee,
                start,
                end,
                date,
                hall,
                name,
            };
            run_export(store, kind, &params, output).await
        }
    }
}

fn open_store(config: &AppConfig) -> anyhow::Result<SharedStore> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; nothing is persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Firestore => {
            let firestore = config
                .firestore()
                .context("STORE_BACKEND=firestore requires FIRESTORE_PROJECT_ID")?;
            info!(
                "Using Firestore project {} (database {})",
                firestore.project_id, firestore.database
            );
            Ok(Arc::new(FirestoreStore::new(firestore)?))
        }
    }
}

async fn serve(config: &AppConfig, store: SharedStore) -> anyhow::Result<()> {
    let app = api::router(api::AppState::new(store, config.session_ttl()));
    let addr = config.bind_address();

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load TLS cert/key from {} and {}",
                        cert_path.display(),
                        key_path.display()
                    )
                })?;
            let socket: SocketAddr = addr
                .parse()
                .with_context(|| format!("Invalid bind address {}", addr))?;
            info!("Listening on https://{}", socket);
            axum_server::bind_rustls(socket, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

async fn run_audit(store: SharedStore) -> anyhow::Result<()> {
    let findings = audit::audit_store(store.as_ref())
        .await
        .context("Failed to read the store for the audit")?;
    for finding in &findings {
        println!("{}", finding);
    }
    if !findings.is_empty() {
        bail!("{} inconsistency(ies) found", findings.len());
    }
    println!("No inconsistencies found.");
    Ok(())
}

async fn run_export(
    store: SharedStore,
    kind: ExportKind,
    params: &ExportParams,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let roster = RosterSnapshot::load(store.as_ref())
        .await
        .context("Failed to load the roster")?;
    let rendered = export::render(kind, params, &roster, Local::now().date_naive())?;
    match output {
        Some(path) => {
            std::fs::write(&path, &rendered.body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} export to {}", kind, path.display());
        }
        None => print!("{}", rendered.body),
    }
    Ok(())
}
