use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_db::{InMemoryStore, SharedStore};
use libris_kernel::settings::Settings;

/// Operate the libris HTTP gateway.
#[derive(Debug, Parser)]
#[command(name = "libris", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to MongoDB and serve HTTP until interrupted
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the collections and indexes the modules expect
    Provision,
    /// Print every documented route
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().context("failed to load libris settings")?;
    libris_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            libris_app::bootstrap::serve(settings).await
        }
        Command::Provision => provision(&settings).await,
        Command::Routes => {
            print_routes(&settings);
            Ok(())
        }
    }
}

async fn provision(settings: &Settings) -> anyhow::Result<()> {
    let store = libris_db::connect(
        &settings.database.uri,
        &settings.database.name,
        settings.database.connect_options(),
    )
    .await
    .context("failed to create the database client")?;

    let registry = libris_app::bootstrap::build_registry(&store, settings);
    let report = libris_app::bootstrap::provision(&store, &registry).await?;
    tracing::info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "provisioning finished"
    );

    for step in &report.applied {
        println!("applied  {step}");
    }
    for step in &report.skipped {
        println!("skipped  {step} (already exists)");
    }
    Ok(())
}

fn print_routes(settings: &Settings) {
    // Routes do not touch the store; an in-memory one avoids a connection.
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let registry = libris_app::bootstrap::build_registry(&store, settings);
    let document = libris_http::router::openapi_document(&registry);

    for (method, path, summary) in libris_http::router::route_table(&document) {
        println!("{method:<7} {path:<26} {summary}");
    }
}
