use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keygate_server::{
    handlers::UNKNOWN_ORIGIN,
    license::{self, LicenseStore},
    validator::{ValidationOutcome, Validator},
    ServerConfig,
};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "keygate", about = "keygate — license validation for web components", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $KEYGATE_PORT or 3001)
        #[arg(long, env = "KEYGATE_PORT", default_value = "3001")]
        port: u16,
        /// Host to bind (default: $KEYGATE_HOST or 0.0.0.0)
        #[arg(long, env = "KEYGATE_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Validate a key against the locally configured license table
    Check {
        /// License key
        key: String,
        /// Origin to validate against
        #[arg(long, default_value = UNKNOWN_ORIGIN)]
        origin: String,
    },
    /// Print the locally configured licenses with origins redacted
    List,
    /// Validate a key against a running server
    Validate {
        /// License key
        key: String,
        /// Sent as the `Origin` header
        #[arg(long)]
        origin: Option<String>,
        /// Server URL (default: $KEYGATE_SERVER or http://localhost:3001)
        #[arg(long, env = "KEYGATE_SERVER", default_value = "http://localhost:3001")]
        server: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads `env = ...` defaults.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KEYGATE_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Check { key, origin } => cmd_check(&key, &origin),
        Commands::List => cmd_list(),
        Commands::Validate {
            key,
            origin,
            server,
        } => cmd_validate(&server, &key, origin.as_deref()).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = ServerConfig {
        host,
        port,
        ..Default::default()
    };
    keygate_server::run(cfg).await
}

fn local_store() -> LicenseStore {
    LicenseStore::new(ServerConfig::default().licenses)
}

fn cmd_check(key: &str, origin: &str) -> Result<()> {
    let validator = Validator::new(local_store());
    match validator.validate(Some(key), origin) {
        ValidationOutcome::Valid(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        ValidationOutcome::Rejected(reason) => anyhow::bail!("{reason}"),
    }
}

fn cmd_list() -> Result<()> {
    let listing = license::listing(&local_store().snapshot());
    if listing.is_empty() {
        println!("(no licenses configured)");
        return Ok(());
    }
    for (key, summary) in &listing {
        println!(
            "  {} — {} — expires {} — origin {}",
            key, summary.component, summary.expires_at, summary.origin
        );
    }
    Ok(())
}

async fn cmd_validate(server: &str, key: &str, origin: Option<&str>) -> Result<()> {
    let client = Client::new();
    let mut req = client
        .get(format!("{}/validate-license", server.trim_end_matches('/')))
        .query(&[("key", key)]);
    if let Some(origin) = origin {
        req = req.header("Origin", origin);
    }

    let resp = req.send().await.context("HTTP request failed")?;
    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        println!("{}", serde_json::to_string_pretty(&json)?);
        Ok(())
    } else {
        let error = json["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {error}");
    }
}
