//! pgsolo - run statements over a single PostgreSQL connection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgsolo_core::logging::{init_logging, log_dir, LogConfig};
use pgsolo_core::services::obfuscation::{encode_secret_legacy, encode_secret_with_iv};
use pgsolo_core::{
    ClientEvent, ConnectionConfig, ConnectionSource, EventPayload, QueryResult, SoloClient,
};

#[derive(Parser)]
#[command(name = "pgsolo")]
#[command(about = "Run statements over a single PostgreSQL connection")]
#[command(version)]
struct Cli {
    /// Log filter, overriding PGSOLO_LOG and RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obfuscate a secret for use in a config file
    Obfuscate {
        /// Use the deterministic legacy encoding instead of a random IV
        #[arg(long)]
        legacy: bool,

        /// Secret to encode
        secret: String,
    },

    /// Connect, run statements in order, print their rows, and disconnect
    Run {
        /// Connection URI or path to a JSON config file
        #[arg(short, long, env = "PGSOLO_URL")]
        target: String,

        /// Also log a summary of each statement's results
        #[arg(long)]
        results: bool,

        /// Statements to execute
        #[arg(required = true)]
        sql: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new(log_dir());
    if let Some(filter) = &cli.log {
        log_config = log_config.with_filter(filter.clone());
    }
    let _logging_guard = init_logging(log_config);

    match cli.command {
        Commands::Obfuscate { legacy, secret } => {
            let encoded =
                if legacy { encode_secret_legacy(&secret)? } else { encode_secret_with_iv(&secret)? };
            println!("{encoded}");
            Ok(())
        }
        Commands::Run { target, results, sql } => run(&target, results, &sql).await,
    }
}

/// Interpret a target as a connection URI, or else as a config file path.
fn resolve_target(target: &str) -> Result<ConnectionSource> {
    if target.starts_with("postgres://") || target.starts_with("postgresql://") {
        return Ok(ConnectionSource::from(target));
    }
    let config = ConnectionConfig::load(target)
        .with_context(|| format!("failed to load connection config from {target}"))?;
    Ok(config.into())
}

async fn run(target: &str, log_results: bool, statements: &[String]) -> Result<()> {
    let source = resolve_target(target)?;

    let client = SoloClient::new();
    client.set_event_enabled(ClientEvent::Results, log_results);
    log_events(&client);

    client.connect(source).await.context("failed to connect")?;

    let outcome = execute_all(&client, statements).await;
    // Close the connection even when a statement failed
    let closed = client.disconnect().await;

    outcome?;
    closed.context("failed to disconnect")?;
    Ok(())
}

async fn execute_all(client: &SoloClient, statements: &[String]) -> Result<()> {
    for sql in statements {
        let result =
            client.execute(sql).await.with_context(|| format!("statement failed: {sql}"))?;
        for line in render_result(&result)? {
            println!("{line}");
        }
    }
    Ok(())
}

/// One JSON object per row, or the command tag and row count when there are no columns.
fn render_result(result: &QueryResult) -> Result<Vec<String>> {
    if result.fields.is_empty() {
        return Ok(vec![format!("{} {}", result.command, result.row_count)]);
    }
    result
        .rows
        .iter()
        .map(|row| serde_json::to_string(row).context("failed to render row"))
        .collect()
}

/// Forward every client notification to tracing.
fn log_events(client: &SoloClient) {
    for event in ClientEvent::ALL {
        client.subscribe(event, move |payload: &EventPayload<'_>| match *payload {
            EventPayload::Results(result) => tracing::info!(
                command = %result.command,
                rows = result.row_count,
                execution_time_ms = result.execution_time_ms,
                "results"
            ),
            EventPayload::Query(sql) => tracing::debug!(sql, "query"),
            EventPayload::Message(message) => match event {
                ClientEvent::Error => tracing::error!(detail = message, "error"),
                ClientEvent::Warning => tracing::warn!(detail = message, "warning"),
                _ => tracing::info!(detail = message, "{event}"),
            },
        });
    }
}
