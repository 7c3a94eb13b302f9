//! # codecheck-db
//!
//! Operator tool for the CodeCheck database pool. It reads the same
//! configuration as the API server (`DATABASE_URL` or the `DB_*`
//! variables, optionally from a `.env` file), owns one pool for the
//! duration of a command and shuts it down before exiting.
//!
//! ## Commands
//!
//! - `codecheck-db health` - probe the database, exit 1 when unhealthy
//! - `codecheck-db stats` - warm the pool and print its statistics
//! - `codecheck-db query <SQL> [-p VALUE]...` - run one statement
//! - `codecheck-db transaction <SQL>...` - run statements all-or-nothing

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecheck_core::{AccessMode, DatabaseConfig, ENV_DATABASE_URL, Value};
use codecheck_driver_postgres::PostgresConnectionFactory;
use codecheck_pool::{ConnectionPool, Operation, OperationOutput, PoolConfig};

mod logging;
mod output;

use logging::LogFormat;
use output::OutputFormat;

/// Inspect and exercise the CodeCheck database pool
#[derive(Debug, Parser)]
#[command(name = "codecheck-db")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Connection URL; replaces the discrete DB_* connection variables
    #[arg(long, global = true, env = ENV_DATABASE_URL, hide_env_values = true)]
    database_url: Option<String>,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn,codecheck_pool=info")]
    log_filter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe the database through the pool
    Health,

    /// Initialize the pool and print its statistics
    Stats,

    /// Run one statement and print the rows it returns
    Query {
        sql: String,

        /// Positional parameter ($1, $2, ...); null/true/false/numbers are typed
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,

        /// Run in a read-write transaction and commit
        #[arg(long)]
        write: bool,
    },

    /// Run statements in order inside one transaction
    Transaction {
        #[arg(required = true)]
        statements: Vec<String>,
    },
}

/// Type a command-line parameter the way a user most likely meant it
fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Value::Float64(f);
    }
    Value::String(raw.to_string())
}

fn load_config(database_url: Option<&str>) -> Result<DatabaseConfig> {
    let config = match database_url {
        Some(url) => DatabaseConfig::from_lookup(|key| {
            if key == ENV_DATABASE_URL {
                Some(url.to_string())
            } else {
                std::env::var(key).ok()
            }
        }),
        None => DatabaseConfig::from_env(),
    };
    config.context("invalid database configuration")
}

async fn run(pool: &ConnectionPool, command: Command, format: OutputFormat) -> Result<ExitCode> {
    match command {
        Command::Health => {
            let report = pool.health_check().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Table => println!("{}", output::health_table(&report)),
            }
            if report.status.is_healthy() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Stats => {
            pool.initialize()
                .await
                .context("failed to initialize connection pool")?;
            let stats = pool.stats();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Table => println!("{}", output::stats_table(&stats)),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Query { sql, params, write } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let mode = AccessMode::from_read_only(!write);
            let rows = pool
                .execute_query(&sql, &params, mode)
                .await
                .context("query failed")?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&output::rows_json(&rows))?)
                }
                OutputFormat::Table => {
                    println!("{}", output::rows_table(&rows));
                    println!("({} rows)", rows.len());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Transaction { statements } => {
            let operations = statements
                .into_iter()
                .map(|sql| Operation::new(sql, Vec::new()))
                .collect();
            let outputs = pool
                .execute_transaction(operations)
                .await
                .context("transaction failed")?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&output::outputs_json(&outputs))?)
                }
                OutputFormat::Table => {
                    for (index, result) in outputs.iter().enumerate() {
                        match result {
                            OperationOutput::Rows(rows) => {
                                println!("[{}] {} rows", index, rows.len());
                                println!("{}", output::rows_table(rows));
                            }
                            OperationOutput::Affected(count) => {
                                println!("[{}] {} rows affected", index, count);
                            }
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logging::init(cli.log_format, &cli.log_filter)?;

    let config = load_config(cli.database_url.as_deref())?;
    tracing::info!(target_db = %config.target(), ssl_mode = %config.ssl_mode(), "using database");

    let pool_config =
        PoolConfig::from_database_config(&config).context("invalid database configuration")?;
    let pool = ConnectionPool::new(pool_config, PostgresConnectionFactory::new(config));

    let outcome = run(&pool, cli.command, cli.output).await;
    pool.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests;
