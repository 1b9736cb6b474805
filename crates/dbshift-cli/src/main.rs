//! dbshift CLI - install and migrate the system database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use dbshift::{
    ConfigStore, ConnectionRegistry, DbError, EngineConfig, EngineKind, EntryResponse,
    InstallOrchestrator, MigrationOrchestrator,
};
use serde_json::json;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "dbshift")]
#[command(about = "Install and migrate the system database across SQLite, MySQL and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to the database configuration file
    #[arg(short, long, default_value = "config/database.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the system database and write the first configuration
    Install(TargetArgs),

    /// Move the system database to a server engine
    Migrate(TargetArgs),

    /// Show engine, tables and size of the active database
    Status,

    /// Run the engine's maintenance operation on the active database
    Optimize,

    /// Test the connection to the active database
    HealthCheck,
}

/// Connection settings for an install or migration target.
#[derive(Args)]
struct TargetArgs {
    /// Engine type: sqlite, mysql or postgres
    #[arg(long = "type", value_name = "TYPE")]
    db_type: String,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port [default: engine default]
    #[arg(long)]
    port: Option<u16>,

    /// Database name, or file path for sqlite
    #[arg(long)]
    database: String,

    /// Login name
    #[arg(long)]
    username: Option<String>,

    /// Login password
    #[arg(long, env = "DBSHIFT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Connection character set (MySQL) or client encoding (PostgreSQL)
    #[arg(long)]
    charset: Option<String>,

    /// Schema searched for tables (PostgreSQL)
    #[arg(long)]
    schema: Option<String>,

    /// TLS mode: disable, require, verify-ca, verify-full
    #[arg(long)]
    ssl_mode: Option<String>,
}

impl TargetArgs {
    fn into_config(self) -> Result<EngineConfig, DbError> {
        let config = EngineConfig {
            r#type: self.db_type.parse::<EngineKind>()?,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            charset: self.charset,
            schema: self.schema,
            ssl_mode: self.ssl_mode,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, DbError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let store = ConfigStore::new(&cli.config);
    match cli.command {
        Commands::Install(args) => {
            let config = args.into_config()?;
            let registry = Arc::new(ConnectionRegistry::new());
            let report = match InstallOrchestrator::new(registry, store).run(config).await {
                Ok(report) => report,
                Err(e) => return report_failure(cli.output_json, EntryResponse::from(&e), &e),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Installed on {}", report.engine);
                if report.database_created {
                    println!("  Database created");
                }
                println!("  Tables created: {}", report.tables_created.len());
                if !report.tables_existing.is_empty() {
                    println!("  Already present: {}", report.tables_existing.join(", "));
                }
            }
        }

        Commands::Migrate(args) => {
            let target = args.into_config()?;
            let current = store.require()?;
            info!("Loaded configuration from {:?}", cli.config);
            let registry = Arc::new(ConnectionRegistry::with_system(&current).await?);

            let mut orchestrator = MigrationOrchestrator::new(registry, store);
            let report = match orchestrator.run(target).await {
                Ok(report) => report,
                Err(e) => {
                    let response = EntryResponse::failure(orchestrator.failure_message(&e));
                    return report_failure(cli.output_json, response, &e);
                }
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nMigration Complete!");
                println!("  From: {}", report.source);
                println!("  To: {}", report.target);
                if report.database_created {
                    println!("  Database created");
                }
                println!("  Duration: {:.2}s", report.duration_seconds);
                for table in &report.tables {
                    println!("  {:<20} {:>10} rows", table.name, table.rows);
                }
                println!("  Total: {} rows", report.rows_copied);
            }
        }

        Commands::Status => {
            let config = store.require()?;
            let registry = ConnectionRegistry::with_system(&config).await?;
            let adapter = registry.system().await?;
            let tables = adapter.tables().await?;
            let size = adapter.database_size().await?;

            if cli.output_json {
                let status = json!({
                    "engine": config.kind(),
                    "target": config.describe(),
                    "tables": tables,
                    "size_bytes": size,
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Engine: {}", config.kind());
                println!("Database: {}", config.describe());
                println!("Size: {} bytes", size);
                println!("Tables ({}):", tables.len());
                for table in &tables {
                    println!("  {}", table);
                }
            }
        }

        Commands::Optimize => {
            let config = store.require()?;
            let registry = ConnectionRegistry::with_system(&config).await?;
            let adapter = registry.system().await?;
            let optimized = adapter.optimize().await;

            if cli.output_json {
                println!("{}", json!({ "engine": config.kind(), "optimized": optimized }));
            } else {
                println!(
                    "Optimize {}: {}",
                    config.kind(),
                    if optimized { "OK" } else { "FAILED" }
                );
            }

            if !optimized {
                return Err(DbError::query("optimize", "maintenance operation failed"));
            }
        }

        Commands::HealthCheck => {
            let config = store.require()?;
            let registry = ConnectionRegistry::with_system(&config).await?;
            let adapter = registry.system().await?;

            let started = Instant::now();
            let result = adapter.ping().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            if cli.output_json {
                let health = json!({
                    "engine": config.kind(),
                    "healthy": result.is_ok(),
                    "latency_ms": latency_ms,
                    "error": result.as_ref().err().map(ToString::to_string),
                });
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {} ({}): {} ({}ms)",
                    config.kind(),
                    config.describe(),
                    if result.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Err(ref err) = result {
                    println!("    Error: {}", err);
                }
            }

            result?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Report a failed install or migration once, on stdout as JSON or on stderr.
fn report_failure(
    output_json: bool,
    response: EntryResponse,
    err: &DbError,
) -> Result<ExitCode, DbError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Some(message) = &response.message {
        eprintln!("{}", message);
    }
    Ok(ExitCode::from(err.exit_code()))
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
