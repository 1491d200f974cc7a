//! sensors.AFRICA command line
//!
//! # Usage
//!
//! ```bash
//! # Create registry and measurement tables
//! sensorsafrica --config sensorsafrica.json migrate
//!
//! # Partner organizations and projects
//! sensorsafrica seed
//!
//! # Register the demonstration fleet and push three reading cycles,
//! # without a database
//! sensorsafrica --memory simulate --cycles 3
//!
//! # Push newline-delimited envelopes from a file
//! sensorsafrica --token "$TOKEN" ingest readings.ndjson
//!
//! # Inspect the registry
//! sensorsafrica node esp8266-12
//! sensorsafrica nodes --offset 0 --limit 50
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use deadpool::managed::Manager;
use futures::future::join_all;
use log::{error, info};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sensorsafrica_connectors::{
    build_pool, migrate, IngestionExecutor, InsertConnection, MemTimeseries, PgRegistryStore,
};
use sensorsafrica_core::{
    constants::DEFAULT_PAGE_LIMIT, MemRegistryStore, ReferenceStore, RegisterNode, RegistryStore,
};
use sensorsafrica_schemas::{SensorEnvelope, GLOBAL_REGISTRY};
use sensorsafrica_service::simulate::{fleet, seed_reference, PayloadGenerator};
use sensorsafrica_service::{
    IngestStatus, SensorService, ServiceConfig, StaticTokenAuthenticator,
};

/// Token accepted in `--memory` mode when none is configured
const LOCAL_TOKEN: &str = "local";

#[derive(Parser, Debug)]
#[command(name = "sensorsafrica")]
#[command(about = "sensors.AFRICA node registry and telemetry ingestion", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "SENSORSAFRICA_CONFIG")]
    config: Option<PathBuf>,

    /// Run against in-process stores instead of Postgres
    #[arg(long)]
    memory: bool,

    /// API token used for registration and ingestion
    #[arg(short, long, env = "SENSORSAFRICA_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create registry tables and one table per metric kind
    Migrate,
    /// Create partner organizations and projects
    Seed,
    /// Register a node from a JSON request file
    Register {
        /// Registration request
        file: PathBuf,
    },
    /// Register the demonstration fleet and push generated readings
    Simulate {
        /// Reading cycles per node
        #[arg(long, default_value_t = 1)]
        cycles: u32,
        /// Pause between cycles in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Generator seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Push newline-delimited sensor envelopes
    Ingest {
        /// NDJSON file, one envelope per line
        file: PathBuf,
    },
    /// Show one node with its location, tags and custodian
    Node {
        /// Device identity, e.g. esp8266-12
        id: String,
    },
    /// List nodes
    Nodes {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u32,
    },
    /// List locations
    Locations {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ServiceConfig::load(args.config.as_deref())?;

    if args.memory {
        info!("Running with in-memory stores");
        if args.token.is_none() && config.auth.tokens.is_empty() {
            config
                .auth
                .tokens
                .insert(LOCAL_TOKEN.to_string(), "cli".to_string());
        }

        let store = Arc::new(MemRegistryStore::new());
        let timeseries = MemTimeseries::new().referencing(store.clone());
        timeseries.migrate(&GLOBAL_REGISTRY);

        if let Commands::Migrate = args.command {
            println!("in-memory tables created for {} metric kinds", GLOBAL_REGISTRY.len());
            return Ok(());
        }

        let pool = build_pool(timeseries, config.database.pool_max_size)?;
        let acquire_timeout = config.database.acquire_timeout();
        let executor = IngestionExecutor::new(pool, acquire_timeout, config.retry);
        run(store, executor, &config, args.token, args.command).await
    } else {
        let db = &config.database;
        info!(
            "Connecting to postgres://{}@{}:{}/{} (pool size {})",
            db.user, db.host, db.port, db.dbname, db.pool_max_size
        );
        let pool = db.create_pool()?;

        if let Commands::Migrate = args.command {
            let client = pool.get().await.context("failed to connect for migration")?;
            let applied = migrate::run(&client, &GLOBAL_REGISTRY, db.timescale).await?;
            println!("applied {applied} migration statements");
            return Ok(());
        }

        let store = Arc::new(PgRegistryStore::new(pool.clone()));
        let executor = IngestionExecutor::new(pool, db.acquire_timeout(), config.retry);
        run(store, executor, &config, args.token, args.command).await
    }
}

async fn run<S, M>(
    store: Arc<S>,
    executor: IngestionExecutor<M>,
    config: &ServiceConfig,
    token: Option<String>,
    command: Commands,
) -> Result<()>
where
    S: RegistryStore + ReferenceStore,
    M: Manager,
    M::Type: InsertConnection,
    M::Error: Display,
{
    let auth = Arc::new(StaticTokenAuthenticator::new(&config.auth));
    let service = SensorService::new(store, executor, auth);
    let token = token.unwrap_or_else(|| LOCAL_TOKEN.to_string());

    let result = handle_command(&service, &token, command).await;
    service.close();
    result
}

async fn handle_command<S, M>(
    service: &SensorService<S, M>,
    token: &str,
    command: Commands,
) -> Result<()>
where
    S: RegistryStore + ReferenceStore,
    M: Manager,
    M::Type: InsertConnection,
    M::Error: Display,
{
    match command {
        Commands::Migrate => bail!("migrate is handled before the service starts"),
        Commands::Seed => {
            let rows = seed_reference(service.store().as_ref()).await?;
            println!("{rows} reference rows present");
        }
        Commands::Register { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let request: RegisterNode = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", file.display()))?;

            let caller = service.authenticate(token).await?;
            print_json(&service.register_node(&caller, &request).await?)?;
        }
        Commands::Simulate {
            cycles,
            interval_ms,
            seed,
        } => {
            let caller = service.authenticate(token).await?;
            seed_reference(service.store().as_ref()).await?;

            let fleet = fleet();
            for node in &fleet {
                service.register_node(&caller, node).await?;
            }
            info!("{} nodes registered", fleet.len());

            let mut generator = PayloadGenerator::new(seed);
            for cycle in 0..cycles {
                if cycle > 0 && interval_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }

                let now = Utc::now();
                let envelopes: Vec<SensorEnvelope> =
                    fleet.iter().map(|node| generator.envelope(node, now)).collect();
                let reports =
                    join_all(envelopes.iter().map(|e| service.push_sensor_data(&caller, e))).await;

                for report in reports {
                    print_json(&report?)?;
                }
            }
        }
        Commands::Ingest { file } => {
            let caller = service.authenticate(token).await?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let (mut accepted, mut rejected) = (0usize, 0usize);
            let lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
            for (line_no, line) in lines {
                let envelope: SensorEnvelope = match serde_json::from_str(line) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        error!("line {}: malformed envelope: {}", line_no + 1, e);
                        rejected += 1;
                        continue;
                    }
                };

                match service.push_sensor_data(&caller, &envelope).await {
                    Ok(report) if report.status() == IngestStatus::Failed => {
                        rejected += 1;
                        print_json(&report)?;
                    }
                    Ok(report) => {
                        accepted += 1;
                        print_json(&report)?;
                    }
                    Err(e) => {
                        error!("line {}: {}", line_no + 1, e);
                        rejected += 1;
                    }
                }
            }

            info!("{} envelope(s) accepted, {} rejected", accepted, rejected);
            info!("{:?}", service.stats());
        }
        Commands::Node { id } => print_json(&service.fetch_node(&id).await?)?,
        Commands::Nodes { offset, limit } => {
            print_json(&service.list_nodes(offset, limit).await?)?
        }
        Commands::Locations { offset, limit } => {
            print_json(&service.list_locations(offset, limit).await?)?
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
