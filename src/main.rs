//! marc2db - load MARC (ISO 2709) files into a relational database

use anyhow::{Context, Result};
use clap::Parser;
use marc2db::config::{DEFAULT_BATCH_SIZE, DEFAULT_LOG_EVERY};
use marc2db::logging::{init_logging, LogConfig};
use marc2db::schema::{DEFAULT_FIELDS_TABLE, DEFAULT_RECORDS_TABLE, DEFAULT_SUBFIELDS_TABLE};
use marc2db::{run, ConnectionParams, Engine, LoadOptions, LoadStats, TableNames};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "marc2db")]
#[command(author, version, about = "Load MARC records into records, fields and subfields tables")]
struct Cli {
    /// Input files (ISO 2709, optionally gzip-compressed with a .gz suffix)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Database engine: sqlite or postgres
    #[arg(short = 't', long, env = "MARC2DB_ENGINE", default_value = "sqlite")]
    engine: String,

    /// Database name, or database file for SQLite
    #[arg(short = 'D', long, env = "MARC2DB_DATABASE")]
    database: String,

    /// Server host
    #[arg(short = 'H', long, env = "MARC2DB_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short = 'P', long, env = "MARC2DB_PORT")]
    port: Option<u16>,

    /// Login name
    #[arg(short = 'U', long, env = "MARC2DB_USER")]
    user: Option<String>,

    /// Login password
    #[arg(short = 'p', long, env = "MARC2DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Records table name
    #[arg(short = 'r', long, default_value = DEFAULT_RECORDS_TABLE)]
    records_table: String,

    /// Fields table name
    #[arg(short = 'f', long, default_value = DEFAULT_FIELDS_TABLE)]
    fields_table: String,

    /// Subfields table name
    #[arg(short = 's', long, default_value = DEFAULT_SUBFIELDS_TABLE)]
    subfields_table: String,

    /// Byte offset to start reading each input from
    #[arg(short = 'S', long, default_value_t = 0)]
    start_pos: u64,

    /// Stop after loading this many records
    #[arg(short = 'T', long)]
    total: Option<u64>,

    /// Records per committed batch
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: u64,

    /// Records between progress lines
    #[arg(short = 'B', long, default_value_t = DEFAULT_LOG_EVERY)]
    log_batch_size: u64,

    /// Drop existing tables instead of resuming
    #[arg(short = 'o', long)]
    overwrite: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn connection(&self) -> Result<ConnectionParams> {
        let engine: Engine = self.engine.parse()?;
        Ok(ConnectionParams {
            engine,
            database: self.database.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
        })
    }

    fn options(&self) -> Result<LoadOptions> {
        let tables = TableNames::new(&self.records_table, &self.fields_table, &self.subfields_table)?;
        Ok(LoadOptions {
            tables,
            overwrite: self.overwrite,
            batch_size: self.batch_size,
            log_every: self.log_batch_size,
            max_records: self.total,
            start_offset: self.start_pos,
        })
    }
}

fn write_summary(path: &Path, stats: &LoadStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write summary to {}", path.display()))
}

fn execute(cli: &Cli) -> Result<()> {
    let params = cli.connection()?;
    let options = cli.options()?;
    info!(?params, inputs = cli.inputs.len(), "starting load");

    let stats = run(&params, options, &cli.inputs).context("load failed")?;
    info!(
        records = stats.records_written,
        fields = stats.fields_written,
        subfields = stats.subfields_written,
        rolled_back = stats.batches_rolled_back,
        discarded = stats.records_discarded,
        "load complete"
    );

    if let Some(path) = &cli.summary {
        write_summary(path, &stats)?;
    }
    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::beside(&cli.inputs[0], cli.verbose);
    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        },
    };

    if let Err(e) = execute(&cli) {
        error!(error = %format!("{e:#}"), "run failed");
        drop(guard);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
