mod commands;
mod config;
mod llm;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mongotune_core::{RollbackOrder, StorageType};
use mongotune_engine::parse_database_list;

use crate::config::Overrides;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Order in which applied operations are undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RollbackOrderArg {
    Reverse,
    Forward,
}

impl From<RollbackOrderArg> for RollbackOrder {
    fn from(arg: RollbackOrderArg) -> Self {
        match arg {
            RollbackOrderArg::Reverse => RollbackOrder::Reverse,
            RollbackOrderArg::Forward => RollbackOrder::Forward,
        }
    }
}

/// Backend holding the optimization records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageTypeArg {
    File,
    S3,
}

impl From<StorageTypeArg> for StorageType {
    fn from(arg: StorageTypeArg) -> Self {
        match arg {
            StorageTypeArg::File => StorageType::File,
            StorageTypeArg::S3 => StorageType::S3,
        }
    }
}

/// MongoDB index optimization driven by an LLM recommendation service.
#[derive(Parser)]
#[command(
    name = "mongotune",
    version,
    about = "Suggest, apply, validate and roll back MongoDB index optimizations"
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./mongotune.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Record-store location shared by every subcommand.
#[derive(Args, Debug, Default)]
struct StoreArgs {
    /// Record store backend
    #[arg(long, value_enum)]
    storage_type: Option<StorageTypeArg>,

    /// Directory holding optimization records (file storage)
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Bucket holding optimization records (s3 storage)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Region of the bucket
    #[arg(long)]
    s3_region: Option<String>,

    /// Key prefix for record objects
    #[arg(long)]
    s3_prefix: Option<String>,

    /// Retention window in days for records in the bucket
    #[arg(long)]
    s3_retention_days: Option<u32>,

    /// AWS shared-credentials file
    #[arg(long)]
    s3_credentials: Option<PathBuf>,
}

impl StoreArgs {
    fn overrides(&self, log_level: Option<String>) -> Overrides {
        Overrides {
            storage_type: self.storage_type.map(StorageType::from),
            storage_path: self.storage_path.clone(),
            s3_bucket: self.s3_bucket.clone(),
            s3_region: self.s3_region.clone(),
            s3_prefix: self.s3_prefix.clone(),
            s3_retention_days: self.s3_retention_days,
            s3_credentials: self.s3_credentials.clone(),
            log_level,
            ..Overrides::default()
        }
    }
}

/// Flags controlling one optimization cycle.
#[derive(Args, Debug, Default)]
struct CycleArgs {
    /// MongoDB connection string
    #[arg(long)]
    mongo_uri: Option<String>,

    /// Collect before-reports only; apply nothing
    #[arg(long)]
    compare_only: bool,

    /// Do not revert a failed optimization
    #[arg(long)]
    no_rollback: bool,

    /// Minimum improvement percentage that counts as success
    #[arg(long)]
    threshold: Option<f64>,

    /// Order in which operations are undone
    #[arg(long, value_enum)]
    rollback_order: Option<RollbackOrderArg>,

    /// Recommendation model name
    #[arg(long)]
    model: Option<String>,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one optimization cycle against a single database
    Run {
        /// Target database (falls back to MONGO_DB / config)
        #[arg(long)]
        database: Option<String>,
        #[command(flatten)]
        cycle: CycleArgs,
    },

    /// Run optimization cycles against several databases in parallel
    Multi {
        /// Comma-separated database names; quoted names may contain commas
        #[arg(long)]
        databases: Option<String>,
        /// Maximum number of databases optimized at once
        #[arg(long)]
        max_parallel: Option<usize>,
        #[command(flatten)]
        cycle: CycleArgs,
    },

    /// List stored optimization records, newest first
    History {
        /// Only records for this database
        #[arg(long)]
        database: Option<String>,
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete records older than the retention window
    Cleanup {
        /// Retention window in days
        #[arg(long)]
        retention_days: Option<u32>,
        #[command(flatten)]
        store: StoreArgs,
    },
}

impl CycleArgs {
    fn overrides(&self, log_level: Option<String>) -> Overrides {
        Overrides {
            mongo_uri: self.mongo_uri.clone(),
            threshold: self.threshold,
            no_rollback: self.no_rollback,
            compare_only: self.compare_only,
            rollback_order: self.rollback_order.map(RollbackOrder::from),
            model: self.model.clone(),
            ..self.store.overrides(log_level)
        }
    }
}

impl Commands {
    fn overrides(&self, log_level: Option<String>) -> Overrides {
        match self {
            Commands::Run { database, cycle } => Overrides {
                database: database.clone(),
                ..cycle.overrides(log_level)
            },
            Commands::Multi {
                databases,
                max_parallel,
                cycle,
            } => Overrides {
                databases: databases.as_deref().map(parse_database_list),
                max_parallel: *max_parallel,
                ..cycle.overrides(log_level)
            },
            Commands::History { store, .. } => store.overrides(log_level),
            Commands::Cleanup {
                retention_days,
                store,
            } => Overrides {
                retention_days: *retention_days,
                ..store.overrides(log_level)
            },
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::new().filter_or("MONGOTUNE_LOG", level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn main() {
    let cli = Cli::parse();
    let (output, quiet) = (cli.output, cli.quiet);
    let overrides = cli.command.overrides(cli.log_level.clone());

    let settings = match config::load(cli.config.as_deref(), overrides) {
        Ok(s) => s,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };
    init_logging(&settings.log_level);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to create tokio runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };

    let command = cli.command;
    let result = rt.block_on(async {
        match command {
            Commands::Run { .. } => commands::run::cmd_run(&settings, output, quiet).await,
            Commands::Multi { .. } => commands::run::cmd_multi(&settings, output, quiet).await,
            Commands::History {
                database, limit, ..
            } => {
                commands::history::cmd_history(&settings, database.as_deref(), limit, output)
                    .await
            }
            Commands::Cleanup { .. } => {
                commands::cleanup::cmd_cleanup(&settings, output, quiet).await
            }
        }
    });

    if let Err(e) = result {
        report_error(&e.to_string(), output, quiet);
        process::exit(1);
    }
}

/// Report an error in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
