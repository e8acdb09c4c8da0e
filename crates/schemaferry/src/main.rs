//! schemaferry CLI
//!
//! `migrate` runs the pipeline (use `--dry-run` to preview), `validate`
//! checks a configuration file, `version` prints the build version. A
//! config file carries every knob; the flags here override the common ones.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use schemaferry::config::Config;
use schemaferry::migrator::{MigrationOutcome, Migrator};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "schemaferry")]
#[command(version)]
#[command(about = "Migrate schemas from AWS Glue Schema Registry to Confluent Cloud Schema Registry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration (or preview it with --dry-run)
    Migrate(MigrateArgs),
    /// Validate a configuration file
    Validate {
        /// Config file path
        #[arg(short, long)]
        config: String,
    },
    /// Print version information
    Version,
}

#[derive(Args)]
struct MigrateArgs {
    /// Config file path (recommended; flags override file values)
    #[arg(short, long)]
    config: Option<String>,

    // AWS source
    /// AWS region
    #[arg(long)]
    aws_region: Option<String>,
    /// AWS profile name
    #[arg(long)]
    aws_profile: Option<String>,
    /// AWS access key ID
    #[arg(long)]
    aws_access_key_id: Option<String>,
    /// AWS secret access key
    #[arg(long)]
    aws_secret_access_key: Option<String>,
    /// Glue registry name (repeatable)
    #[arg(long = "aws-registry-name")]
    aws_registry_names: Vec<String>,
    /// Migrate all registries
    #[arg(long)]
    aws_registry_all: bool,

    // Confluent Cloud target
    /// Schema Registry URL
    #[arg(long)]
    cc_sr_url: Option<String>,
    /// API key
    #[arg(long)]
    cc_api_key: Option<String>,
    /// API secret
    #[arg(long)]
    cc_api_secret: Option<String>,

    // Common options
    /// Preview without making changes
    #[arg(long)]
    dry_run: bool,
    /// Number of parallel workers
    #[arg(long)]
    workers: Option<usize>,
    /// Log level: debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("schemaferry {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Validate { config } => {
            init_logging("info");
            let cfg = Config::from_file(&config)
                .with_context(|| format!("failed to load config from {config}"))?;
            cfg.validate().context("configuration is invalid")?;
            println!("configuration OK: {config}");
            Ok(())
        }
        Commands::Migrate(args) => run_migrate(args).await,
    }
}

async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => Config::default(),
    };
    apply_flags(&mut config, &args);
    config.apply_env_fallbacks();

    init_logging(&config.output.log_level);

    config.validate().context("configuration is invalid")?;

    // One token for the whole run; SIGINT / SIGTERM cancel it
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let migrator = Migrator::new(config.clone(), cancel).context("failed to initialize")?;

    let start = std::time::Instant::now();
    let outcome = migrator.run().await.context("migration failed")?;
    print_summary(&outcome, start.elapsed(), config.output.dry_run);

    if !config.output.dry_run && outcome.failed > 0 {
        bail!("migration completed with {} failures", outcome.failed);
    }
    Ok(())
}

fn apply_flags(config: &mut Config, args: &MigrateArgs) {
    if let Some(v) = &args.aws_region {
        config.aws.region = v.clone();
    }
    if let Some(v) = &args.aws_profile {
        config.aws.profile = v.clone();
    }
    if let Some(v) = &args.aws_access_key_id {
        config.aws.access_key_id = v.clone();
    }
    if let Some(v) = &args.aws_secret_access_key {
        config.aws.secret_access_key = v.clone();
    }
    if !args.aws_registry_names.is_empty() {
        config.aws.registry_names = args.aws_registry_names.clone();
    }
    if args.aws_registry_all {
        config.aws.registry_all = true;
    }
    if let Some(v) = &args.cc_sr_url {
        config.confluent_cloud.url = v.clone();
    }
    if let Some(v) = &args.cc_api_key {
        config.confluent_cloud.api_key = v.clone();
    }
    if let Some(v) = &args.cc_api_secret {
        config.confluent_cloud.api_secret = v.clone();
    }
    if args.dry_run {
        config.output.dry_run = true;
    }
    if let Some(v) = args.workers {
        config.concurrency.workers = v;
    }
    if let Some(v) = &args.log_level {
        config.output.log_level = v.clone();
    }
}

fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down gracefully");
            cancel.cancel();
        }
    });
}

fn print_summary(outcome: &MigrationOutcome, elapsed: std::time::Duration, dry_run: bool) {
    println!();
    println!("===============================================================");
    if dry_run {
        println!("                      DRY RUN COMPLETE");
    } else if outcome.failed > 0 {
        println!("               MIGRATION COMPLETED WITH ERRORS");
    } else {
        println!("                MIGRATION COMPLETED SUCCESSFULLY");
    }
    println!("===============================================================");
    println!("  duration:    {:.1?}", elapsed);
    println!("  registries:  {}", outcome.registries);
    println!("  schemas:     {}", outcome.schemas);
    println!("  versions:    {}", outcome.versions);
    println!("  successful:  {}", outcome.successful);
    println!("  failed:      {}", outcome.failed);
    println!("  skipped:     {}", outcome.skipped);
    if outcome.llm_calls > 0 {
        println!(
            "  llm calls:   {} (cost ${:.2})",
            outcome.llm_calls, outcome.llm_cost
        );
    }
    println!("===============================================================");

    if outcome.failed > 0 {
        info!("see the report and checkpoint files for per-schema failures");
    }
}
