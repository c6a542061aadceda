use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pacer::config::{Config, ScheduleConfig};
use pacer::scheduler::DistributionPattern;

mod commands;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "pacer.toml";

#[derive(Parser)]
#[command(
    name = "pacer",
    version,
    about = "Spread a fixed number of requests over a time window",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

/// Schedule overrides shared by `plan` and `run`
#[derive(Args, Debug, Default)]
struct ScheduleArgs {
    /// Number of requests
    #[arg(short = 'n', long)]
    total: Option<usize>,

    /// Window to spread requests over (e.g. 90s, 45m, 24h, 1d)
    #[arg(short, long)]
    duration: Option<String>,

    /// Distribution pattern (uniform, peak_weighted)
    #[arg(short, long)]
    pattern: Option<DistributionPattern>,

    /// First peak hour (0-23)
    #[arg(long)]
    peak_start: Option<u8>,

    /// First hour after the peak (0-23)
    #[arg(long)]
    peak_end: Option<u8>,

    /// Density multiplier inside the peak
    #[arg(long)]
    peak_weight: Option<f64>,

    /// Random spread applied to each wait (0-1)
    #[arg(long)]
    jitter: Option<f64>,

    /// Jitter seed
    #[arg(long)]
    seed: Option<u64>,
}

impl ScheduleArgs {
    fn apply(&self, schedule: &mut ScheduleConfig) {
        if let Some(total) = self.total {
            schedule.total_requests = total;
        }
        if let Some(duration) = &self.duration {
            schedule.duration = duration.clone();
        }
        if let Some(pattern) = self.pattern {
            schedule.pattern = pattern;
        }
        if let Some(hour) = self.peak_start {
            schedule.peak_start_hour = hour;
        }
        if let Some(hour) = self.peak_end {
            schedule.peak_end_hour = hour;
        }
        if let Some(weight) = self.peak_weight {
            schedule.peak_weight = weight;
        }
        if let Some(ratio) = self.jitter {
            schedule.jitter_ratio = ratio;
        }
        if let Some(seed) = self.seed {
            schedule.jitter_seed = Some(seed);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the delay sequence for a schedule
    Plan {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Number of dispatches to list
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a schedule, resuming a saved one if present
    Run {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Shell command to run per request (PACER_INDEX, PACER_TOTAL set)
        #[arg(short, long)]
        exec: Option<String>,

        /// Ignore any saved run and start over
        #[arg(long, default_value = "false")]
        fresh: bool,
    },

    /// Show the saved run
    Status {
        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Discard the saved run
    Clear,

    /// Inspect or export configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the effective configuration to a file
    Init {
        /// Output path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Plan {
            schedule,
            limit,
            json,
        } => {
            schedule.apply(&mut config.schedule);
            config.validate()?;
            commands::plan(&config, limit, json)?;
        }

        Commands::Run {
            schedule,
            exec,
            fresh,
        } => {
            schedule.apply(&mut config.schedule);
            config.validate()?;
            tracing::info!(
                total = config.schedule.total_requests,
                duration = %config.schedule.duration,
                pattern = %config.schedule.pattern,
                backend = %config.storage.backend,
                "Starting run command"
            );
            commands::run(&config, exec, fresh).await?;
        }

        Commands::Status { json } => {
            commands::status(&config, json)?;
        }

        Commands::Clear => {
            commands::clear(&config)?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config)?,
            ConfigAction::Init { output, force } => {
                config.validate()?;
                commands::config_init(&config, &output, force)?;
            }
        },
    }

    Ok(())
}

/// Defaults, then the config file, then `PACER_*` environment variables
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Config::default(),
    };

    config
        .apply_env()
        .context("Failed to apply environment overrides")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("pacer=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("pacer={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
