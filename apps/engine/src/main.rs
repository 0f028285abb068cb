use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use pulsecheck_engine::config::Config;
use pulsecheck_engine::orchestrator::{NewService, Orchestrator};

#[derive(Parser)]
#[command(name = "pulsecheck")]
#[command(version, about = "Probe monitored services and keep their status current", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file, defaults to $XDG_CONFIG_HOME/pulsecheck/config.toml
    #[arg(short, long, global = true, env = "PULSECHECK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass over the roster and print the result as JSON
    Tick {
        /// Check every active service, due or not
        #[arg(short, long)]
        force: bool,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// Rebuild cached service fields from the check log
    Recompute {
        /// Only this service
        #[arg(long)]
        service: Option<Uuid>,
    },

    /// Add a service to the roster
    AddService {
        #[arg(long)]
        name: String,

        #[arg(long)]
        url: String,

        /// Minutes between checks
        #[arg(long, default_value_t = 5)]
        interval: u32,

        /// Report degraded when the body lacks this text
        #[arg(long)]
        keyword: Option<String>,

        /// Accept loopback and private network targets
        #[arg(long)]
        allow_private: bool,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let config = Config::from_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Tick { force } => {
            let orchestrator = Orchestrator::from_config(&config).await?;
            let report = orchestrator.run_tick(force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Migrate => {
            Orchestrator::open_database(&config).await?;
            println!("Database {} is up to date", config.database.path);
        }
        Commands::Recompute { service } => {
            let orchestrator = Orchestrator::from_config(&config).await?;
            let rebuilt = orchestrator.recompute(service).await?;
            println!("Rebuilt {rebuilt} service(s)");
        }
        Commands::AddService { name, url, interval, keyword, allow_private } => {
            let orchestrator = Orchestrator::from_config(&config).await?;
            let service = orchestrator
                .add_service(NewService {
                    name,
                    url,
                    check_interval: interval,
                    content_keyword: keyword,
                    allow_private,
                })
                .await?;
            println!("{}", service.id);
        }
        Commands::Config => print!("{config}"),
    }

    Ok(())
}
