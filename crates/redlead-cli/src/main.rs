mod seed;
mod stages;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use redlead_db::PgStore;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "redlead-cli")]
#[command(about = "redlead lead pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Upsert campaigns, monitors and accounts from a YAML seed file
    Seed {
        /// Path to the campaigns seed file
        #[arg(long, default_value = "config/campaigns.yaml")]
        file: PathBuf,
    },
    /// Search Reddit for new posts matching campaign keywords
    Scan {
        /// Only scan monitors of this organization
        #[arg(long)]
        organization: Option<Uuid>,
        /// Scan every monitor, even those not yet due
        #[arg(long)]
        force: bool,
    },
    /// Score new leads and draft replies for the relevant ones
    Qualify {
        #[arg(long)]
        batch_size: Option<usize>,
        /// Only qualify leads of this organization
        #[arg(long)]
        organization: Option<Uuid>,
    },
    /// Publish due items from the posting queue
    Post {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Refresh score and reply counts of posted replies
    Engagement {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Enqueue warm-up comments for accounts with warm-up enabled
    Warmup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("redlead-cli: no command given, see --help");
        return Ok(());
    };

    let config = redlead_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    // stdout carries the JSON summaries
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = redlead_db::PoolConfig::from_app_config(&config);
    let pool = redlead_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = redlead_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Seed { file } => {
            let store = PgStore::new(pool);
            let summary = seed::run_seed(&store, &file, |name| std::env::var(name).ok()).await?;
            print_summary(&summary)?;
        }
        Commands::Scan {
            organization,
            force,
        } => {
            let store = PgStore::new(pool);
            let summary = stages::run_scan(&store, &config, organization, force).await?;
            print_summary(&summary)?;
        }
        Commands::Qualify {
            batch_size,
            organization,
        } => {
            let store = PgStore::new(pool);
            let summary = stages::run_qualify(&store, &config, batch_size, organization).await?;
            print_summary(&summary)?;
        }
        Commands::Post { batch_size } => {
            let store = PgStore::new(pool);
            let summary = stages::run_post(&store, &config, batch_size).await?;
            print_summary(&summary)?;
        }
        Commands::Engagement { batch_size } => {
            let store = PgStore::new(pool);
            let summary = stages::run_engagement(&store, &config, batch_size).await?;
            print_summary(&summary)?;
        }
        Commands::Warmup => {
            let store = PgStore::new(pool);
            let summary = stages::run_warmup(&store, &config).await?;
            print_summary(&summary)?;
        }
    }

    Ok(())
}

fn print_summary<T: serde::Serialize>(summary: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
