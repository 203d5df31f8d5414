use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use tally_ledger::{
    AggregateDocument, Clock, IdentityDeriver, ItemEntry, RateLimiter, SystemClock, VoteConfig,
    VoteCoordinator, VoteError,
};
use tally_storage::{FileDocumentStore, JsonDocumentStore};

#[derive(Parser)]
#[command(author, version, about = "Vote ledger over versioned JSON documents", long_about = None)]
struct Cli {
    /// Directory holding the aggregate and ledger documents
    #[arg(long, default_value = ".")]
    store_dir: PathBuf,

    /// Salt for identity derivation; overrides the built-in default
    #[arg(long)]
    salt: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the aggregate document with the given item ids
    Init {
        /// Item identifiers to seed, all starting at zero votes
        item_ids: Vec<String>,
    },
    /// Cast a vote for an item
    Cast {
        /// Item identifier
        item_id: String,
        /// Client address the identity is derived from
        #[arg(long)]
        address: String,
    },
    /// Retract a previously cast vote
    Retract {
        /// Item identifier
        item_id: String,
        /// Client address the identity is derived from
        #[arg(long)]
        address: String,
    },
    /// List items with their vote totals
    List {
        /// Client address used to flag the caller's own votes
        #[arg(long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    debug!("using document store at {}", cli.store_dir.display());

    let mut config = VoteConfig::default();
    if let Some(salt) = cli.salt {
        config.identity_salt = salt;
    }

    let store = Arc::new(FileDocumentStore::new(&cli.store_dir));
    let deriver = IdentityDeriver::new(config.identity_salt.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = RateLimiter::new(config.rate_limit.clone(), clock.clone());
    let aggregate_path = config.aggregate_path.clone();
    let coordinator = VoteCoordinator::with_clock(store.clone(), config, clock);

    match cli.command {
        Commands::Init { item_ids } => {
            let aggregate = AggregateDocument {
                entries: item_ids.into_iter().map(ItemEntry::new).collect(),
            };
            store.put_json(&aggregate_path, &aggregate, None).await?;
            println!(
                "Seeded {} items in {}",
                aggregate.entries.len(),
                aggregate_path
            );
        }
        Commands::Cast { item_id, address } => {
            let identity = deriver.derive(&address);
            if !limiter.allow(&identity).await {
                return Err(VoteError::RateLimited.into());
            }
            let receipt = coordinator.cast_vote(&item_id, &identity).await?;
            println!(
                "Vote recorded: {} now has {} votes",
                receipt.item_id, receipt.vote_count
            );
        }
        Commands::Retract { item_id, address } => {
            let identity = deriver.derive(&address);
            let receipt = coordinator.retract_vote(&item_id, &identity).await?;
            println!(
                "Vote retracted: {} now has {} votes",
                receipt.item_id, receipt.vote_count
            );
        }
        Commands::List { address } => {
            let identity = address.as_deref().map(|a| deriver.derive(a));
            let items = coordinator.list_votes(identity.as_deref()).await?;
            for item in items {
                let marker = if item.user_voted { " (voted)" } else { "" };
                println!("{}: {} votes{}", item.id, item.vote_count, marker);
            }
        }
    }

    Ok(())
}
