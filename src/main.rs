use clap::{Parser, Subcommand};
use layaway_ledger::application::LayawayEngine;
use layaway_ledger::config::Policy;
use layaway_ledger::domain::ids::{Actor, UserId};
use layaway_ledger::domain::money::Money;
use layaway_ledger::domain::ports::{SavingsStore, StoreRef};
use layaway_ledger::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use layaway_ledger::infrastructure::rocksdb::RocksDBStore;
use layaway_ledger::interfaces::csv::deposit_reader::DepositReader;
use layaway_ledger::interfaces::csv::ledger_writer::LedgerWriter;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Operator tooling for the layaway, membership and savings ledger.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// JSON file overriding fees, penalties and limits.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Operator identity recorded on confirmations.
    #[arg(long, global = true)]
    operator: Option<UserId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the default membership tiers if none exist.
    SeedTiers,
    /// List membership tiers as JSON.
    Tiers,
    /// Credit a member's savings.
    Deposit {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Credit deposits from a `user,amount,reference` CSV file.
    ImportDeposits { input: PathBuf },
    /// Print a member's savings balance.
    Balance {
        #[arg(long)]
        user: UserId,
    },
    /// Export a member's savings ledger as CSV, oldest entry first.
    Ledger {
        #[arg(long)]
        user: UserId,
    },
    /// Print a member's layaway eligibility as JSON.
    Eligibility {
        #[arg(long)]
        user: UserId,
    },
    /// Expire due memberships and default overdue layaways.
    Sweep,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_store(db_path: Option<PathBuf>) -> Result<StoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(&path).into_diagnostic()?;
            tracing::info!(path = %path.display(), "using RocksDB storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "built without the storage-rocksdb feature, falling back to in-memory storage"
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let policy = match &cli.config {
        Some(path) => Policy::from_file(path).into_diagnostic()?,
        None => Policy::default(),
    };
    let engine = LayawayEngine::new(open_store(cli.db_path)?, policy);
    let operator = Actor::operator(cli.operator.unwrap_or_default());

    match cli.command {
        Command::SeedTiers => {
            let created = engine.seed_default_tiers(&operator).await.into_diagnostic()?;
            if created.is_empty() {
                tracing::info!("tiers already present, nothing to seed");
            }
            print_json(&created)?;
        }
        Command::Tiers => {
            print_json(&engine.tiers().await.into_diagnostic()?)?;
        }
        Command::Deposit {
            user,
            amount,
            reference,
        } => {
            let balance = engine
                .deposit(&operator, user, Money::new(amount), reference)
                .await
                .into_diagnostic()?;
            println!("{}", balance.value());
        }
        Command::ImportDeposits { input } => {
            let file = File::open(input).into_diagnostic()?;
            let mut touched = BTreeSet::new();
            let (mut imported, mut failed) = (0usize, 0usize);
            for (row, record) in DepositReader::new(file).deposits().enumerate() {
                let outcome = match record {
                    Ok(d) => engine
                        .deposit(&operator, d.user, d.amount, d.reference)
                        .await
                        .map(|_| d.user),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(user) => {
                        imported += 1;
                        touched.insert(user);
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(row = row + 1, error = %e, "deposit rejected");
                    }
                }
            }
            tracing::info!(imported, failed, "import finished");

            println!("user,balance");
            for user in touched {
                let balance = engine.balance(&operator, user).await.into_diagnostic()?;
                println!("{user},{}", balance.value());
            }
        }
        Command::Balance { user } => {
            let balance = engine.balance(&operator, user).await.into_diagnostic()?;
            println!("{}", balance.value());
        }
        Command::Ledger { user } => {
            let entries = engine.store().entries(user).await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            writer.write_entries(&entries).into_diagnostic()?;
        }
        Command::Eligibility { user } => {
            print_json(&engine.eligibility(&operator, user).await.into_diagnostic()?)?;
        }
        Command::Sweep => {
            let memberships = engine.expire_due_memberships().await.into_diagnostic()?;
            let layaways = engine.default_overdue_layaways().await.into_diagnostic()?;
            println!(
                "expired_memberships={} defaulted_layaways={} failures={}",
                memberships.transitioned,
                layaways.transitioned,
                memberships.failures.len() + layaways.failures.len()
            );
        }
    }

    Ok(())
}
