use anyhow::{bail, Context};
use clap::Parser;
use nt_core::logging::init_logging;
use nt_core::{DriverKind, Filter, Settings};
use nt_records::Records;
use nt_storage::{ActiveDriver, DriverSelector, RefreshOutcome, SnapshotDriver};
use serde_json::Value;
use tracing::{info, warn, Level};

fn parse_filter(s: &str) -> std::result::Result<Filter, String> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(filter)) => Ok(filter),
        Ok(_) => Err("filter must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON filter: {}", e)),
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum DriverArg {
    Transactional,
    Snapshot,
}

#[derive(Parser, Debug)]
#[command(name = "nt-db", author, version, about = "Maintenance commands for the news store", long_about = None)]
pub struct Cli {
    /// Override the driver chosen from DB_NAME
    #[arg(long, value_enum)]
    driver: Option<DriverArg>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Count rows of a table matching a filter
    Count {
        table: String,
        #[arg(long, value_parser = parse_filter)]
        filter: Option<Filter>,
    },
    /// Print matching rows as JSON lines
    Get {
        table: String,
        #[arg(long, value_parser = parse_filter)]
        filter: Option<Filter>,
        /// Only print the first match
        #[arg(long)]
        one: bool,
    },
    /// Keep one row per distinct value of a field
    Dedupe {
        table: String,
        #[arg(long)]
        field: String,
    },
    /// Delete randomly chosen articles and clean up their clusters
    PruneArticles {
        #[arg(long)]
        amount: usize,
        #[arg(long, value_parser = parse_filter)]
        filter: Option<Filter>,
    },
    /// Reload the snapshot now and report table sizes
    Refresh,
}

async fn refresh_once(driver: &SnapshotDriver) -> anyhow::Result<()> {
    match driver.cache().refresh().await? {
        RefreshOutcome::Completed(total) => info!("🔄 Snapshot refreshed, {} rows loaded", total),
        RefreshOutcome::Skipped => warn!("Snapshot refresh already running, skipped"),
    }
    for (table, size) in driver.cache().table_sizes() {
        println!("{}\t{}", table, size);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(Level::INFO);
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(driver) = cli.driver {
        settings.driver = match driver {
            DriverArg::Transactional => DriverKind::Transactional,
            DriverArg::Snapshot => DriverKind::Snapshot,
        };
    }
    let selector = DriverSelector::new(settings);
    let active = selector.active().await.context("Failed to initialize the storage driver")?;
    let db = active.driver();
    let records = Records::new(db.clone(), selector.settings());

    match cli.command {
        Commands::Count { table, filter } => {
            let count = db.count(&table, &filter.unwrap_or_default()).await?;
            println!("{}", count);
        }
        Commands::Get { table, filter, one } => {
            let filter = filter.unwrap_or_default();
            let rows = if one {
                vec![db.get_one(&table, &filter).await?]
            } else {
                db.get_many(&table, &filter).await?
            };
            for row in rows {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Commands::Dedupe { table, field } => {
            let removed = records.general.remove_duplicates_by_field(&table, &field).await?;
            info!("🧹 Removed {} duplicate rows from `{}` by `{}`", removed, table, field);
            println!("{}", removed);
        }
        Commands::PruneArticles { amount, filter } => {
            let summary = records.articles.delete_random_articles(amount, filter).await?;
            println!(
                "articles deleted: {}, detached from clusters: {}, clusters deleted: {}",
                summary.articles_deleted, summary.detached_from_clusters, summary.clusters_deleted
            );
        }
        Commands::Refresh => {
            let ActiveDriver::Snapshot(driver) = active else {
                bail!("`refresh` needs the snapshot driver (DB_NAME=git or --driver snapshot)");
            };
            refresh_once(driver).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(r#"{"domain": {"$in": ["bbc.com"]}}"#).unwrap();
        assert!(filter.contains_key("domain"));
        assert!(parse_filter("[1, 2]").is_err());
        assert!(parse_filter("{").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["nt-db", "--driver", "snapshot", "count", "articles", "--filter", "{}"]).unwrap();
        assert!(matches!(cli.driver, Some(DriverArg::Snapshot)));
        assert!(matches!(cli.command, Commands::Count { .. }));

        let cli = Cli::try_parse_from(["nt-db", "prune-articles", "--amount", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::PruneArticles { amount: 3, filter: None }));

        let cli = Cli::try_parse_from(["nt-db", "refresh"]).unwrap();
        assert!(matches!(cli.command, Commands::Refresh));
        assert!(Cli::try_parse_from(["nt-db", "refresh", "--every", "10m"]).is_err());
    }
}
