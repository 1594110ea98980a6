use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use adserver::catalog;
use adserver::config::{Config, DatabaseBackend};
use adserver::models::{EntityKind, EntityWithMeta, Relation};
use adserver::storage::{PostgresStorage, SqliteStorage, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "adserver-admin")]
#[command(about = "Ad server record management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a record
    Create {
        /// Record kind (publisher, site, page, zone, advertiser, campaign, ad)
        kind: EntityKind,
        /// Record title
        title: String,
        /// Metadata as key=value, repeatable (url, image, priority, country)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Set metadata on a record; an empty value deletes the key
    SetMeta {
        id: i64,
        #[arg(value_name = "KEY=VALUE", required = true)]
        meta: Vec<String>,
    },
    /// Connect two records
    Connect {
        /// Relation name, e.g. page_to_zone or ad_to_zone
        relation: Relation,
        from: i64,
        to: i64,
    },
    /// Remove a connection
    Disconnect {
        relation: Relation,
        from: i64,
        to: i64,
    },
    /// Delete a record with its metadata and connections
    Delete { id: i64 },
    /// List records, newest first
    List {
        #[arg(long)]
        kind: Option<EntityKind>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a record with its metadata
    Show { id: i64 },
}

fn parse_meta(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{pair}'"))?;
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn print_record(record: &EntityWithMeta) {
    let entity = &record.entity;
    println!(
        "#{} [{}] {} (clicks: {}, created {})",
        entity.id, entity.kind, entity.title, entity.clicks, entity.created_at
    );
    for (key, value) in &record.meta {
        println!("    {key} = {value}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(SqliteStorage::new(&config.database.url, 1).await?),
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::new(&config.database.url, 1).await?)
        }
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Create { kind, title, meta } => {
            let meta = parse_meta(&meta)?;
            let record = catalog::create_entity(storage.as_ref(), kind, &title, &meta)
                .await
                .context("failed to create record")?;
            println!("✓ Created {} #{}", record.entity.kind, record.entity.id);
            print_record(&record);
        }
        Commands::SetMeta { id, meta } => {
            let meta = parse_meta(&meta)?;
            let record = catalog::update_meta(storage.as_ref(), id, &meta)
                .await
                .context("failed to update metadata")?;
            println!("✓ Updated metadata on #{id}");
            print_record(&record);
        }
        Commands::Connect { relation, from, to } => {
            storage
                .connect(relation, from, to)
                .await
                .context("failed to connect records")?;
            println!("✓ Connected #{from} -> #{to} ({relation})");
        }
        Commands::Disconnect { relation, from, to } => {
            if storage.disconnect(relation, from, to).await? {
                println!("✓ Disconnected #{from} -> #{to} ({relation})");
            } else {
                println!("⚠ No {relation} connection from #{from} to #{to}");
            }
        }
        Commands::Delete { id } => {
            if storage.delete_entity(id).await? {
                println!("✓ Deleted #{id}");
            } else {
                println!("⚠ Record #{id} not found");
            }
        }
        Commands::List { kind, limit } => {
            let entities = storage.list_entities(kind, limit.max(1), 0).await?;
            if entities.is_empty() {
                println!("No records found.");
            } else {
                println!("{:<8} {:<12} {:<8} {}", "ID", "Kind", "Clicks", "Title");
                println!("{}", "-".repeat(60));
                for entity in entities {
                    println!(
                        "{:<8} {:<12} {:<8} {}",
                        entity.id, entity.kind, entity.clicks, entity.title
                    );
                }
            }
        }
        Commands::Show { id } => {
            let Some(record) = catalog::load(storage.as_ref(), id).await? else {
                bail!("record #{id} not found");
            };
            print_record(&record);
            for relation in Relation::ALL {
                if !relation.involves(record.entity.kind) {
                    continue;
                }
                let linked = catalog::connected_entities(storage.as_ref(), relation, id).await?;
                if !linked.is_empty() {
                    let ids: Vec<String> = linked.iter().map(|e| format!("#{}", e.id)).collect();
                    println!("    {relation}: {}", ids.join(", "));
                }
            }
        }
    }

    Ok(())
}
