//! rule-indexer: compile detection rules and index them into OpenSearch.
//!
//! Subcommands:
//! - `index`   compile a rule file and write it plus its field mappings
//! - `delete`  remove a compiled rule by id
//! - `compile` dry run; prints the queries and consulted fields as JSON
//! - `config`  print the resolved configuration (secrets redacted)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use detect_core::config::{load_dotenv, Config};
use detect_core::RefreshPolicy;
use detect_rules::{DeleteRuleRequest, RuleIndexer, RuleRequest};
use detect_storage::{MemoryStore, OpenSearchStore};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rule-indexer", version, about)]
struct Cli {
    /// Config profile; `{PROFILE}_{KEY}` env vars override `{KEY}`.
    /// Defaults to `DETECT_PROFILE`.
    #[arg(long)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a rule file and index it.
    Index {
        /// Path to the rule YAML.
        #[arg(long)]
        file: PathBuf,

        /// Log category the rule belongs to.
        #[arg(long)]
        category: String,

        /// none | immediate | wait_until
        #[arg(long, default_value = "none")]
        refresh: RefreshPolicy,

        #[arg(long)]
        force: bool,
    },

    /// Delete a compiled rule.
    Delete {
        #[arg(long)]
        id: String,

        #[arg(long, default_value = "none")]
        refresh: RefreshPolicy,

        #[arg(long)]
        force: bool,
    },

    /// Compile a rule file without writing anything.
    Compile {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        category: String,
    },

    /// Show the resolved configuration and known profiles.
    Config,
}

async fn read_rule(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read rule file {}", path.display()))
}

fn opensearch_indexer(config: &Config) -> anyhow::Result<RuleIndexer> {
    let store = OpenSearchStore::new(&config.opensearch).context("failed to configure OpenSearch")?;
    Ok(RuleIndexer::new(Arc::new(store), config.indexing.clone()))
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    match cli.command {
        Command::Index {
            file,
            category,
            refresh,
            force,
        } => {
            let text = read_rule(&file).await?;
            let indexer = opensearch_indexer(&config)?;
            let request = RuleRequest::new(text, &category)
                .with_refresh(refresh)
                .with_force(force);

            let response = indexer.index_rule(request).await?;
            info!(rule_id = %response.id, version = response.version, "rule indexed");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Delete { id, refresh, force } => {
            let indexer = opensearch_indexer(&config)?;
            let request = DeleteRuleRequest::new(id)
                .with_refresh(refresh)
                .with_force(force);

            let response = indexer.delete_rule(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Compile { file, category } => {
            let text = read_rule(&file).await?;
            let indexer = RuleIndexer::new(Arc::new(MemoryStore::new()), config.indexing.clone());
            let rule = indexer.compile_only(&text, &category)?;

            let output = serde_json::json!({
                "id": rule.id,
                "title": rule.parsed.title,
                "category": rule.category,
                "queries": rule.queries,
                "query_field_names": rule.query_field_names,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Config => {
            let output = serde_json::json!({
                "active": config.redacted_summary(),
                "profiles": Config::available_profiles(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
