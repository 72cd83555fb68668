//! veilkv: encrypted key-value CLI
//!
//! Commands:
//!   put <key> <value>    - seal and store a JSON value
//!   get <key>            - fetch and open a value
//!   del <key>...         - delete one or more keys
//!   list                 - list keys (--values to decrypt entries)
//!   export / import      - bulk round-trip as a JSON file
//!   recover              - rebuild the index from record recovery tickets
//!   hash-path <key>      - show a key's blind storage identifier
//!   save-index           - force an index write (manual-save setups)
//!   delete-index         - drop the index, keep the records
//!   delete-db            - destroy everything (requires --yes)
//!
//! Secrets come from VEILKV_SECRET / VEILKV_PASSWORD, or an interactive
//! prompt when unset.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;

use veilkv_core::config::{StoreConfig, VeilConfig};
use veilkv_core::ListQuery;
use veilkv_db::CryptoDb;
use veilkv_store::{
    build_fs_operator, build_memory_operator, build_s3_operator, BlobStore, Operator, S3Config,
};

#[derive(Parser, Debug)]
#[command(
    name = "veilkv",
    version,
    about = "Encrypted key-value store client",
    long_about = "veilkv: an encryption-at-rest layer over a plaintext blob store. \
                  Keys are blind-hashed, values are authenticated-encrypted, and \
                  every record carries a recovery ticket."
)]
struct Cli {
    /// Path to veilkv.toml configuration file
    #[arg(long, short = 'c', env = "VEILKV_CONFIG")]
    config: Option<PathBuf>,

    /// Backend root directory (overrides config)
    #[arg(long, env = "VEILKV_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal and store a value under a logical key
    Put {
        key: String,
        /// JSON value; plain text is stored as a JSON string
        value: String,
    },

    /// Fetch and decrypt the value for a key
    Get { key: String },

    /// Delete one or more keys
    Del {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List logical keys
    List {
        /// Decrypt and print full entries
        #[arg(long)]
        values: bool,
        /// Restrict to keys with this prefix
        #[arg(long, short = 'p')]
        prefix: Option<String>,
    },

    /// Decrypt the whole database to a JSON file (or stdout)
    Export {
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Import entries from a JSON export
    Import { input: PathBuf },

    /// Rebuild the index from record recovery tickets
    Recover,

    /// Show the blind storage identifier for a key
    #[command(name = "hash-path")]
    HashPath { key: String },

    /// Force an index write now
    #[command(name = "save-index")]
    SaveIndex,

    /// Delete the persisted index (records stay recoverable)
    #[command(name = "delete-index")]
    DeleteIndex,

    /// Destroy all records and the index
    #[command(name = "delete-db")]
    DeleteDb {
        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<VeilConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config: {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config: {}", path.display()))
        }
        None => Ok(VeilConfig::default()),
    }
}

/// Build the backend operator selected by `[store] service`. S3 credentials
/// come from the usual AWS environment variables.
fn build_operator(store: &StoreConfig, root_override: Option<&PathBuf>) -> Result<Operator> {
    match store.service.as_str() {
        "memory" => build_memory_operator(),
        "fs" => {
            let root = root_override.unwrap_or(&store.root);
            build_fs_operator(&root.to_string_lossy())
        }
        "s3" => build_s3_operator(&S3Config {
            endpoint: store.endpoint.clone(),
            region: store.region.clone(),
            bucket: store.bucket.clone(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID is required for the s3 service")?,
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY is required for the s3 service")?,
        }),
        other => anyhow::bail!("unknown store service {other:?} (expected fs, memory, or s3)"),
    }
}

fn read_secret(var: &str, prompt: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(var) {
        return Ok(SecretString::from(value));
    }
    let value = rpassword::prompt_password(prompt).context("reading secret from terminal")?;
    Ok(SecretString::from(value))
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let op = build_operator(&config.store, cli.root.as_ref())?;

    let secret = read_secret("VEILKV_SECRET", "secret key: ")?;
    let password = read_secret("VEILKV_PASSWORD", "password key: ")?;
    let db = CryptoDb::new(BlobStore::new(op), secret, password, config.db);

    match cli.command {
        Commands::Put { key, value } => {
            let event = db.put(&key, &parse_value(&value)).await?;
            println!("{}", serde_json::to_string(&event)?);
        }
        Commands::Get { key } => {
            let entry = db.get(&key).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Commands::Del { keys } => {
            let event = db.del(keys).await?;
            println!("{}", serde_json::to_string(&event)?);
        }
        Commands::List { values, prefix } => {
            let listing = db.list(ListQuery { values, prefix }).await?;
            match listing {
                veilkv_core::Listing::Keys(keys) => {
                    for key in keys {
                        println!("{key}");
                    }
                }
                veilkv_core::Listing::Entries(entries) => {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
            }
        }
        Commands::Export { output } => {
            let entries = db.export_db().await?;
            let text = serde_json::to_string_pretty(&entries)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("writing export: {}", path.display()))?;
                    eprintln!("exported {} entries to {}", entries.len(), path.display());
                }
                None => println!("{text}"),
            }
        }
        Commands::Import { input } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading import: {}", input.display()))?;
            let entries: Vec<veilkv_core::Entry> =
                serde_json::from_str(&text).context("parsing import rows")?;
            let event = db.import_db(&entries).await?;
            println!("{}", serde_json::to_string(&event)?);
        }
        Commands::Recover => {
            let recovered = db.recover_index().await?;
            eprintln!("recovered {} keys", recovered.len());
            for key in recovered {
                println!("{key}");
            }
        }
        Commands::HashPath { key } => {
            println!("{}", db.hash_path(&key).await?);
        }
        Commands::SaveIndex => {
            db.save_index(true).await?;
            eprintln!("index saved");
        }
        Commands::DeleteIndex => {
            db.delete_index().await?;
            eprintln!("index deleted (records remain recoverable)");
        }
        Commands::DeleteDb { yes } => {
            if !yes {
                anyhow::bail!("refusing to destroy the database without --yes");
            }
            let event = db.delete_db().await?;
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}
