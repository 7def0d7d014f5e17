use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use studysync::cache::SqliteCache;
use studysync::config::Config;
use studysync::keys::DataKey;
use studysync::remote::RemoteClient;
use studysync::sync::SyncLayer;

#[derive(Parser, Debug)]
#[command(name = "studysync")]
#[command(about = "Inspect and migrate study-tracker data between the local cache and the server")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/studysync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read a value (remote first, then local cache)
  Get {
    key: String,
    /// JSON printed when no value is stored anywhere
    #[arg(short, long, default_value = "null")]
    default: String,
  },
  /// Store a JSON value
  Set { key: String, value: String },
  /// Delete a value locally and remotely
  Delete { key: String },
  /// Print every stored value
  Dump,
  /// Push all local values to the server
  Push,
  /// List known keys and local cache slots
  Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("STUDYSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    )
    .with_writer(writer)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let cache = match &config.cache.path {
    Some(path) => SqliteCache::open_at(path)?,
    None => SqliteCache::open()?,
  };
  let remote = RemoteClient::new(
    &config.remote.url,
    Config::get_api_token(),
    config.remote.timeout(),
  )?;
  let layer = SyncLayer::new(cache, remote);
  tracing::debug!(url = %layer.remote().base_url(), "using remote store");

  match args.command {
    Command::Get { key, default } => {
      let default = parse_json(&default)?;
      let value = layer.get_data(key, default).await;
      print_json(&value)?;
    }
    Command::Set { key, value } => {
      let value = parse_json(&value)?;
      let outcome = layer.save_data(key, value).await;
      print_json(&outcome)?;
    }
    Command::Delete { key } => {
      let remote_committed = layer.delete_data(key).await;
      print_json(&serde_json::json!({ "remote_committed": remote_committed }))?;
    }
    Command::Dump => {
      let all: serde_json::Map<String, Value> = layer
        .get_all_data()
        .await
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
      print_json(&all)?;
    }
    Command::Push => {
      let outcome = layer.sync_to_backend().await;
      print_json(&outcome)?;
    }
    Command::Keys => {
      let entries = layer.local().entries()?;
      for key in DataKey::known() {
        let local_name = key.local_name();
        let written = entries
          .iter()
          .find(|e| e.name == local_name)
          .map(|e| e.written_at.to_rfc3339())
          .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{}", key, local_name, written);
      }
      for entry in &entries {
        if let Some(key @ DataKey::Raw(_)) = DataKey::from_local_name(&entry.name) {
          println!("{}\t{}\t{}", key, entry.name, entry.written_at.to_rfc3339());
        }
      }
    }
  }

  Ok(())
}

fn parse_json(input: &str) -> Result<Value> {
  serde_json::from_str(input).map_err(|e| eyre!("Invalid JSON '{}': {}", input, e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to format output: {}", e))?;
  println!("{}", text);
  Ok(())
}
