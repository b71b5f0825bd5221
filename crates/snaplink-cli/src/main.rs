mod app;
mod cli;
mod logging;

use crate::app::App;
use crate::cli::{Cli, Command, StorageBackendArg};
use anyhow::Context;
use clap::Parser;
use snaplink_storage::{InMemoryStore, MySqlStore};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.config.log_format);

    info!(storage_backend = %cli.config.storage, "starting snaplink");

    let output = match cli.config.storage {
        StorageBackendArg::InMemory => {
            App::new(InMemoryStore::new(), &cli.config)
                .execute(cli.command)
                .await?
        }
        StorageBackendArg::Mysql => {
            let dsn = cli
                .config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlStore::connect(dsn).await?;

            if matches!(cli.command, Command::Migrate) {
                store.migrate().await?;
                serde_json::json!({ "migrated": true })
            } else {
                App::new(store, &cli.config).execute(cli.command).await?
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
