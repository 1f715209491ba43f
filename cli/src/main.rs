//! Ember CLI: manage the sealed keystore without starting a wallet session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use ember_store::{CreatedAddressStore, KeystoreAdapter, NewKey};
use ember_store_lmdb::LmdbEnvironment;
use ember_types::{AccountId, Secret};
use ember_utils::{init_logging, LogFormat};
use ember_wallet_core::WalletConfig;

#[derive(Parser)]
#[command(name = "ember", about = "Ember wallet keystore tool")]
struct Cli {
    /// Directory holding the LMDB environment. Overrides the config file.
    #[arg(long, env = "EMBER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "EMBER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "EMBER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "EMBER_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// List stored accounts.
    List,
    /// Seal and store a key.
    Add {
        #[arg(long)]
        account: String,
        #[arg(long, env = "EMBER_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long, env = "EMBER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a key after checking its password.
    Remove {
        #[arg(long)]
        account: String,
        #[arg(long, env = "EMBER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Remember a password so the key unlocks without prompting.
    Remember {
        #[arg(long)]
        account: String,
        #[arg(long, env = "EMBER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Write every sealed key to a file.
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Add sealed keys from an exported file.
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Show secondary-currency addresses created through this wallet.
    Created {
        #[arg(long)]
        account: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WalletConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WalletConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format.as_deref() {
        config.log_format = LogFormat::parse(format);
    }
    init_logging(config.log_format, &config.log_level);

    let env = LmdbEnvironment::open(&config.data_dir, config.map_size)
        .with_context(|| format!("opening {}", config.data_dir.display()))?;
    let keystore: Arc<dyn KeystoreAdapter> = Arc::new(env.keystore());
    let created = env.created_address_store();

    match cli.command {
        Command::List => {
            for account in keystore.list()? {
                let name = keystore.key_name(&account)?.unwrap_or_default();
                let remembered = keystore.password_for_account(&account)?.is_some();
                println!(
                    "{account}\t{name}\t{}",
                    if remembered { "remembered" } else { "locked" }
                );
            }
        }
        Command::Add {
            account,
            secret,
            password,
            name,
        } => {
            let account = AccountId::new(account);
            let key = NewKey {
                account: account.clone(),
                secret: Secret::new(secret),
                credential: Secret::new(password),
                name: name.unwrap_or_default(),
            };
            let store = Arc::clone(&keystore);
            tokio::task::spawn_blocking(move || store.add(key)).await??;
            tracing::info!(account = %account, "key added");
        }
        Command::Remove { account, password } => {
            let account = AccountId::new(account);
            verify(&keystore, &account, Secret::new(password)).await?;
            keystore.remove(&account)?;
            created.forget_account(&account)?;
            tracing::info!(account = %account, "key removed");
        }
        Command::Remember { account, password } => {
            let account = AccountId::new(account);
            let password = Secret::new(password);
            verify(&keystore, &account, password.clone()).await?;
            keystore.remember_password(&account, &password)?;
            tracing::info!(account = %account, "password remembered");
        }
        Command::Export { out } => {
            let blob = keystore.export()?;
            std::fs::write(&out, blob).with_context(|| format!("writing {}", out.display()))?;
            tracing::info!(path = %out.display(), "keystore exported");
        }
        Command::Import { file } => {
            let blob = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let added = keystore.import(&blob)?;
            for account in &added {
                println!("{account}");
            }
            tracing::info!(imported = added.len(), "keystore imported");
        }
        Command::Created { account } => {
            for (index, address) in created.created_for(&AccountId::new(account))?.iter().enumerate() {
                println!("{index}\t{address}");
            }
        }
    }
    Ok(())
}

/// Fail unless `password` opens the key for `account`.
async fn verify(
    keystore: &Arc<dyn KeystoreAdapter>,
    account: &AccountId,
    password: Secret,
) -> anyhow::Result<()> {
    let store = Arc::clone(keystore);
    let lookup = account.clone();
    match tokio::task::spawn_blocking(move || store.load(&lookup, &password)).await? {
        Ok(_) => Ok(()),
        Err(ember_store::StoreError::Credential) => bail!("wrong password for {account}"),
        Err(e) => Err(e.into()),
    }
}
