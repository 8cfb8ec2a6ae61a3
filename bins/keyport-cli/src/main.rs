//! keyport: command-line front end for local and node-held accounts.
//!
//! Parses a positional command vector (`keyport new secret nile`) and runs it
//! against [`AccountService`]. Every error is rendered as one line of text.

mod commands;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::debug;

use keyport_core::{Endpoint, LocationRef, RawKey, WalletConfig, to_checksum};
use keyport_wallet::{AccountService, SendRequest, SigningPath};

use crate::commands::{Command, CommandError, help_text, parse_command};

const APP_NAME: &str = "keyport";

/// Manage Ethereum-style accounts in a local keystore or on a node.
#[derive(Parser)]
#[command(name = "keyport")]
#[command(version, about = "Local keystore and node account manager")]
struct Cli {
    /// Command words, e.g. `new <password> [local]`. See --help-commands.
    commands: Vec<String>,

    /// Key chain file for local keys (default: ~/.keyport/key_chain.json).
    #[arg(short, long = "key-chain")]
    key_chain: Option<PathBuf>,

    /// Config file (default: ~/.keyport/config.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show debug log.
    #[arg(short, long)]
    debug: bool,

    /// Show the help for the possible commands.
    #[arg(long)]
    help_commands: bool,

    /// Export or import key records as JSON (the default).
    #[arg(long)]
    as_json: bool,

    /// Export or import raw private keys instead of key records.
    #[arg(long, conflicts_with = "as_json")]
    as_key: bool,

    /// Sign `send ether` transactions locally instead of on the node.
    #[arg(long)]
    local: bool,

    /// Seconds to wait for a transaction receipt.
    #[arg(long)]
    timeout: Option<u64>,
}

/// How `export` and `import` represent a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFormat {
    /// Encrypted V3 key record JSON.
    Record,
    /// Bare 0x-hex private key.
    Raw,
}

impl Cli {
    fn key_format(&self) -> KeyFormat {
        match (self.as_json, self.as_key) {
            (true, _) | (false, false) => KeyFormat::Record,
            (false, true) => KeyFormat::Raw,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        Err(e) => {
            eprintln!("{e:#}");
            if e.downcast_ref::<CommandError>().is_some() {
                eprintln!("\n--help-commands to view the full command list");
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<Vec<String>> {
    let mut config = WalletConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(path) = &cli.key_chain {
        config.keystore_path = Some(path.clone());
    }

    if cli.help_commands || cli.commands.is_empty() {
        return Ok(vec![help_text(APP_NAME, &config.networks)]);
    }

    let command = parse_command(&cli.commands)?;
    debug!(command = %cli.commands[0], "parsed command");

    let mut service = AccountService::new(config)
        .context("failed to open key chain")?;
    execute(&mut service, command, &cli).await
}

async fn execute(service: &mut AccountService, command: Command, cli: &Cli) -> Result<Vec<String>> {
    let output = match command {
        Command::New { password, network } => {
            let location = resolve(service, &network)?;
            let address = service.new_account(&password, &location).await?;
            vec![to_checksum(&address)]
        }
        Command::Delete {
            address,
            password,
            network,
        } => {
            let location = resolve(service, &network)?;
            service.delete_account(&address, &password, &location).await?;
            vec![format!("delete account {address}")]
        }
        Command::List { network } => {
            let location = resolve(service, &network)?;
            service
                .list_accounts(&location)
                .await?
                .iter()
                .map(to_checksum)
                .collect()
        }
        Command::Export {
            address,
            password,
            network,
        } => {
            let location = resolve(service, &network)?;
            let exported = match cli.key_format() {
                KeyFormat::Raw => {
                    let key = service
                        .export_private_key(&address, &password, &location)
                        .await?;
                    format!("0x{}", key.to_hex())
                }
                KeyFormat::Record => {
                    let record = service
                        .export_account_record(&address, &password, &location)
                        .await?;
                    serde_json::to_string_pretty(&record)?
                }
            };
            vec![format!("Address {address} key:"), exported]
        }
        Command::Import {
            source,
            password,
            network,
        } => {
            let location = resolve(service, &network)?;
            let text = read_source(&source)?;
            let address = match cli.key_format() {
                KeyFormat::Raw => {
                    let key = RawKey::from_hex(text.trim())?;
                    service
                        .import_private_key(None, &key, &password, &location)
                        .await?
                }
                KeyFormat::Record => {
                    service
                        .import_account_record(&text, &password, &location)
                        .await?
                }
            };
            vec![format!("imported account {address}")]
        }
        Command::Copy {
            from,
            address,
            password,
            to,
        } => {
            let from_location = resolve(service, &from)?;
            let to_location = resolve(service, &to)?;
            let copied = service
                .copy_account(&address, &password, &from_location, &to_location)
                .await?;
            vec![format!("copied account {copied} from {from_location} to {to_location}")]
        }
        Command::Password {
            address,
            old_password,
            new_password,
            network,
        } => {
            let location = resolve(service, &network)?;
            service
                .change_password(&address, &old_password, &new_password, &location)
                .await?;
            vec![format!("changed password for account {address}")]
        }
        Command::GetEther {
            address,
            network,
            amount,
        } => {
            let balance = service.request_ether(&address, &network, amount).await?;
            vec![format!("{address}  ether : {balance}")]
        }
        Command::Balance { address, network } => {
            let endpoint = node_endpoint(service, &network)?;
            let balance = service.balance(&address, &endpoint).await?;
            vec![format!("{address} ether: {balance}")]
        }
        Command::SendEther {
            from,
            password,
            network,
            to,
            amount,
        } => {
            let endpoint = node_endpoint(service, &network)?;
            let path = if cli.local {
                SigningPath::Local
            } else {
                SigningPath::Custodial
            };
            let mut request = SendRequest::new(to_checksum(&from), to_checksum(&to), amount.as_str(), path);
            if let Some(secs) = cli.timeout {
                request = request.with_timeout(Duration::from_secs(secs));
            }
            let receipt = service.send_value(&request, &password, &endpoint).await?;
            vec![format!(
                "sent {amount} ether from {from} to {to} in transaction {}",
                receipt.transaction_hash
            )]
        }
    };
    Ok(output)
}

fn resolve(service: &AccountService, network: &str) -> Result<LocationRef> {
    Ok(service.config().networks.resolve(network)?)
}

fn node_endpoint(service: &AccountService, network: &str) -> Result<Endpoint> {
    match resolve(service, network)? {
        LocationRef::Remote(endpoint) => Ok(endpoint),
        LocationRef::Local => bail!("\"{network}\" has no node; give a network name or url"),
    }
}

/// The argument itself, or the contents of the file it names.
fn read_source(source: &str) -> Result<String> {
    let path = Path::new(source);
    if path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    Ok(source.to_string())
}
