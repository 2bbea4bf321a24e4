use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use alloy_primitives::{Address, U256};
use askmi::{
    config::{AppConfig, ConfigurationError},
    contracts::rounded_eth_balance,
    fixture::{ChainFixture, FixtureError},
    session::{setup_ask_mi, setup_ask_mi_factory, SessionError},
    wallet::{WalletError, WalletProvider},
};
use askmi_core::{decode_identifier, encode_identifier, CodecError, MultihashRecord};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

//==================== Command line ====================//

#[derive(Parser)]
#[command(name = "askmi", version, about = "AskMi content identifiers and wallet sessions")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert between on-chain multihash records and base58 identifiers
    #[command(subcommand)]
    Cid(CidCommand),

    /// Validate and print the configuration (JSON file, or ASKMI_PROVIDER_ADDRESS / ASKMI_CHAIN_ID)
    Config {
        #[arg(long, env = "ASKMI_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Run the factory and AskMi sessions against a chain fixture
    Inspect {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long, env = "ASKMI_CONFIG")]
        config: Option<PathBuf>,
        /// AskMi instance to open instead of the signer's own
        #[arg(long)]
        ask_mi: Option<String>,
    },
}

#[derive(Subcommand)]
enum CidCommand {
    /// Encode (digest, hashFunction, size) as a base58 identifier
    Encode {
        /// Digest as 0x-prefixed hex
        #[arg(long)]
        digest: String,
        #[arg(long)]
        hash_function: String,
        #[arg(long)]
        size: String,
    },
    /// Decode a base58 identifier into its record
    Decode { identifier: String },
    /// SHA2-256 identifier of a file's content
    Hash { file: PathBuf },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid {name}: {reason}")]
    InvalidArg { name: &'static str, reason: String },
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn invalid(name: &'static str, err: impl std::fmt::Display) -> CliError {
    CliError::InvalidArg {
        name,
        reason: err.to_string(),
    }
}

fn parse_u256(name: &'static str, value: &str) -> Result<U256, CliError> {
    U256::from_str(value.trim()).map_err(|e| invalid(name, e))
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, CliError> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

//==================== cid ====================//

fn cid_encode_cmd(digest: &str, hash_function: &str, size: &str) -> Result<(), CliError> {
    let record = MultihashRecord::from_hex(
        digest,
        parse_u256("--hash-function", hash_function)?,
        parse_u256("--size", size)?,
    )
    .map_err(|e| invalid("--digest", e))?;

    match encode_identifier(&record).map_err(CodecError::from)? {
        Some(id) => println!("{id}"),
        None => println!("no identifier available"),
    }
    Ok(())
}

fn cid_decode_cmd(identifier: &str) -> Result<(), CliError> {
    let record = decode_identifier(identifier.trim()).map_err(CodecError::from)?;
    let out = json!({
        "digest": record.digest_hex(),
        "hash_function": record.hash_function.to_string(),
        "size": record.size.to_string(),
        "bytes": record.to_bytes().ok().map(|b| format!("0x{}", hex::encode(b))),
        "well_formed": record.validate().is_ok(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cid_hash_cmd(file: &Path) -> Result<(), CliError> {
    let content = fs::read(file).map_err(|source| CliError::Read {
        path: file.display().to_string(),
        source,
    })?;
    let record = MultihashRecord::sha2_256(&content);
    debug!(bytes = content.len(), digest = %record.digest_hex(), "hashed file");
    if let Some(id) = encode_identifier(&record).map_err(CodecError::from)? {
        println!("{id}");
    }
    Ok(())
}

//==================== config / inspect ====================//

fn config_cmd(path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn inspect_cmd(
    fixture: &Path,
    config: Option<&Path>,
    ask_mi: Option<&str>,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let (wallet, chain) = ChainFixture::load(fixture)?.build()?;
    let provider: Arc<dyn WalletProvider> = wallet;

    let factory_session = setup_ask_mi_factory(&config, Arc::clone(&provider), &chain)?;
    let signer = provider.get_signer()?;
    let balance = rounded_eth_balance(provider.as_ref(), signer.address)?;

    let target = match ask_mi {
        Some(addr) => Some(Address::from_str(addr.trim()).map_err(|e| invalid("--ask-mi", e))?),
        None => factory_session.my_ask_mi,
    };

    let ask_mi_summary = match target {
        Some(address) => {
            let session = setup_ask_mi(&config, address, Arc::clone(&provider), &chain)?;
            json!({
                "address": address,
                "owner": session.owner,
                "is_owner": session.is_owner(),
                "tiers": session.tiers,
                "questions": session.questions,
                "unanswered": session.unanswered().count(),
            })
        }
        None => serde_json::Value::Null,
    };

    let out = json!({
        "chain_id": config.chain_id,
        "signer": signer.address,
        "balance_eth": balance,
        "factory": factory_session.factory.address(),
        "my_ask_mi": factory_session.my_ask_mi,
        "ask_mi": ask_mi_summary,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

//==================== main ====================//

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Cid(CidCommand::Encode {
            digest,
            hash_function,
            size,
        }) => cid_encode_cmd(&digest, &hash_function, &size),
        Command::Cid(CidCommand::Decode { identifier }) => cid_decode_cmd(&identifier),
        Command::Cid(CidCommand::Hash { file }) => cid_hash_cmd(&file),
        Command::Config { config } => config_cmd(config.as_deref()),
        Command::Inspect {
            fixture,
            config,
            ask_mi,
        } => inspect_cmd(&fixture, config.as_deref(), ask_mi.as_deref()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}
