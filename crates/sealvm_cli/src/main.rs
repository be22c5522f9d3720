//! SealVM command line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod enclave;
mod state;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use config::NodeConfig;
use enclave::EnclaveDir;
use sealvm_core::{BlockInfo, Checksum, Env, Status};
use sealvm_enclave::ProvisioningCredentials;
use sealvm_wasm::{AddressCodec, Backend, EntryPoint, HexAddressCodec, MockQuerier, ModuleCache};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SealVM contract host
#[derive(Parser, Debug)]
#[command(name = "sealvm")]
#[command(about = "Store, inspect and run sandboxed contracts", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding stored code and enclave files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store contract code and print its checksum
    Store {
        /// WASM file to store
        file: PathBuf,
    },

    /// Print stored code as hex, or write it out
    Code {
        /// Hex checksum
        checksum: String,

        /// Output file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the analysis of stored code
    Analyze {
        /// Hex checksum
        checksum: String,
    },

    /// Call an entry point of stored code
    Run {
        /// Hex checksum
        checksum: String,

        /// Entry point
        #[arg(short, long, value_enum, default_value_t = EntryArg::Execute)]
        entry: EntryArg,

        /// Message handed to the contract
        #[arg(short, long, default_value = "{}")]
        msg: String,

        /// Gas limit
        #[arg(short, long, default_value_t = 1_000_000)]
        gas: u64,

        /// JSON state file of hex keys and values
        #[arg(short, long, default_value = "state.json")]
        state: PathBuf,

        /// Sender address
        #[arg(long)]
        sender: Option<String>,

        /// Block height
        #[arg(long, default_value_t = 1)]
        height: u64,

        /// Chain identifier
        #[arg(long, default_value = "sealvm-local")]
        chain_id: String,
    },

    /// Enclave identity and attestation
    Enclave {
        #[command(subcommand)]
        command: EnclaveCommands,
    },
}

#[derive(Subcommand, Debug)]
enum EnclaveCommands {
    /// Print the enclave health status
    Health,

    /// Generate and seal a registration key
    Keygen,

    /// Register the node and produce attestation evidence
    Attest {
        /// Service provider id (hex)
        #[arg(long)]
        spid: String,

        /// Provisioning API key
        #[arg(long)]
        api_key: String,

        /// Produce evidence without submitting it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntryArg {
    Instantiate,
    Execute,
    Query,
}

impl From<EntryArg> for EntryPoint {
    fn from(arg: EntryArg) -> Self {
        match arg {
            EntryArg::Instantiate => Self::Instantiate,
            EntryArg::Execute => Self::Execute,
            EntryArg::Query => Self::Query,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?.with_data_dir(cli.data_dir.clone());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Store { file } => {
            let wasm = std::fs::read(&file)
                .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
            let cache = ModuleCache::new(config.cache.clone())?;
            let checksum = cache.create(&wasm)?;
            tracing::info!(%checksum, size = wasm.len(), "Stored code");
            println!("{checksum}");
        }
        Commands::Code { checksum, out } => {
            let cache = ModuleCache::new(config.cache.clone())?;
            let code = cache.get_code(&parse_checksum(&checksum)?)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &code)
                        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} bytes to {}", code.len(), path.display());
                }
                None => println!("{}", hex::encode(&code)),
            }
        }
        Commands::Analyze { checksum } => {
            let cache = ModuleCache::new(config.cache.clone())?;
            let report = cache.analyze_code(&parse_checksum(&checksum)?)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run {
            checksum,
            entry,
            msg,
            gas,
            state,
            sender,
            height,
            chain_id,
        } => {
            let checksum = parse_checksum(&checksum)?;
            let entry = EntryPoint::from(entry);
            let api = HexAddressCodec::default();
            let contract = api.humanize(&checksum.as_ref()[..api.canonical_len()])?;

            let mut env = Env::new(
                BlockInfo {
                    height,
                    time_nanos: 0,
                    chain_id,
                },
                contract,
            );
            if let Some(sender) = sender.filter(|_| entry != EntryPoint::Query) {
                env = env.with_sender(sender);
            }

            let store = state::load(&state)?;
            let backend = Backend::new(store, api, MockQuerier::new(0));
            let cache = ModuleCache::new(config.cache.clone())?;
            let report = cache.call(entry, &checksum, &env, msg.as_bytes(), backend, gas);
            let status = report.status();

            let mut output = serde_json::json!({
                "status": status,
                "gas_used": report.gas_used,
            });
            match &report.result {
                Ok(response) => {
                    output["response"] = String::from_utf8_lossy(response).into_owned().into();
                }
                Err(err) => output["error"] = err.to_string().into(),
            }
            println!("{}", serde_json::to_string_pretty(&output)?);

            if status == Status::Ok && entry != EntryPoint::Query {
                state::save(&state, &report.backend.storage)?;
                tracing::info!(path = %state.display(), "Saved state");
            }
        }
        Commands::Enclave { command } => {
            let enclave_dir = EnclaveDir::open(&config.data_dir())?;
            match command {
                EnclaveCommands::Health => {
                    let enclave = enclave_dir.enclave(&config.enclave, "")?;
                    enclave_dir.restore(&enclave)?;
                    println!("{}", enclave.get_health_check()?.to_json()?);
                }
                EnclaveCommands::Keygen => {
                    let enclave = enclave_dir.enclave(&config.enclave, "")?;
                    let key = enclave.key_gen()?;
                    let path = enclave_dir.registration_key();
                    std::fs::write(&path, &key.sealed_private_key)
                        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                    println!("{}", hex::encode(key.public_key));
                }
                EnclaveCommands::Attest {
                    spid,
                    api_key,
                    dry_run,
                } => {
                    let credentials = ProvisioningCredentials::new(spid, api_key.as_str())?;
                    let enclave = enclave_dir.enclave(&config.enclave, &api_key)?;
                    let attestation = enclave_dir.attest(&enclave, &credentials, dry_run)?;
                    let report = attestation.evidence.verify()?;

                    let output = serde_json::json!({
                        "registration_key": hex::encode(attestation.registration_key),
                        "master_key": hex::encode(attestation.master_key),
                        "bootstrapped": attestation.bootstrapped,
                        "mr_enclave": hex::encode(report.mr_enclave),
                        "signer": hex::encode(attestation.evidence.signer),
                        "dry_run": dry_run,
                        "health": enclave.get_health_check()?,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
    }

    Ok(())
}

fn parse_checksum(input: &str) -> Result<Checksum> {
    Checksum::from_hex(input).map_err(|e| eyre!("Invalid checksum {:?}: {}", input, e))
}
