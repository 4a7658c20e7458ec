#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use notarium_core::{
    from_bytes, to_bytes, KeyPair, NodeInfo, Party, SecureHash, SignedNodeInfo, StateRef, SystemClock,
    TimeWindow, Timestamp, PLATFORM_VERSION,
};
use notarium_notary::{
    NotarisationPayload, NotaryMode, NotaryReply, NotaryService, NotaryServiceConfig,
    PersistentUniquenessProvider, UniquenessProvider,
};
use notarium_tx::{OutputState, TransactionBuilder};
use rand_core::{OsRng, RngCore};
use serde_json::json;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Node configuration resolved from CLI/env/defaults.
#[derive(Parser, Debug)]
#[command(name = "notarium-node", version)]
struct Config {
    /// Path to the uniqueness index (sled)
    #[arg(long = "db")]
    db: Option<PathBuf>,
    /// Log filter, e.g. `info` or `notarium_notary=debug`
    #[arg(long = "log")]
    log: Option<String>,
    /// Notary mode: validating or non-validating
    #[arg(long = "mode")]
    mode: Option<NotaryMode>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a Borsh-encoded signed node-info file and print its identities
    InspectNodeInfo { file: PathBuf },
    /// Write a freshly signed single-identity node-info file
    NewNodeInfo {
        /// Legal name of the identity
        #[arg(long)]
        name: String,
        /// Advertised address (repeatable)
        #[arg(long = "address")]
        addresses: Vec<String>,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Report consumed states from the uniqueness index
    Consumed {
        /// Only report this state (`<txhash>:<index>`)
        #[arg(long)]
        state: Option<StateRef>,
    },
    /// Build, sign and notarise a throwaway transaction against the index
    NotariseDemo {
        /// Number of fresh input states to consume
        #[arg(long, default_value_t = 2)]
        inputs: u32,
    },
}

struct ResolvedConfig {
    db_path: PathBuf,
    log_filter: String,
    mode: NotaryMode,
}

fn resolve_config(cli: &Config) -> Result<ResolvedConfig> {
    let db_path = cli
        .db
        .clone()
        .or_else(|| env::var("NOTARIUM_DB").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("notarium.uniqueness.db"));

    let log_filter = cli
        .log
        .clone()
        .or_else(|| env::var("NOTARIUM_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    let mode = match cli.mode {
        Some(mode) => mode,
        None => match env::var("NOTARIUM_MODE") {
            Ok(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
            Err(_) => NotaryMode::default(),
        },
    };

    Ok(ResolvedConfig {
        db_path,
        log_filter,
        mode,
    })
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Config::parse();
    let cfg = resolve_config(&cli)?;
    init_logging(&cfg.log_filter);

    match cli.command {
        Commands::InspectNodeInfo { file } => inspect_node_info(&file),
        Commands::NewNodeInfo {
            name,
            addresses,
            out,
        } => new_node_info(name, addresses, &out),
        Commands::Consumed { state } => consumed(&cfg, state),
        Commands::NotariseDemo { inputs } => notarise_demo(&cfg, inputs),
    }
}

fn inspect_node_info(file: &Path) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let signed: SignedNodeInfo = from_bytes(&bytes)?;
    let info = signed.verified()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn new_node_info(name: String, addresses: Vec<String>, out: &Path) -> Result<()> {
    let key = KeyPair::generate();
    let info = NodeInfo {
        addresses,
        legal_identities: vec![Party::new(name, key.public_key())],
        platform_version: PLATFORM_VERSION,
        serial: Timestamp::now().as_millis().max(0) as u64,
    };
    let signed = info.sign_with(&[key])?;
    fs::write(out, to_bytes(&signed)?).with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), "node info written");
    Ok(())
}

fn consumed(cfg: &ResolvedConfig, state: Option<StateRef>) -> Result<()> {
    let provider = PersistentUniquenessProvider::open(&cfg.db_path)?;
    match state {
        Some(state) => {
            let record = provider.lookup(&state)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "state": state.to_string(),
                    "consumed_by": record,
                }))?
            );
        }
        None => {
            let entries: Vec<_> = provider
                .entries()?
                .into_iter()
                .map(|(state, consumer)| json!({ "state": state.to_string(), "consumed_by": consumer }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn notarise_demo(cfg: &ResolvedConfig, inputs: u32) -> Result<()> {
    let notary_key = KeyPair::generate();
    let notary = Party::new("O=Demo Notary,L=London,C=GB", notary_key.public_key());
    let requester_key = KeyPair::generate();
    let requester = Party::new("O=Demo Requester,L=Paris,C=FR", requester_key.public_key());

    let provider = Arc::new(PersistentUniquenessProvider::open(&cfg.db_path)?);
    let service = NotaryService::new(
        notary.clone(),
        vec![notary_key],
        provider,
        Arc::new(SystemClock),
        NotaryServiceConfig {
            mode: cfg.mode,
            platform_version: PLATFORM_VERSION,
            time_tolerance: None,
        },
    )?;

    // Inputs reference a fabricated issuing transaction.
    let mut issuer = [0u8; 32];
    OsRng.fill_bytes(&mut issuer);
    let issuer = SecureHash(issuer);
    let mut builder = TransactionBuilder::new();
    for index in 0..inputs {
        builder = builder.add_input(StateRef::new(issuer, index));
    }
    let tx = builder
        .add_output(OutputState {
            contract: "demo".into(),
            data: b"hello".to_vec(),
        })
        .notary(notary)
        .time_window(TimeWindow::with_tolerance(
            Timestamp::now(),
            time::Duration::seconds(30),
        )?)
        .build()?;
    info!(tx_id = %tx.id(), inputs, mode = %cfg.mode, "submitting demo transaction");

    let payload = NotarisationPayload::prepare(&tx, cfg.mode, &requester_key, PLATFORM_VERSION)?;
    let reply = service.process(payload, &requester);
    println!("{}", serde_json::to_string_pretty(&json!({ "tx_id": tx.id().to_string(), "reply": reply }))?);
    match reply {
        NotaryReply::Signed(_) => Ok(()),
        NotaryReply::Error(e) => Err(anyhow!(e)),
    }
}
