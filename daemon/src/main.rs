//! Aqueduct daemon — entry point for running a bridge operator.

mod devchain;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use aqueduct_frost::ShareHolder;
use aqueduct_network::TcpTransport;
use aqueduct_node::{
    load_or_establish_group_key, BridgeConfig, BridgeNode, DigestDeriver, ShutdownController,
};
use aqueduct_store::BridgeStore;
use aqueduct_store_lmdb::{environment::DEFAULT_MAP_SIZE, LmdbStore};
use aqueduct_types::NetworkId;

use devchain::DevChain;

#[derive(Parser)]
#[command(name = "aqueduct", about = "Aqueduct bridge operator daemon")]
struct Cli {
    /// Path to the operator's TOML configuration file.
    #[arg(long, env = "AQUEDUCT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory from the config file.
    #[arg(long, env = "AQUEDUCT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the bridge operator.
    Run,
    /// Generate a fresh operator mnemonic and print the derived identity
    /// key for the roster.
    GenerateIdentity,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aqueduct_utils::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateIdentity => generate_identity(),
        Command::Run => {
            let config_path = cli
                .config
                .ok_or_else(|| anyhow::anyhow!("--config is required to run"))?;
            let mut config = BridgeConfig::from_toml_file(&config_path)?;
            if let Some(data_dir) = cli.data_dir {
                config.data_dir = data_dir;
            }
            run(config).await
        }
    }
}

fn generate_identity() -> anyhow::Result<()> {
    let mnemonic = aqueduct_crypto::generate_mnemonic()?;
    let keypair = aqueduct_crypto::keypair_from_mnemonic(&mnemonic)?;
    println!("operator_mnemonic = \"{mnemonic}\"");
    println!("identity_key = \"{}\"", hex::encode(keypair.public.0));
    Ok(())
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let identity = if config.operator_mnemonic.is_empty() {
        tracing::warn!("no operator_mnemonic configured, generating a throwaway identity");
        aqueduct_crypto::generate_keypair()
    } else {
        aqueduct_crypto::keypair_from_mnemonic(&config.operator_mnemonic)?
    };

    let directory = Arc::new(config.directory()?);
    tracing::info!(
        participant = %directory.local(),
        operators = directory.len(),
        threshold = config.threshold,
        network = config.network.as_str(),
        "starting aqueduct operator"
    );

    let store: Arc<dyn BridgeStore> =
        Arc::new(LmdbStore::open(&config.data_dir.join("db"), DEFAULT_MAP_SIZE)?);

    let controller = ShutdownController::new();
    controller.listen_for_signals();

    let (transport, mut inbound) = TcpTransport::spawn(
        Arc::clone(&directory),
        config.network,
        &identity.private,
        controller.sender(),
    )
    .await?;

    let signer = load_or_establish_group_key(
        &directory,
        config.threshold,
        std::time::Duration::from_secs(config.dkg_round_timeout_secs),
        &config.share_path(),
        &identity.private.0,
        &transport,
        &mut inbound,
    )
    .await?;
    let holder = ShareHolder::new(signer);

    // The chain RPC clients are deployment-specific collaborators; the
    // dev network wires in-process stand-ins so the pipeline runs end to
    // end on one machine.
    if config.network != NetworkId::Dev {
        anyhow::bail!(
            "no chain RPC clients configured for {}; wire your coin-chain and host-ledger \
             clients at this integration point",
            config.network.as_str()
        );
    }
    let coin = DevChain::new(1_000, 2);
    let ledger = DevChain::new(50_000, 2);

    let deriver = Arc::new(DigestDeriver::new(config.network));
    let node = BridgeNode::new(
        config,
        directory,
        store,
        deriver,
        coin,
        ledger,
        transport,
        inbound,
        holder,
    );

    node.run(controller.sender().clone()).await?;
    Ok(())
}
