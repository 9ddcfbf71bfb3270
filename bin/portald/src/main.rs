use std::{fs, sync::Arc, time::Duration};

use portal_btcio::rpc::BitcoinClient;
use portal_common::logging;
use portal_config::Config;
use portal_derivation::AddressDerivationEngine;
use portal_fees::{fee_refresh_task, FeeOracle};
use portal_service::ShieldingPortal;
use portal_store::InMemoryStore;
use tracing::*;

use crate::args::Args;

mod args;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");
        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    // Start runtime for async IO tasks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("portal-rt")
        .build()
        .expect("init: build rt");

    // Init the logging before we do anything else.
    logging::init(logging::LoggerConfig::with_base_name("portald"));

    let config = load_config(&args)?;

    let keyset = config.shielding.master_key_set()?;
    let engine = AddressDerivationEngine::new(keyset, config.shielding.network);

    let node = Arc::new(BitcoinClient::new(
        config.bitcoind.rpc_url.clone(),
        config.bitcoind.rpc_user.clone(),
        config.bitcoind.rpc_password.clone(),
    )?);
    let store = Arc::new(InMemoryStore::new());

    let oracle = Arc::new(FeeOracle::new(config.fees.endpoint.clone())?);
    runtime.spawn(fee_refresh_task(
        oracle.clone(),
        Duration::from_secs(config.fees.refresh_interval_secs),
    ));

    let portal = ShieldingPortal::new(
        engine,
        store,
        node,
        oracle.clone(),
        config.shielding.finality_depth,
    );

    info!(
        network = %config.shielding.network,
        finality_depth = config.shielding.finality_depth,
        "portal initialized"
    );

    runtime.block_on(async {
        let health = portal.health().await;
        if !health.node_ok {
            warn!("bitcoind is not reachable yet");
        }

        tokio::signal::ctrl_c().await?;
        info!("received interrupt, shutting down");
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(&args.config)?;
    let config = toml::from_str::<Config>(&raw)?;
    Ok(config)
}
