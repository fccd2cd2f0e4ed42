//! The `start` subcommand: wires `ember-network`'s peer group to
//! `ember-consensus`'s chain engine and runs until interrupted.

use std::sync::Arc;

use abscissa_core::{Command, FrameworkError, Options, Runnable};
use tokio::sync::broadcast::error::RecvError;

use ember_chain::block;
use ember_consensus::{chain::FullPrunedBlockChain, AlwaysValid, Chain, Params, ScriptVerifier};
use ember_network::peer_set::{GroupEvent, PeerGroup};
use ember_state::{in_memory::InMemoryStateService, store::BoxStore};

use crate::{config::EmberConfig, prelude::*};

/// The `start` subcommand.
#[derive(Command, Debug, Default, Options)]
pub struct StartCmd {
    /// Be more verbose (passed through to the tracing filter).
    #[options(short = "v", long = "verbose", help = "be more verbose")]
    pub verbose: bool,
}

impl StartCmd {
    /// No command-line overrides of the loaded config yet; kept for symmetry
    /// with `abscissa_core`'s `Configurable::process_config` hook.
    pub fn override_config(&self, config: EmberConfig) -> Result<EmberConfig, FrameworkError> {
        Ok(config)
    }
}

impl Runnable for StartCmd {
    fn run(&self) {
        let config: EmberConfig = (*app_config()).clone();

        let mut runtime = tokio::runtime::Runtime::new().expect("failed to start the tokio runtime");
        if let Err(report) = runtime.block_on(run(config)) {
            status_err!("{}", report);
            std::process::exit(1);
        }
    }
}

/// Builds the chain engine and peer group described by `config`, then drains
/// `GroupEvent`s until the peer group's broadcast channel closes.
async fn run(config: EmberConfig) -> Result<()> {
    let store: BoxStore = Box::new(InMemoryStateService::new());
    let params = Params::new(config.network.network);
    let script_verifier: Arc<dyn ScriptVerifier> = Arc::new(AlwaysValid);
    let genesis = Arc::new(ember_chain::parameters::genesis::genesis_block(
        config.network.network,
    ));
    let chain = Chain::new(FullPrunedBlockChain::new(
        params,
        store,
        script_verifier,
        config.state.max_reorg_depth,
        genesis,
    ));

    let our_best_height = chain
        .tip()
        .await
        .map(|(_, height)| height)
        .unwrap_or(block::Height(0));

    let peers = PeerGroup::spawn(config.network.clone(), our_best_height);
    let mut events = peers.subscribe();

    info!(network = ?config.network.network, "embernode starting");

    loop {
        match events.recv().await {
            Ok(GroupEvent::PeerConnected { addr, info }) => {
                debug!(%addr, user_agent = %info.user_agent, "peer connected");
            }
            Ok(GroupEvent::PeerDisconnected(addr)) => {
                debug!(%addr, "peer disconnected");
            }
            Ok(GroupEvent::BlockAnnounced { addr, hash }) => {
                debug!(%addr, %hash, "peer announced a block, requesting it");
                peers.request_blocks(vec![hash], None).await;
            }
            Ok(GroupEvent::BlockReceived(block)) => {
                let hash = block.hash();
                match chain.add(block).await {
                    Ok(true) => info!(%hash, "connected block to the best chain"),
                    Ok(false) => debug!(%hash, "block stored as a side branch or orphan"),
                    Err(err) => warn!(%hash, %err, "rejected block"),
                }
            }
            Ok(GroupEvent::TransactionReceived(tx)) => {
                trace!(hash = %tx.hash(), "received a transaction");
            }
            Ok(GroupEvent::DownloadPeerChanged(addr)) => {
                debug!(?addr, "download peer changed");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged behind the peer group");
            }
            Err(RecvError::Closed) => {
                info!("peer group shut down, exiting");
                break;
            }
        }
    }

    Ok(())
}
