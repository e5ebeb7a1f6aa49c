use std::sync::Arc;

use anyhow::{Context, Result};
use minichain_core::{
    chain::ChainStore, consensus::PeerTransport, Block, Blockchain, MiningReward,
};
use minichain_storage::SledStore;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{config::NodeConfig, transport::HttpTransport};

/// Shared by every request handler. The ledger lock serializes all chain and
/// pool mutations; proof search and peer fetches run without it.
pub struct AppState<T = HttpTransport> {
    pub ledger: Arc<RwLock<Blockchain>>,
    pub transport: Arc<T>,
    pub reward: MiningReward,
    pub store: Option<Arc<dyn ChainStore>>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            transport: Arc::clone(&self.transport),
            reward: self.reward.clone(),
            store: self.store.clone(),
        }
    }
}

impl<T: PeerTransport> AppState<T> {
    pub fn new(ledger: Blockchain, transport: T, reward: MiningReward) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            transport: Arc::new(transport),
            reward,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Append the tip of `chain` to the snapshot. When the stored
    /// predecessor is missing or differs, an earlier write was lost and the
    /// whole chain is rewritten instead. Failures are logged and never fail
    /// the request; the in-memory ledger stays authoritative.
    pub(crate) fn persist_tip(&self, chain: &[Block]) {
        let (Some(store), Some(tip)) = (&self.store, chain.last()) else {
            return;
        };
        let result = match stored_parent_matches(store.as_ref(), tip) {
            Ok(true) => store.put_block(tip),
            Ok(false) => {
                warn!(index = tip.index, "snapshot is missing blocks, rewriting it");
                store.put_chain(chain)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!(index = tip.index, "failed to persist block: {err:#}");
        }
    }

    pub(crate) fn persist_chain(&self, chain: &[Block]) {
        if let Some(store) = &self.store {
            if let Err(err) = store.put_chain(chain) {
                error!(length = chain.len(), "failed to persist chain: {err:#}");
            }
        }
    }
}

fn stored_parent_matches(store: &dyn ChainStore, block: &Block) -> Result<bool> {
    if block.index <= 1 {
        return Ok(true);
    }
    Ok(store
        .get_block(block.index - 1)?
        .is_some_and(|parent| parent.hash() == block.previous_hash))
}

/// Random identity used as the sender of this node's mining rewards.
pub fn generate_node_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Build the ledger and optional snapshot store described by `config`.
///
/// A stored chain that fails validation is left untouched and startup fails,
/// so a bad flag (say a higher `--difficulty`) never destroys a snapshot.
pub fn open_ledger(config: &NodeConfig) -> Result<(Blockchain, Option<Arc<dyn ChainStore>>)> {
    let Some(dir) = &config.data_dir else {
        return Ok((Blockchain::with_difficulty(config.difficulty), None));
    };

    let store = SledStore::open(dir)?;
    let stored = store.load_chain().context("reading stored chain")?;
    if stored.is_empty() {
        let ledger = Blockchain::with_difficulty(config.difficulty);
        store.put_chain(ledger.chain())?;
        info!("initialized empty store at {}", dir.display());
        return Ok((ledger, Some(Arc::new(store))));
    }

    let length = stored.len();
    let ledger = Blockchain::from_chain(stored, config.difficulty).with_context(|| {
        format!(
            "stored chain in {} ({length} blocks) is not valid at difficulty {}; \
             refusing to overwrite it, move the directory aside to start fresh",
            dir.display(),
            config.difficulty
        )
    })?;

    if let Some(tip) = ledger.last_block() {
        let height = store.tip_height()?;
        let hash = store.tip_hash()?;
        if height != tip.index || hash.as_deref() != Some(tip.hash().as_str()) {
            warn!(
                marker_height = height,
                stored_height = tip.index,
                "snapshot tip markers disagree with stored blocks, rewriting"
            );
            store.put_chain(ledger.chain())?;
        }
    }
    info!(length = ledger.len(), "restored chain from {}", dir.display());
    Ok((ledger, Some(Arc::new(store))))
}
