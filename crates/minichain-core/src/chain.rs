use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    constants::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF, POW_DIFFICULTY},
    error::LedgerError,
    hash_block, now_timestamp,
    peers::PeerSet,
    pow,
    validate::{is_chain_valid, validate_chain},
    Block, Transaction,
};

/// Trait the storage backends implement to snapshot a ledger.
/// This lives in `minichain-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, index: u64) -> Result<Option<Block>>;
    /// Replace everything stored with `chain`.
    fn put_chain(&self, chain: &[Block]) -> Result<()>;
    fn load_chain(&self) -> Result<Vec<Block>>;
    fn tip_height(&self) -> Result<u64>;
    fn tip_hash(&self) -> Result<Option<String>>;
    fn close(&self) -> Result<()>;
}

/// Reward transaction appended to every block this node mines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningReward {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
}

impl MiningReward {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }
}

/// Snapshot of the tip a proof is being searched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningTemplate {
    pub previous_proof: u64,
    pub previous_hash: String,
    pub difficulty: usize,
}

#[derive(Clone, Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    peers: PeerSet,
    difficulty: usize,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Self {
        Self::with_difficulty(POW_DIFFICULTY)
    }

    pub fn with_difficulty(difficulty: usize) -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            pending: Vec::new(),
            peers: PeerSet::new(),
            difficulty,
        };
        ledger.create_block(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        ledger
    }

    /// Rebuild a ledger around a previously stored chain.
    pub fn from_chain(chain: Vec<Block>, difficulty: usize) -> Result<Self, LedgerError> {
        validate_chain(&chain, difficulty)?;
        Ok(Self {
            chain,
            pending: Vec::new(),
            peers: PeerSet::new(),
            difficulty,
        })
    }

    /// Append a block carrying everything currently pending and empty the pool.
    pub fn create_block(&mut self, proof: u64, previous_hash: String) -> Block {
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: now_timestamp(),
            proof,
            previous_hash,
            transactions: std::mem::take(&mut self.pending),
        };
        self.chain.push(block.clone());
        block
    }

    pub fn previous_block(&self) -> Result<&Block, LedgerError> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    /// Queue a transaction. The returned index is the block it should land in
    /// if nothing else is mined first.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u64,
    ) -> u64 {
        self.pending.push(Transaction::new(sender, receiver, amount));
        self.chain.len() as u64 + 1
    }

    pub fn add_peer(&mut self, address: &str) -> Result<bool, LedgerError> {
        let added = self.peers.insert(address)?;
        if added {
            debug!(peer = address, "registered peer");
        }
        Ok(added)
    }

    pub fn is_chain_valid(&self, chain: &[Block]) -> bool {
        is_chain_valid(chain, self.difficulty)
    }

    pub fn mining_template(&self) -> Result<MiningTemplate, LedgerError> {
        let previous = self.previous_block()?;
        Ok(MiningTemplate {
            previous_proof: previous.proof,
            previous_hash: hash_block(previous),
            difficulty: self.difficulty,
        })
    }

    /// Seal a block whose proof was found against `template`. Fails with
    /// `StaleTip` if the chain changed since the template was taken and with
    /// `InvalidProof` if `proof` does not solve it.
    pub fn commit_mined(
        &mut self,
        template: &MiningTemplate,
        proof: u64,
        reward: &MiningReward,
    ) -> Result<Block, LedgerError> {
        let current = self.mining_template()?;
        if current != *template {
            return Err(LedgerError::StaleTip);
        }
        if !pow::verify(template.previous_proof, proof, self.difficulty) {
            return Err(LedgerError::InvalidProof { proof });
        }
        self.add_transaction(reward.sender.clone(), reward.receiver.clone(), reward.amount);
        let block = self.create_block(proof, template.previous_hash.clone());
        info!(
            index = block.index,
            proof = block.proof,
            txs = block.transactions.len(),
            "mined block"
        );
        Ok(block)
    }

    /// Full mining cycle on the calling thread.
    pub fn mine_block(&mut self, reward: &MiningReward) -> Result<Block, LedgerError> {
        let template = self.mining_template()?;
        let proof = pow::solve(template.previous_proof, template.difficulty);
        self.commit_mined(&template, proof, reward)
    }

    /// Adopt `candidate` if it is strictly longer than the local chain and valid.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            return false;
        }
        if let Err(err) = validate_chain(&candidate, self.difficulty) {
            warn!(%err, "refusing to adopt invalid chain");
            return false;
        }
        info!(
            old_length = self.chain.len(),
            new_length = candidate.len(),
            "replaced local chain"
        );
        self.chain = candidate;
        true
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFICULTY: usize = 2;

    fn reward() -> MiningReward {
        MiningReward::new("node-1", "miner", 1)
    }

    #[test]
    fn genesis_block_example() {
        let ledger = Blockchain::new();
        assert_eq!(ledger.len(), 1);
        let genesis = &ledger.chain()[0];
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, 1);
        assert_eq!(genesis.previous_hash, "0");
        assert!(genesis.transactions.is_empty());
        assert_eq!(ledger.difficulty(), POW_DIFFICULTY);
    }

    #[test]
    fn previous_block_is_tip() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        assert_eq!(ledger.previous_block().unwrap().index, 1);
        let block = ledger.mine_block(&reward()).unwrap();
        assert_eq!(ledger.previous_block().unwrap(), &block);
    }

    #[test]
    fn create_block_links_index_and_drains_pool() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        ledger.add_transaction("alice", "bob", 3);
        let block = ledger.create_block(42, "abc".to_string());
        assert_eq!(block.index, 2);
        assert_eq!(block.proof, 42);
        assert_eq!(block.previous_hash, "abc");
        assert_eq!(block.transactions, vec![Transaction::new("alice", "bob", 3)]);
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn add_transaction_returns_next_index_hint() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        assert_eq!(ledger.add_transaction("a", "b", 1), 2);
        assert_eq!(ledger.add_transaction("a", "b", 2), 2);
        ledger.mine_block(&reward()).unwrap();
        assert_eq!(ledger.add_transaction("a", "b", 3), 3);
    }

    #[test]
    fn mined_block_flushes_pool_in_submission_order() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        let submitted: Vec<Transaction> = (0..5)
            .map(|i| Transaction::new(format!("user{i}"), "bob", i))
            .collect();
        for tx in &submitted {
            ledger.add_transaction(tx.sender.clone(), tx.receiver.clone(), tx.amount);
        }
        let block = ledger.mine_block(&reward()).unwrap();

        // The reward is queued last, after everything submitted.
        assert_eq!(block.transactions.len(), submitted.len() + 1);
        assert_eq!(&block.transactions[..submitted.len()], &submitted[..]);
        assert_eq!(
            block.transactions.last().unwrap(),
            &Transaction::new("node-1", "miner", 1)
        );
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn mined_block_links_to_previous() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        let genesis = ledger.chain()[0].clone();
        let block = ledger.mine_block(&reward()).unwrap();
        assert_eq!(block.previous_hash, genesis.hash());
        assert_eq!(block.proof, 308);
        assert!(pow::verify(genesis.proof, block.proof, DIFFICULTY));
        assert!(ledger.is_chain_valid(ledger.chain()));
    }

    #[test]
    fn commit_rejects_stale_template() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        let template = ledger.mining_template().unwrap();
        let proof = pow::solve(template.previous_proof, template.difficulty);
        ledger.mine_block(&reward()).unwrap();

        let err = ledger.commit_mined(&template, proof, &reward()).unwrap_err();
        assert!(matches!(err, LedgerError::StaleTip));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn commit_rejects_wrong_proof() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        let template = ledger.mining_template().unwrap();
        let err = ledger.commit_mined(&template, 1, &reward()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof { proof: 1 }));
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn add_peer_is_idempotent() {
        let mut ledger = Blockchain::new();
        assert!(ledger.add_peer("http://127.0.0.1:5001").unwrap());
        assert!(!ledger.add_peer("http://127.0.0.1:5001").unwrap());
        assert_eq!(ledger.peers().len(), 1);
        assert!(matches!(
            ledger.add_peer("http://"),
            Err(LedgerError::MalformedPeer(_))
        ));
    }

    #[test]
    fn replace_chain_requires_strictly_longer() {
        let mut local = Blockchain::with_difficulty(DIFFICULTY);
        local.mine_block(&reward()).unwrap();

        let mut other = Blockchain::with_difficulty(DIFFICULTY);
        other.mine_block(&reward()).unwrap();
        assert!(!local.replace_chain(other.chain().to_vec()));

        other.mine_block(&reward()).unwrap();
        assert!(local.replace_chain(other.chain().to_vec()));
        assert_eq!(local.chain(), other.chain());
    }

    #[test]
    fn replace_chain_rejects_invalid() {
        let mut local = Blockchain::with_difficulty(DIFFICULTY);
        let mut other = Blockchain::with_difficulty(DIFFICULTY);
        other.mine_block(&reward()).unwrap();
        other.mine_block(&reward()).unwrap();
        let mut forged = other.chain().to_vec();
        forged[2].previous_hash = "0".to_string();
        assert!(!local.replace_chain(forged));
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn from_chain_restores_valid_chains_only() {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        ledger.mine_block(&reward()).unwrap();
        let restored = Blockchain::from_chain(ledger.chain().to_vec(), DIFFICULTY).unwrap();
        assert_eq!(restored.chain(), ledger.chain());

        assert!(matches!(
            Blockchain::from_chain(Vec::new(), DIFFICULTY),
            Err(LedgerError::InvalidChain(_))
        ));
    }
}
