use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("malformed peer address: {0:?}")]
    MalformedPeer(String),
    #[error("chain tip moved while the proof was being searched")]
    StaleTip,
    #[error("proof {proof} does not meet the difficulty target")]
    InvalidProof { proof: u64 },
    #[error("invalid chain: {0}")]
    InvalidChain(#[from] ChainValidationError),
}

/// Why a candidate chain failed validation. `index` is the zero-based
/// position of the offending block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainValidationError {
    #[error("chain is empty")]
    Empty,
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: usize },
    #[error("block {index} carries a proof that fails the difficulty target")]
    InvalidProof { index: usize },
}

/// Failure fetching a peer's chain. Consensus treats every variant as "the
/// peer has no opinion" and moves on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
    #[error("peer {peer} sent an unreadable chain: {reason}")]
    Decode { peer: String, reason: String },
}
