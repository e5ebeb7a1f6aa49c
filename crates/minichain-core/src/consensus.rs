//! Longest-valid-chain resolution across known peers.
//!
//! Resolution is split in two so callers sharing a ledger behind a lock can
//! fetch without holding it: [`gather_candidates`] talks to the peers, then
//! [`Blockchain::adopt_longest`] makes the decision against the current chain.
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{chain::Blockchain, error::TransportError, validate::validate_chain, Block};

/// A peer's answer to "what is your chain", in the shape `/get_chain` returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChain {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl PeerChain {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub peer: String,
    pub reported: PeerChain,
}

/// How a node reaches its peers. Implemented over HTTP by the node binary and
/// by in-memory stubs in tests.
pub trait PeerTransport: Send + Sync {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<PeerChain, TransportError>> + Send;
}

/// Ask every peer for its chain, one at a time. Peers that cannot be reached
/// or answer with garbage are logged and left out.
pub async fn gather_candidates<T, I, P>(transport: &T, peers: I) -> Vec<Candidate>
where
    T: PeerTransport,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut candidates = Vec::new();
    for peer in peers {
        let peer = peer.as_ref();
        match transport.fetch_chain(peer).await {
            Ok(reported) => {
                debug!(peer, length = reported.length, "peer reported chain");
                candidates.push(Candidate {
                    peer: peer.to_string(),
                    reported,
                });
            }
            Err(err) => warn!(peer, %err, "skipping peer"),
        }
    }
    candidates
}

/// Pick the longest candidate that beats `local_len` and validates. A
/// candidate must be strictly longer than the best seen so far, so equal
/// lengths never displace the local chain or an earlier peer.
pub fn select_longest(
    local_len: usize,
    candidates: Vec<Candidate>,
    difficulty: usize,
) -> Option<Candidate> {
    let mut best_len = local_len;
    let mut best = None;
    for candidate in candidates {
        let reported = &candidate.reported;
        if reported.length <= best_len {
            continue;
        }
        if reported.length != reported.chain.len() {
            warn!(
                peer = %candidate.peer,
                reported = reported.length,
                actual = reported.chain.len(),
                "peer misreported its chain length"
            );
            continue;
        }
        if let Err(err) = validate_chain(&reported.chain, difficulty) {
            warn!(peer = %candidate.peer, %err, "peer chain failed validation");
            continue;
        }
        best_len = reported.length;
        best = Some(candidate);
    }
    best
}

impl Blockchain {
    /// Replace the local chain with the longest valid candidate, if any beats
    /// it. Returns whether the chain changed.
    pub fn adopt_longest(&mut self, candidates: Vec<Candidate>) -> bool {
        match select_longest(self.len(), candidates, self.difficulty()) {
            Some(winner) => {
                info!(peer = %winner.peer, length = winner.reported.length, "adopting peer chain");
                self.replace_chain(winner.reported.chain)
            }
            None => false,
        }
    }
}

/// Resolve against every known peer for a ledger owned by the caller.
pub async fn resolve_chain<T: PeerTransport>(ledger: &mut Blockchain, transport: &T) -> bool {
    let peers = ledger.peers().to_vec();
    let candidates = gather_candidates(transport, peers).await;
    ledger.adopt_longest(candidates)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::MiningReward;

    const DIFFICULTY: usize = 2;

    #[derive(Default)]
    struct StubTransport {
        chains: HashMap<String, PeerChain>,
    }

    impl StubTransport {
        fn with(mut self, peer: &str, chain: PeerChain) -> Self {
            self.chains.insert(peer.to_string(), chain);
            self
        }
    }

    impl PeerTransport for StubTransport {
        fn fetch_chain(
            &self,
            peer: &str,
        ) -> impl Future<Output = Result<PeerChain, TransportError>> + Send {
            let result = self
                .chains
                .get(peer)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                });
            async move { result }
        }
    }

    fn ledger_with_blocks(total: usize) -> Blockchain {
        let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
        let reward = MiningReward::new("node", "miner", 1);
        while ledger.len() < total {
            ledger.mine_block(&reward).unwrap();
        }
        ledger
    }

    fn peer_chain(total: usize) -> PeerChain {
        PeerChain::new(ledger_with_blocks(total).chain().to_vec())
    }

    #[tokio::test]
    async fn equal_length_peers_do_not_replace_local_chain() {
        let mut local = ledger_with_blocks(5);
        local.add_peer("http://a:5001").unwrap();
        local.add_peer("http://b:5002").unwrap();
        let before = local.chain().to_vec();

        let transport = StubTransport::default()
            .with("a:5001", peer_chain(5))
            .with("b:5002", peer_chain(5));

        assert!(!resolve_chain(&mut local, &transport).await);
        assert_eq!(local.chain(), &before[..]);
    }

    #[tokio::test]
    async fn longer_valid_peer_chain_is_adopted() {
        let mut local = ledger_with_blocks(5);
        local.add_peer("http://a:5001").unwrap();
        let longer = peer_chain(6);

        let transport = StubTransport::default().with("a:5001", longer.clone());

        assert!(resolve_chain(&mut local, &transport).await);
        assert_eq!(local.len(), 6);
        assert_eq!(local.chain(), &longer.chain[..]);
    }

    #[tokio::test]
    async fn longest_of_several_peers_wins() {
        let mut local = ledger_with_blocks(2);
        for peer in ["a:1", "b:2", "c:3"] {
            local.add_peer(peer).unwrap();
        }
        let longest = peer_chain(5);
        let transport = StubTransport::default()
            .with("a:1", peer_chain(3))
            .with("b:2", longest.clone())
            .with("c:3", peer_chain(4));

        assert!(resolve_chain(&mut local, &transport).await);
        assert_eq!(local.chain(), &longest.chain[..]);
    }

    #[tokio::test]
    async fn invalid_longer_chain_is_skipped() {
        let mut local = ledger_with_blocks(2);
        local.add_peer("a:1").unwrap();
        local.add_peer("b:2").unwrap();

        let mut forged = peer_chain(6);
        forged.chain[4].previous_hash = "bogus".to_string();
        let honest = peer_chain(4);
        let transport = StubTransport::default()
            .with("a:1", forged)
            .with("b:2", honest.clone());

        assert!(resolve_chain(&mut local, &transport).await);
        assert_eq!(local.chain(), &honest.chain[..]);
    }

    #[tokio::test]
    async fn unreachable_peers_are_skipped() {
        let mut local = ledger_with_blocks(2);
        local.add_peer("down:1").unwrap();
        local.add_peer("up:2").unwrap();
        let transport = StubTransport::default().with("up:2", peer_chain(3));

        let candidates = gather_candidates(&transport, local.peers().to_vec()).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].peer, "up:2");
        assert!(local.adopt_longest(candidates));
        assert_eq!(local.len(), 3);
    }

    #[tokio::test]
    async fn no_peers_keeps_chain() {
        let mut local = ledger_with_blocks(3);
        assert!(!resolve_chain(&mut local, &StubTransport::default()).await);
        assert_eq!(local.len(), 3);
    }

    #[test]
    fn misreported_length_is_ignored() {
        let mut reported = peer_chain(3);
        reported.length = 10;
        let candidates = vec![Candidate {
            peer: "liar:1".to_string(),
            reported,
        }];
        assert!(select_longest(2, candidates, DIFFICULTY).is_none());
    }

    #[test]
    fn first_of_equal_longest_candidates_is_kept() {
        let first = peer_chain(4);
        let second = peer_chain(4);
        let candidates = vec![
            Candidate {
                peer: "a:1".to_string(),
                reported: first.clone(),
            },
            Candidate {
                peer: "b:2".to_string(),
                reported: second,
            },
        ];
        let winner = select_longest(2, candidates, DIFFICULTY).unwrap();
        assert_eq!(winner.peer, "a:1");
        assert_eq!(winner.reported, first);
    }
}
