use crate::{constants::NONCE_WINDOW, pow};
use rayon::prelude::*;
use tracing::debug;

/// Parallel counterpart of `pow::solve`. Nonces are scanned in consecutive
/// windows and `find_first` keeps the lowest hit in each window, so the result
/// is the same minimal proof the sequential search returns.
pub fn solve_parallel(previous_proof: u64, difficulty: usize) -> u64 {
    let mut start = 1u64;
    loop {
        let end = start.saturating_add(NONCE_WINDOW);
        let found = (start..end)
            .into_par_iter()
            .find_first(|proof| pow::verify(previous_proof, *proof, difficulty));
        if let Some(proof) = found {
            debug!(previous_proof, proof, "found proof");
            return proof;
        }
        // Past this point the squared difference no longer fits and every
        // candidate fails, so wrap like the sequential search does.
        start = if end == u64::MAX { 1 } else { end };
    }
}
