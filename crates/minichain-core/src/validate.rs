use crate::{error::ChainValidationError, hash_block, pow, Block};

/// Walk the whole chain from the second block, checking the hash link and then
/// the proof of every block against its predecessor. Stops at the first
/// failure; succeeds only once every block has been checked.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainValidationError> {
    let Some(first) = chain.first() else {
        return Err(ChainValidationError::Empty);
    };
    let mut previous = first;
    for (index, block) in chain.iter().enumerate().skip(1) {
        if block.previous_hash != hash_block(previous) {
            return Err(ChainValidationError::BrokenLink { index });
        }
        if !pow::verify(previous.proof, block.proof, difficulty) {
            return Err(ChainValidationError::InvalidProof { index });
        }
        previous = block;
    }
    Ok(())
}

pub fn is_chain_valid(chain: &[Block], difficulty: usize) -> bool {
    validate_chain(chain, difficulty).is_ok()
}
