//! Opt-in on-disk snapshot of a node's chain.
pub mod sled_store;

pub use minichain_core::chain::ChainStore;
pub use sled_store::SledStore;
