use std::fs;

use minichain_core::{Blockchain, MiningReward};
use minichain_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub const DIFFICULTY: usize = 2;

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// A ledger with `total` blocks including genesis.
pub fn mined_ledger(total: usize) -> Blockchain {
    let mut ledger = Blockchain::with_difficulty(DIFFICULTY);
    let reward = MiningReward::new("storage-test", "miner", 1);
    let mut i = 0u64;
    while ledger.len() < total {
        ledger.add_transaction(format!("alice-{i}"), "bob", i);
        ledger.mine_block(&reward).expect("mining");
        i += 1;
    }
    ledger
}
