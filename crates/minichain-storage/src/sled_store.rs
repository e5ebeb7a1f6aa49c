use anyhow::{Context, Result};
use minichain_core::{chain::ChainStore, Block};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled db at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS).context("opening blocks tree")?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drop every stored block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  fn set_tip(&self, block: &Block) -> Result<()> {
    self.db.insert(KEY_TIP_HEIGHT, block.index.to_be_bytes().to_vec())?;
    self.db.insert(KEY_TIP_HASH, block.hash().as_bytes())?;
    Ok(())
  }
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).context("decoding stored block")
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index.to_be_bytes();
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(key, bytes)?;
    self.set_tip(block)?;
    self.db.flush()?;
    debug!(index = block.index, "stored block");
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|ivec| decode_block(&ivec))
      .transpose()
  }

  /// Stale keys are removed in the same batch that writes the new blocks, so
  /// the tree holds either the old chain or the new one, never a mix.
  fn put_chain(&self, chain: &[Block]) -> Result<()> {
    let mut batch = Batch::default();
    for key in self.blocks.iter().keys() {
      batch.remove(key?);
    }
    // A later insert of the same key overrides the removal above.
    for block in chain {
      batch.insert(block.index.to_be_bytes().to_vec(), bincode::serialize(block)?);
    }
    self.blocks.apply_batch(batch)?;
    match chain.last() {
      Some(tip) => self.set_tip(tip)?,
      None => {
        self.db.remove(KEY_TIP_HEIGHT)?;
        self.db.remove(KEY_TIP_HASH)?;
      }
    }
    self.db.flush()?;
    info!(length = chain.len(), "stored chain snapshot");
    Ok(())
  }

  /// Blocks come back in index order since keys are big-endian.
  fn load_chain(&self) -> Result<Vec<Block>> {
    self
      .blocks
      .iter()
      .values()
      .map(|value| decode_block(&value?))
      .collect()
  }

  fn tip_height(&self) -> Result<u64> {
    match self.db.get(KEY_TIP_HEIGHT)? {
      Some(v) => {
        let arr: [u8; 8] = v[..].try_into().context("corrupt tip height")?;
        Ok(u64::from_be_bytes(arr))
      }
      None => Ok(0),
    }
  }

  fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("corrupt tip hash"))
      .transpose()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
