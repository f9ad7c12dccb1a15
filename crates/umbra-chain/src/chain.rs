//! In-memory chain view.
//!
//! Holds the active block index, block bodies, the best-block hash under
//! its own lock, and the on-chain spent-key-image set. Validation and
//! chain reorganization are the chain processor's concern; this view only
//! appends what the processor accepted.

use crate::{ChainError, ChainResult, NetworkParams};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;
use umbra_types::{Block, BlockHeader, Hash256, KeyImage};

/// Index entry for one connected block.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    /// Block hash.
    pub hash: Hash256,
    /// Chain height.
    pub height: u32,
    /// Block time.
    pub time: u32,
    /// Header version.
    pub version: i32,
}

impl BlockIndex {
    /// Whether the indexed block is a PoA block.
    pub fn is_poa(&self) -> bool {
        self.version == umbra_types::POA_BLOCK_VERSION
    }
}

/// The active chain.
pub struct Chain {
    params: NetworkParams,
    /// Index entries by height.
    indices: RwLock<Vec<Arc<BlockIndex>>>,
    /// Block bodies by hash.
    blocks: DashMap<Hash256, Block>,
    /// Best block hash, under its own lock. Never held across the index
    /// lock.
    best_block: Mutex<Hash256>,
    /// Key images spent by connected blocks, with the spending txid.
    spent_key_images: DashMap<KeyImage, Hash256>,
}

impl Chain {
    /// An empty chain for the given network.
    pub fn new(params: NetworkParams) -> Self {
        Self {
            params,
            indices: RwLock::new(Vec::new()),
            blocks: DashMap::new(),
            best_block: Mutex::new(Hash256::ZERO),
            spent_key_images: DashMap::new(),
        }
    }

    /// Network parameters.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// The current tip, if any block is connected.
    pub fn tip(&self) -> Option<Arc<BlockIndex>> {
        self.indices.read().last().cloned()
    }

    /// Height of the tip.
    pub fn height(&self) -> Option<u32> {
        self.tip().map(|index| index.height)
    }

    /// Index entry at a height.
    pub fn index_at(&self, height: u32) -> Option<Arc<BlockIndex>> {
        self.indices.read().get(height as usize).cloned()
    }

    /// Block hash at a height.
    pub fn block_hash_at(&self, height: u32) -> Option<Hash256> {
        self.index_at(height).map(|index| index.hash)
    }

    /// Load the block body for an index entry.
    pub fn read_block(&self, index: &BlockIndex) -> ChainResult<Block> {
        self.blocks
            .get(&index.hash)
            .map(|entry| entry.clone())
            .ok_or(ChainError::ReadBlockFailed(index.hash))
    }

    /// Median time over the last eleven blocks ending at `index`.
    pub fn median_time_past(&self, index: &BlockIndex) -> u32 {
        let indices = self.indices.read();
        let end = index.height as usize;
        let start = end.saturating_sub(10);
        let mut times: Vec<u32> = indices[start..=end.min(indices.len() - 1)]
            .iter()
            .map(|i| i.time)
            .collect();
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// The best block hash, under the best-block lock.
    pub fn best_block_hash(&self) -> Hash256 {
        *self.best_block.lock()
    }

    /// Whether a key image is already spent on-chain.
    pub fn is_spent_key_image(&self, key_image: &KeyImage) -> bool {
        self.spent_key_images.contains_key(key_image)
    }

    /// Next compact target. Retargeting is delegated to the external
    /// consensus engine; until then every block carries the base target.
    pub fn next_work_required(&self, _prev: &BlockIndex, _header: &BlockHeader) -> u32 {
        self.params.genesis_bits
    }

    /// Append a block the chain processor accepted.
    pub fn connect_block(&self, block: Block) -> ChainResult<Arc<BlockIndex>> {
        let hash = block.hash();
        let height = self.height().map_or(0, |h| h + 1);
        let index = Arc::new(BlockIndex {
            hash,
            height,
            time: block.header.time,
            version: block.header.version,
        });

        for tx in &block.vtx {
            if tx.is_coinbase() {
                continue;
            }
            for input in tx.vin.iter().filter(|i| !i.key_image.is_zero()) {
                self.spent_key_images.insert(input.key_image, tx.txid());
            }
        }

        self.blocks.insert(hash, block);
        self.indices.write().push(Arc::clone(&index));
        *self.best_block.lock() = hash;

        debug!(height, %hash, "Block connected");
        Ok(index)
    }

    /// Drop a stored block body, leaving the index in place. Test hook for
    /// exercising read failures.
    pub fn evict_block_body(&self, hash: &Hash256) {
        self.blocks.remove(hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_types::{Script, Transaction, TxIn, TxOut, TxType};

    fn block_with_time(prev: Hash256, time: u32) -> Block {
        let coinbase = Transaction {
            tx_type: TxType::Coinbase,
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::pay_to_pubkey(&[2u8; 33]))],
            ..Default::default()
        };
        Block {
            header: BlockHeader {
                hash_prev_block: prev,
                time,
                ..Default::default()
            },
            vtx: vec![coinbase],
            ..Default::default()
        }
    }

    #[test]
    fn test_connect_and_lookup() {
        let chain = Chain::new(NetworkParams::regtest());
        assert!(chain.tip().is_none());

        let genesis = block_with_time(Hash256::ZERO, 1000);
        let genesis_hash = genesis.hash();
        chain.connect_block(genesis).unwrap();

        let tip = chain.tip().unwrap();
        assert_eq!(tip.height, 0);
        assert_eq!(tip.hash, genesis_hash);
        assert_eq!(chain.best_block_hash(), genesis_hash);
        assert_eq!(chain.block_hash_at(0), Some(genesis_hash));
    }

    #[test]
    fn test_read_block_failure_after_eviction() {
        let chain = Chain::new(NetworkParams::regtest());
        let block = block_with_time(Hash256::ZERO, 1000);
        let index = chain.connect_block(block).unwrap();

        assert!(chain.read_block(&index).is_ok());
        chain.evict_block_body(&index.hash);
        assert!(matches!(
            chain.read_block(&index),
            Err(ChainError::ReadBlockFailed(_))
        ));
    }

    #[test]
    fn test_median_time_past() {
        let chain = Chain::new(NetworkParams::regtest());
        let mut prev = Hash256::ZERO;
        for time in [100u32, 200, 300, 400, 500] {
            let block = block_with_time(prev, time);
            prev = block.hash();
            chain.connect_block(block).unwrap();
        }
        let tip = chain.tip().unwrap();
        assert_eq!(chain.median_time_past(&tip), 300);
    }

    #[test]
    fn test_spent_key_images_recorded() {
        let chain = Chain::new(NetworkParams::regtest());
        let mut block = block_with_time(Hash256::ZERO, 1000);
        let key_image = KeyImage(umbra_types::blake2b_256(b"spent"));
        block.vtx.push(Transaction {
            tx_type: TxType::Standard,
            vin: vec![TxIn::new(
                umbra_types::OutPoint::new(umbra_types::blake2b_256(b"src"), 0),
                key_image,
            )],
            vout: vec![TxOut::new(10, Script::pay_to_pubkey(&[5u8; 33]))],
            ..Default::default()
        });

        assert!(!chain.is_spent_key_image(&key_image));
        chain.connect_block(block).unwrap();
        assert!(chain.is_spent_key_image(&key_image));
    }
}
