//! Blocks, headers and block templates.

use crate::encode::{write_bytes, write_compact_size, write_i32, write_u32};
use crate::hash::blake2b_256;
use crate::merkle::merkle_root;
use crate::{Amount, Hash256, Script, Transaction, POA_BLOCK_VERSION};

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Header version; PoA blocks carry [`POA_BLOCK_VERSION`].
    pub version: i32,
    /// Hash of the previous block.
    pub hash_prev_block: Hash256,
    /// Merkle root over the transaction ids.
    pub hash_merkle_root: Hash256,
    /// Block time.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// PoW nonce.
    pub nonce: u32,
    /// Accumulator checkpoint carried for legacy compatibility.
    pub accumulator_checkpoint: Hash256,
}

impl BlockHeader {
    /// Whether the version marks a PoA block.
    pub fn is_poa_version(&self) -> bool {
        self.version == POA_BLOCK_VERSION
    }

    /// Header content hash.
    pub fn hash(&self) -> Hash256 {
        blake2b_256(&self.to_bytes())
    }

    /// Canonical encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(112);
        write_i32(&mut out, self.version);
        out.extend_from_slice(self.hash_prev_block.as_bytes());
        out.extend_from_slice(self.hash_merkle_root.as_bytes());
        write_u32(&mut out, self.time);
        write_u32(&mut out, self.bits);
        write_u32(&mut out, self.nonce);
        out.extend_from_slice(self.accumulator_checkpoint.as_bytes());
        out
    }
}

/// Summary of an audited PoS block, as recorded inside a PoA block.
///
/// `time == 0` signals that re-verification of the referenced block failed;
/// the entry is still recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoSBlockSummary {
    /// Hash of the audited PoS block.
    pub hash: Hash256,
    /// Height of the audited PoS block.
    pub height: u32,
    /// Block time, or zero on failed re-verification.
    pub time: u32,
}

impl PoSBlockSummary {
    fn leaf_hash(&self) -> Hash256 {
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(self.hash.as_bytes());
        write_u32(&mut out, self.height);
        write_u32(&mut out, self.time);
        blake2b_256(&out)
    }
}

/// A block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// Header.
    pub header: BlockHeader,
    /// Transactions; `vtx[0]` is the coinbase, `vtx[1]` the coinstake in
    /// PoS blocks.
    pub vtx: Vec<Transaction>,
    /// Extra payee script recorded when a payee split occurred.
    pub payee: Script,
    /// Block signature (PoS blocks).
    pub block_sig: Vec<u8>,
    /// Audited PoS block summaries (PoA blocks only).
    pub pos_blocks_audited: Vec<PoSBlockSummary>,
    /// Hash of the previous PoA block, zero for the first.
    pub hash_prev_poa_block: Hash256,
    /// Merkle root over the audit summaries (PoA blocks only).
    pub hash_poa_merkle_root: Hash256,
    /// Composite hash consumed by the PoA acceptance rules.
    pub mined_hash: Hash256,
}

impl Block {
    /// Block hash (the header hash).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Whether this is a PoS block: a coinstake in slot 1.
    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coinstake()
    }

    /// Whether this is a PoA block.
    pub fn is_poa(&self) -> bool {
        self.header.is_poa_version()
    }

    /// Whether this is a plain PoW block.
    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake() && !self.is_poa()
    }

    /// Merkle root over the transaction ids.
    pub fn merkle_root(&self) -> Hash256 {
        let ids: Vec<Hash256> = self.vtx.iter().map(|tx| tx.txid()).collect();
        merkle_root(&ids)
    }

    /// Merkle root over the audit summaries.
    pub fn poa_merkle_root(&self) -> Hash256 {
        let leaves: Vec<Hash256> = self
            .pos_blocks_audited
            .iter()
            .map(|s| s.leaf_hash())
            .collect();
        merkle_root(&leaves)
    }

    /// Composite hash binding the header to the audit payload.
    pub fn compute_mined_hash(&self) -> Hash256 {
        let mut out = self.header.to_bytes();
        out.extend_from_slice(self.hash_prev_poa_block.as_bytes());
        out.extend_from_slice(self.hash_poa_merkle_root.as_bytes());
        blake2b_256(&out)
    }

    /// Serialized size in bytes under the canonical encoding.
    pub fn serialized_size(&self) -> usize {
        let mut out = self.header.to_bytes();
        write_compact_size(&mut out, self.vtx.len());
        let mut size = out.len();
        for tx in &self.vtx {
            size += tx.serialized_size();
        }
        let mut tail = Vec::new();
        write_bytes(&mut tail, self.payee.as_bytes());
        write_bytes(&mut tail, &self.block_sig);
        write_compact_size(&mut tail, self.pos_blocks_audited.len());
        size + tail.len() + self.pos_blocks_audited.len() * 40
    }
}

/// A block plus the per-transaction bookkeeping the miner tracks while
/// assembling it. `tx_fees` and `tx_sigops` are index-aligned with
/// `block.vtx`.
#[derive(Debug, Clone, Default)]
pub struct BlockTemplate {
    /// The assembled block.
    pub block: Block,
    /// Fee per transaction; entry 0 holds the total collected fees.
    pub tx_fees: Vec<Amount>,
    /// Sig-op count per transaction.
    pub tx_sigops: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyImage, OutPoint, TxIn, TxOut, TxType};

    fn coinbase() -> Transaction {
        Transaction {
            tx_type: TxType::Coinbase,
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::pay_to_pubkey(&[2u8; 33]))],
            ..Default::default()
        }
    }

    fn coinstake() -> Transaction {
        Transaction {
            tx_type: TxType::Coinstake,
            vin: vec![TxIn::new(
                OutPoint::new(blake2b_256(b"stake-src"), 0),
                KeyImage(blake2b_256(b"stake-ki")),
            )],
            vout: vec![
                TxOut::default(),
                TxOut::new(1000, Script::pay_to_pubkey(&[3u8; 33])),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_block_kind_detection() {
        let mut block = Block::default();
        block.vtx.push(coinbase());
        assert!(block.is_proof_of_work());

        block.vtx.push(coinstake());
        assert!(block.is_proof_of_stake());
        assert!(!block.is_proof_of_work());

        let mut poa = Block::default();
        poa.header.version = POA_BLOCK_VERSION;
        poa.vtx.push(coinbase());
        assert!(poa.is_poa());
        assert!(!poa.is_proof_of_work());
    }

    #[test]
    fn test_merkle_root_covers_all_txs() {
        let mut block = Block::default();
        block.vtx.push(coinbase());
        let one = block.merkle_root();
        block.vtx.push(coinstake());
        assert_ne!(one, block.merkle_root());
    }

    #[test]
    fn test_header_hash_depends_on_nonce() {
        let mut header = BlockHeader::default();
        let before = header.hash();
        header.nonce += 1;
        assert_ne!(before, header.hash());
    }

    #[test]
    fn test_poa_merkle_root_records_failed_audits() {
        let mut block = Block::default();
        block.pos_blocks_audited.push(PoSBlockSummary {
            hash: blake2b_256(b"pos-1"),
            height: 201,
            time: 1234,
        });
        let ok_root = block.poa_merkle_root();
        block.pos_blocks_audited[0].time = 0;
        assert_ne!(ok_root, block.poa_merkle_root());
    }

    #[test]
    fn test_mined_hash_binds_audit_root() {
        let mut block = Block::default();
        block.header.version = POA_BLOCK_VERSION;
        let before = block.compute_mined_hash();
        block.hash_poa_merkle_root = blake2b_256(b"audits");
        assert_ne!(before, block.compute_mined_hash());
    }
}
