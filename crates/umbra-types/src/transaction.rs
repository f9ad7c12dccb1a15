//! Transactions.
//!
//! Inputs carry a key image, the per-spent-output tag that must be unique
//! across the chain in the ring-signature model. Outputs carry the encoded
//! amount, a value commitment and the ephemeral transaction keys.

use crate::encode::{write_bytes, write_compact_size, write_i64, write_u32};
use crate::hash::blake2b_256;
use crate::{Amount, Hash256, Script};

/// Key image of a spent output. Globally unique on an honest chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyImage(pub Hash256);

impl KeyImage {
    /// Whether the key image is unset.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl std::fmt::Display for KeyImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to a prior transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutPoint {
    /// Funding transaction id.
    pub hash: Hash256,
    /// Output index.
    pub n: u32,
}

impl OutPoint {
    /// A new outpoint.
    pub fn new(hash: Hash256, n: u32) -> Self {
        Self { hash, n }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            n: u32::MAX,
        }
    }

    /// Whether this is the null outpoint.
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.n == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hash, self.n)
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxIn {
    /// Spent output.
    pub prevout: OutPoint,
    /// Unlocking script.
    pub script_sig: Script,
    /// Key image of the spent output.
    pub key_image: KeyImage,
}

impl TxIn {
    /// Input spending `prevout` with the given key image.
    pub fn new(prevout: OutPoint, key_image: KeyImage) -> Self {
        Self {
            prevout,
            script_sig: Script::new(),
            key_image,
        }
    }

    /// The synthetic coinbase input.
    pub fn null() -> Self {
        Self {
            prevout: OutPoint::null(),
            script_sig: Script::new(),
            key_image: KeyImage::default(),
        }
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxOut {
    /// Output value. Zero together with an empty script marks the
    /// coinstake marker output.
    pub value: Amount,
    /// Locking script.
    pub script_pubkey: Script,
    /// Ephemeral transaction public key.
    pub tx_pub: Vec<u8>,
    /// Ephemeral transaction private key, present on miner outputs only.
    pub tx_priv: Vec<u8>,
    /// Pedersen commitment to the value.
    pub commitment: Vec<u8>,
    /// Value encoded against the shared secret.
    pub encoded_amount: Vec<u8>,
}

impl TxOut {
    /// Output paying `value` to `script_pubkey`.
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
            ..Default::default()
        }
    }

    /// Clear the output to the empty marker state.
    pub fn set_empty(&mut self) {
        self.value = 0;
        self.script_pubkey = Script::new();
        self.commitment.clear();
        self.encoded_amount.clear();
    }

    /// Whether the output is the empty marker.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        write_i64(out, self.value);
        write_bytes(out, self.script_pubkey.as_bytes());
        write_bytes(out, &self.tx_pub);
        write_bytes(out, &self.tx_priv);
        write_bytes(out, &self.commitment);
        write_bytes(out, &self.encoded_amount);
    }
}

/// Transaction kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxType {
    /// Amount revealed in the clear (coinbase-style payouts).
    RevealAmount,
    /// Ordinary hidden-amount transaction.
    #[default]
    Standard,
    /// Block reward transaction.
    Coinbase,
    /// Stake proof transaction.
    Coinstake,
}

impl TxType {
    fn as_u8(self) -> u8 {
        match self {
            TxType::RevealAmount => 0,
            TxType::Standard => 1,
            TxType::Coinbase => 2,
            TxType::Coinstake => 3,
        }
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Kind tag.
    pub tx_type: TxType,
    /// Inputs.
    pub vin: Vec<TxIn>,
    /// Outputs.
    pub vout: Vec<TxOut>,
    /// Declared fee.
    pub fee: Amount,
    /// Height before which the transaction is not final; zero disables.
    pub lock_height: u32,
    /// Aggregate Schnorr signature over the input key images.
    pub key_image_sig: Vec<u8>,
}

impl Transaction {
    /// Content hash identifying the transaction.
    pub fn txid(&self) -> Hash256 {
        blake2b_256(&self.to_bytes())
    }

    /// Whether this is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null() && !self.is_coinstake()
    }

    /// Whether this is a coinstake transaction: real inputs and an empty
    /// first output as marker.
    pub fn is_coinstake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    /// Whether the transaction is final at the given height.
    pub fn is_final_at(&self, height: u32) -> bool {
        self.lock_height == 0 || self.lock_height <= height
    }

    /// Serialized size in bytes under the canonical encoding.
    pub fn serialized_size(&self) -> usize {
        self.to_bytes().len()
    }

    /// Legacy sig-op count over all scripts.
    pub fn legacy_sigop_count(&self) -> u32 {
        let ins: u32 = self.vin.iter().map(|i| i.script_sig.sigop_count()).sum();
        let outs: u32 = self
            .vout
            .iter()
            .map(|o| o.script_pubkey.sigop_count())
            .sum();
        ins + outs
    }

    /// Canonical encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(self.tx_type.as_u8());
        write_u32(&mut out, self.lock_height);
        write_i64(&mut out, self.fee);
        write_compact_size(&mut out, self.vin.len());
        for input in &self.vin {
            out.extend_from_slice(input.prevout.hash.as_bytes());
            write_u32(&mut out, input.prevout.n);
            write_bytes(&mut out, input.script_sig.as_bytes());
            out.extend_from_slice(input.key_image.0.as_bytes());
        }
        write_compact_size(&mut out, self.vout.len());
        for output in &self.vout {
            output.write_to(&mut out);
        }
        write_bytes(&mut out, &self.key_image_sig);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_tx() -> Transaction {
        Transaction {
            tx_type: TxType::Standard,
            vin: vec![TxIn::new(
                OutPoint::new(blake2b_256(b"prev"), 0),
                KeyImage(blake2b_256(b"ki")),
            )],
            vout: vec![TxOut::new(50, Script::pay_to_pubkey(&[2u8; 33]))],
            fee: 100,
            lock_height: 0,
            key_image_sig: Vec::new(),
        }
    }

    #[test]
    fn test_txid_stable() {
        let tx = simple_tx();
        assert_eq!(tx.txid(), tx.txid());
        let mut other = tx.clone();
        other.fee = 200;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn test_coinbase_detection() {
        let mut cb = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::new().push_op(crate::OP_0))],
            ..Default::default()
        };
        cb.tx_type = TxType::Coinbase;
        assert!(cb.is_coinbase());
        assert!(!cb.is_coinstake());
        assert!(!simple_tx().is_coinbase());
    }

    #[test]
    fn test_coinstake_detection() {
        let stake = Transaction {
            tx_type: TxType::Coinstake,
            vin: vec![TxIn::new(
                OutPoint::new(blake2b_256(b"stake"), 1),
                KeyImage(blake2b_256(b"ki2")),
            )],
            vout: vec![
                TxOut::default(), // empty marker
                TxOut::new(1000, Script::pay_to_pubkey(&[3u8; 33])),
            ],
            ..Default::default()
        };
        assert!(stake.is_coinstake());
        assert!(!stake.is_coinbase());
    }

    #[test]
    fn test_finality() {
        let mut tx = simple_tx();
        assert!(tx.is_final_at(1));
        tx.lock_height = 100;
        assert!(!tx.is_final_at(99));
        assert!(tx.is_final_at(100));
    }

    #[test]
    fn test_set_empty() {
        let mut out = TxOut::new(5, Script::pay_to_pubkey(&[2u8; 33]));
        out.commitment = vec![1, 2, 3];
        out.set_empty();
        assert!(out.is_empty());
        assert!(out.commitment.is_empty());
    }

    #[test]
    fn test_size_tracks_content() {
        let small = simple_tx();
        let mut big = simple_tx();
        big.vout.push(TxOut::new(1, Script::pay_to_pubkey(&[4u8; 33])));
        assert!(big.serialized_size() > small.serialized_size());
        assert_eq!(small.serialized_size(), small.to_bytes().len());
    }
}
