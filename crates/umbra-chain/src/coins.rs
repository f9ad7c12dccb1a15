//! UTXO coins view.
//!
//! A cache of unspent outputs keyed by outpoint, with input checking,
//! priority scoring and the invalid-outpoint blacklist. Full script
//! execution belongs to the external verification engine; the view exposes
//! the hook and enforces input presence itself.

use crate::{ChainError, ChainResult};
use dashmap::{DashMap, DashSet};
use umbra_types::{Amount, OutPoint, Transaction, COIN};

/// Mandatory script verification flags for block inclusion.
pub const MANDATORY_SCRIPT_VERIFY_FLAGS: u32 = 0x1;

/// Priority threshold for fee-free admission: one coin held one day at
/// minimal transaction size.
pub fn allow_free(priority: f64) -> bool {
    priority > COIN as f64 * 144.0 / 250.0
}

/// One unspent output.
#[derive(Debug, Clone, Copy)]
pub struct Coin {
    /// Output value.
    pub value: Amount,
    /// Height the output was created at.
    pub height: u32,
    /// Whether the output came from a coinstake.
    pub coinstake: bool,
}

type ScriptVerifier = dyn Fn(&Transaction, u32) -> bool + Send + Sync;

/// View over unspent coins.
///
/// A fresh view is derived from the coins tip for each template build; the
/// selector mutates it only through [`CoinsView::update_coins`].
pub struct CoinsView {
    coins: DashMap<OutPoint, Coin>,
    verifier: Option<Box<ScriptVerifier>>,
}

impl Default for CoinsView {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinsView {
    /// An empty view.
    pub fn new() -> Self {
        Self {
            coins: DashMap::new(),
            verifier: None,
        }
    }

    /// Install the external script verification engine.
    pub fn set_script_verifier(
        &mut self,
        verifier: impl Fn(&Transaction, u32) -> bool + Send + Sync + 'static,
    ) {
        self.verifier = Some(Box::new(verifier));
    }

    /// Seed an unspent output.
    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Look up an unspent output.
    pub fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).map(|c| *c)
    }

    /// Whether every input of `tx` is present in the view. Coinbase
    /// transactions trivially pass.
    pub fn have_inputs(&self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return true;
        }
        tx.vin
            .iter()
            .all(|input| self.coins.contains_key(&input.prevout))
    }

    /// Re-verify inputs under the given flags: presence plus the external
    /// script engine.
    pub fn check_inputs(&self, tx: &Transaction, flags: u32) -> ChainResult<()> {
        if !self.have_inputs(tx) {
            return Err(ChainError::MissingInputs(tx.txid()));
        }
        if let Some(verifier) = &self.verifier {
            if !verifier(tx, flags) {
                return Err(ChainError::ScriptVerifyFailed(tx.txid()));
            }
        }
        Ok(())
    }

    /// Apply a transaction: consume its inputs, create its outputs.
    pub fn update_coins(&self, tx: &Transaction, height: u32) {
        for input in &tx.vin {
            self.coins.remove(&input.prevout);
        }
        let txid = tx.txid();
        for (n, output) in tx.vout.iter().enumerate() {
            if output.is_empty() {
                continue;
            }
            self.coins.insert(
                OutPoint::new(txid, n as u32),
                Coin {
                    value: output.value,
                    height,
                    coinstake: tx.is_coinstake(),
                },
            );
        }
    }

    /// Age-weighted priority: `sum(value_in × confirmations) /
    /// modified_size` at the given chain height.
    pub fn priority(&self, tx: &Transaction, height: u32) -> f64 {
        let mut weighted: f64 = 0.0;
        for input in &tx.vin {
            if let Some(coin) = self.coin(&input.prevout) {
                let confirmations = height.saturating_sub(coin.height) + 1;
                weighted += coin.value as f64 * confirmations as f64;
            }
        }
        weighted / modified_size(tx) as f64
    }
}

/// Serialized size discounted by the fixed per-input overhead, floored at
/// one byte.
fn modified_size(tx: &Transaction) -> usize {
    tx.serialized_size()
        .saturating_sub(tx.vin.len() * 148)
        .max(1)
}

/// Outpoints banned from inclusion regardless of mempool state.
#[derive(Default)]
pub struct InvalidOutpoints {
    outpoints: DashSet<OutPoint>,
}

impl InvalidOutpoints {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an outpoint.
    pub fn insert(&self, outpoint: OutPoint) {
        self.outpoints.insert(outpoint);
    }

    /// Whether the outpoint is banned.
    pub fn contains_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.outpoints.contains(outpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_types::{blake2b_256, KeyImage, Script, TxIn, TxOut, TxType};

    fn spending_tx(prevout: OutPoint) -> Transaction {
        Transaction {
            tx_type: TxType::Standard,
            vin: vec![TxIn::new(prevout, KeyImage(blake2b_256(b"ki")))],
            vout: vec![TxOut::new(40, Script::pay_to_pubkey(&[2u8; 33]))],
            fee: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_have_and_check_inputs() {
        let view = CoinsView::new();
        let prevout = OutPoint::new(blake2b_256(b"funding"), 0);
        let tx = spending_tx(prevout);

        assert!(!view.have_inputs(&tx));
        assert!(matches!(
            view.check_inputs(&tx, MANDATORY_SCRIPT_VERIFY_FLAGS),
            Err(ChainError::MissingInputs(_))
        ));

        view.add_coin(
            prevout,
            Coin {
                value: 50,
                height: 1,
                coinstake: false,
            },
        );
        assert!(view.have_inputs(&tx));
        assert!(view.check_inputs(&tx, MANDATORY_SCRIPT_VERIFY_FLAGS).is_ok());
    }

    #[test]
    fn test_script_verifier_hook() {
        let mut view = CoinsView::new();
        let prevout = OutPoint::new(blake2b_256(b"funding"), 0);
        view.add_coin(
            prevout,
            Coin {
                value: 50,
                height: 1,
                coinstake: false,
            },
        );
        let bad_txid = spending_tx(prevout).txid();
        view.set_script_verifier(move |tx, _flags| tx.txid() != bad_txid);

        let tx = spending_tx(prevout);
        assert!(matches!(
            view.check_inputs(&tx, MANDATORY_SCRIPT_VERIFY_FLAGS),
            Err(ChainError::ScriptVerifyFailed(_))
        ));
    }

    #[test]
    fn test_update_coins_spends_and_creates() {
        let view = CoinsView::new();
        let prevout = OutPoint::new(blake2b_256(b"funding"), 0);
        view.add_coin(
            prevout,
            Coin {
                value: 50,
                height: 1,
                coinstake: false,
            },
        );

        let tx = spending_tx(prevout);
        view.update_coins(&tx, 10);

        assert!(view.coin(&prevout).is_none());
        let created = OutPoint::new(tx.txid(), 0);
        let coin = view.coin(&created).unwrap();
        assert_eq!(coin.value, 40);
        assert_eq!(coin.height, 10);
    }

    #[test]
    fn test_priority_grows_with_age() {
        let view = CoinsView::new();
        let prevout = OutPoint::new(blake2b_256(b"funding"), 0);
        view.add_coin(
            prevout,
            Coin {
                value: 10 * COIN,
                height: 0,
                coinstake: false,
            },
        );
        let tx = spending_tx(prevout);
        let young = view.priority(&tx, 1);
        let old = view.priority(&tx, 1000);
        assert!(old > young);
        assert!(young > 0.0);
    }

    #[test]
    fn test_allow_free_threshold() {
        assert!(!allow_free(0.0));
        assert!(allow_free(COIN as f64 * 144.0 / 250.0 + 1.0));
    }

    #[test]
    fn test_invalid_outpoints() {
        let invalid = InvalidOutpoints::new();
        let outpoint = OutPoint::new(blake2b_256(b"bad"), 3);
        assert!(!invalid.contains_outpoint(&outpoint));
        invalid.insert(outpoint);
        assert!(invalid.contains_outpoint(&outpoint));
    }
}
