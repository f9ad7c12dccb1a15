//! Transaction pool implementation.

use crate::{MempoolError, MempoolResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use umbra_types::{Amount, Hash256, Transaction};

/// Stored transaction in the mempool.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Arrival time in seconds.
    pub time_added: i64,
    /// External priority bump applied on top of the computed priority.
    pub priority_delta: f64,
    /// External fee bump applied on top of the declared fee.
    pub fee_delta: Amount,
}

/// Transaction mempool.
///
/// The miner treats a [`Mempool::snapshot`] as read-only for the duration
/// of one template build and watches [`Mempool::transactions_updated`] to
/// notice churn while hashing.
#[derive(Default)]
pub struct Mempool {
    entries: DashMap<Hash256, PoolEntry>,
    updates: AtomicU64,
}

impl Mempool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction.
    pub fn add(&self, tx: Transaction, time_added: i64) -> MempoolResult<Hash256> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid.to_string()));
        }
        self.entries.insert(
            txid,
            PoolEntry {
                tx: Arc::new(tx),
                time_added,
                priority_delta: 0.0,
                fee_delta: 0,
            },
        );
        self.updates.fetch_add(1, Ordering::Relaxed);
        debug!(count = self.entries.len(), %txid, "Transaction added to mempool");
        Ok(txid)
    }

    /// Remove a transaction.
    pub fn remove(&self, txid: &Hash256) -> MempoolResult<PoolEntry> {
        let (_, entry) = self
            .entries
            .remove(txid)
            .ok_or_else(|| MempoolError::NotFound(txid.to_string()))?;
        self.updates.fetch_add(1, Ordering::Relaxed);
        debug!(count = self.entries.len(), %txid, "Transaction removed from mempool");
        Ok(entry)
    }

    /// Look up an entry.
    pub fn get(&self, txid: &Hash256) -> Option<PoolEntry> {
        self.entries.get(txid).map(|e| e.clone())
    }

    /// Whether a transaction is pooled.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record external priority/fee bumps for a pooled transaction.
    pub fn prioritise(&self, txid: Hash256, priority_delta: f64, fee_delta: Amount) {
        if let Some(mut entry) = self.entries.get_mut(&txid) {
            entry.priority_delta += priority_delta;
            entry.fee_delta += fee_delta;
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Apply the recorded deltas for a transaction, verbatim.
    pub fn apply_deltas(&self, txid: &Hash256, priority: &mut f64, fee: &mut Amount) {
        if let Some(entry) = self.entries.get(txid) {
            *priority += entry.priority_delta;
            *fee += entry.fee_delta;
        }
    }

    /// Read-only view of the pool for one template build.
    pub fn snapshot(&self) -> Vec<(Hash256, PoolEntry)> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Monotonic counter bumped by every pool mutation.
    pub fn transactions_updated(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_types::{blake2b_256, KeyImage, OutPoint, Script, TxIn, TxOut, TxType};

    fn test_tx(seed: u8) -> Transaction {
        Transaction {
            tx_type: TxType::Standard,
            vin: vec![TxIn::new(
                OutPoint::new(blake2b_256(&[seed]), 0),
                KeyImage(blake2b_256(&[seed, 1])),
            )],
            vout: vec![TxOut::new(100, Script::pay_to_pubkey(&[seed; 33]))],
            fee: seed as Amount * 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_get() {
        let pool = Mempool::new();
        let txid = pool.add(test_tx(1), 1000).unwrap();

        assert!(pool.contains(&txid));
        assert_eq!(pool.get(&txid).unwrap().tx.fee, 100);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let pool = Mempool::new();
        pool.add(test_tx(1), 1000).unwrap();
        assert!(matches!(
            pool.add(test_tx(1), 1001),
            Err(MempoolError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_remove() {
        let pool = Mempool::new();
        let txid = pool.add(test_tx(1), 1000).unwrap();
        pool.remove(&txid).unwrap();
        assert!(!pool.contains(&txid));
        assert!(matches!(
            pool.remove(&txid),
            Err(MempoolError::NotFound(_))
        ));
    }

    #[test]
    fn test_apply_deltas() {
        let pool = Mempool::new();
        let txid = pool.add(test_tx(1), 1000).unwrap();
        pool.prioritise(txid, 1e9, 5000);

        let mut priority = 1.0;
        let mut fee = 100;
        pool.apply_deltas(&txid, &mut priority, &mut fee);
        assert_eq!(priority, 1e9 + 1.0);
        assert_eq!(fee, 5100);
    }

    #[test]
    fn test_update_counter() {
        let pool = Mempool::new();
        let before = pool.transactions_updated();
        let txid = pool.add(test_tx(1), 1000).unwrap();
        assert!(pool.transactions_updated() > before);

        let mid = pool.transactions_updated();
        pool.remove(&txid).unwrap();
        assert!(pool.transactions_updated() > mid);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let pool = Mempool::new();
        pool.add(test_tx(1), 1000).unwrap();
        pool.add(test_tx(2), 1001).unwrap();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Later pool mutations do not disturb the snapshot.
        let txid = snapshot[0].0;
        pool.remove(&txid).unwrap();
        assert_eq!(snapshot.len(), 2);
    }
}
