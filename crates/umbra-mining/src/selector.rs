//! Transaction selection for block templates.
//!
//! Pending transactions in the mempool often depend on other pending
//! transactions. Selection ranks candidates by priority or fee rate and
//! keeps such dependents as temporary orphans until every ancestor has
//! been admitted to the template under construction.

use crate::priority::{OrderingMode, TxPriority, TxPriorityQueue};
use crate::MinerState;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use umbra_chain::{allow_free, Chain, CoinsView, InvalidOutpoints, MANDATORY_SCRIPT_VERIFY_FLAGS};
use umbra_mempool::{Mempool, PoolEntry};
use umbra_types::{Amount, FeeRate, Hash256, KeyImage, Transaction, MIN_RELAY_FEE_RATE};

/// Bytes reserved up front for the coinbase and header.
const BLOCK_SIZE_RESERVE: usize = 1000;

/// Sig-ops reserved up front for the coinbase.
const BLOCK_SIGOPS_RESERVE: u32 = 100;

/// Consensus ceiling on sig-ops per block.
pub const MAX_BLOCK_SIGOPS: u32 = 20_000;

/// Size budgets for one selection pass. All already clamped by
/// [`crate::MinerOptions::clamped`].
#[derive(Debug, Clone, Copy)]
pub struct SelectionBudget {
    /// Hard cap on the serialized block size.
    pub max_size: usize,
    /// Bytes filled priority-first regardless of fees.
    pub priority_size: usize,
    /// Floor below which free transactions are still admitted.
    pub min_size: usize,
}

/// One admitted transaction.
#[derive(Debug, Clone)]
pub struct SelectedTx {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Its declared fee.
    pub fee: Amount,
    /// Its legacy sig-op count.
    pub sigops: u32,
}

/// Outcome of a selection pass.
#[derive(Debug, Default)]
pub struct Selection {
    /// Admitted transactions in admission order.
    pub txs: Vec<SelectedTx>,
    /// Sum of admitted fees.
    pub total_fees: Amount,
    /// Running block size including the reserve.
    pub block_size: usize,
    /// Running sig-op count including the reserve.
    pub block_sigops: u32,
}

/// A candidate whose mempool ancestors have not been admitted yet.
struct Orphan {
    item: TxPriority,
    depends_on: HashSet<Hash256>,
}

/// Select transactions from a mempool snapshot for the template being
/// assembled at `height`.
#[allow(clippy::too_many_arguments)]
pub fn select_transactions(
    snapshot: &[(Hash256, PoolEntry)],
    mempool: &Mempool,
    view: &CoinsView,
    chain: &Chain,
    invalid_outpoints: &InvalidOutpoints,
    height: u32,
    budget: &SelectionBudget,
    print_priority: bool,
    state: &MinerState,
) -> Selection {
    let chain_height = height.saturating_sub(1);
    let pooled: HashSet<Hash256> = snapshot.iter().map(|(txid, _)| *txid).collect();

    // Orphan arena: orphans live here, mapDependers holds indices into it.
    let mut orphans: Vec<Orphan> = Vec::new();
    let mut dependers: HashMap<Hash256, Vec<usize>> = HashMap::new();

    let mut initial: Vec<TxPriority> = Vec::with_capacity(snapshot.len());

    for (txid, entry) in snapshot {
        let tx = &entry.tx;
        if tx.is_coinbase() || tx.is_coinstake() || !tx.is_final_at(height) {
            continue;
        }

        // Key images must be fresh on-chain and inputs off the blacklist.
        let mut key_image_ok = true;
        for input in &tx.vin {
            if chain.is_spent_key_image(&input.key_image) {
                key_image_ok = false;
                break;
            }
            if invalid_outpoints.contains_outpoint(&input.prevout) {
                info!(outpoint = %input.prevout, %txid, "found invalid input in tx");
                key_image_ok = false;
                break;
            }
        }
        if !key_image_ok {
            continue;
        }

        let mut priority = view.priority(tx, chain_height);
        let mut fee = tx.fee;
        mempool.apply_deltas(txid, &mut priority, &mut fee);
        let fee_rate = FeeRate::from_fee(fee, tx.serialized_size());

        let item = TxPriority {
            priority,
            fee_rate,
            tx: Arc::clone(tx),
        };

        if !view.have_inputs(tx) {
            // Keep the candidate as an orphan if every missing ancestor is
            // itself pending; otherwise it cannot be completed this build.
            let missing: HashSet<Hash256> = tx
                .vin
                .iter()
                .filter(|input| view.coin(&input.prevout).is_none())
                .map(|input| input.prevout.hash)
                .collect();
            if !missing.iter().all(|ancestor| pooled.contains(ancestor)) {
                continue;
            }
            let orphan_index = orphans.len();
            for ancestor in &missing {
                dependers.entry(*ancestor).or_default().push(orphan_index);
            }
            orphans.push(Orphan {
                item,
                depends_on: missing,
            });
            continue;
        }

        initial.push(item);
    }

    debug!(
        candidates = initial.len(),
        orphans = orphans.len(),
        "Selecting transactions from mempool"
    );

    let start_mode = if budget.priority_size == 0 {
        OrderingMode::Fee
    } else {
        OrderingMode::Priority
    };
    let mut queue = TxPriorityQueue::new(start_mode);
    for item in initial {
        queue.push(item);
    }

    let mut selection = Selection {
        block_size: BLOCK_SIZE_RESERVE,
        block_sigops: BLOCK_SIGOPS_RESERVE,
        ..Default::default()
    };
    let mut admitted_key_images: HashSet<KeyImage> = HashSet::new();

    while let Some(item) = queue.pop() {
        let tx = &item.tx;
        let tx_size = tx.serialized_size();

        if selection.block_size + tx_size >= budget.max_size {
            continue;
        }

        // Skip free transactions once past the minimum block size.
        if queue.mode() == OrderingMode::Fee
            && item.fee_rate < MIN_RELAY_FEE_RATE
            && selection.block_size + tx_size >= budget.min_size
        {
            continue;
        }

        // Prioritise by fee once past the priority area or out of
        // high-priority candidates. The popped candidate stays in play.
        if queue.mode() == OrderingMode::Priority
            && (selection.block_size + tx_size >= budget.priority_size
                || !allow_free(item.priority))
        {
            queue.rebuild(OrderingMode::Fee);
        }

        let sigops = tx.legacy_sigop_count();
        if selection.block_sigops + sigops >= MAX_BLOCK_SIGOPS {
            continue;
        }

        // Pairwise key-image uniqueness inside this build, independent of
        // the on-chain check.
        if has_duplicate_key_image(tx, &admitted_key_images) {
            continue;
        }

        if view
            .check_inputs(tx, MANDATORY_SCRIPT_VERIFY_FLAGS)
            .is_err()
        {
            continue;
        }

        view.update_coins(tx, height);

        let txid = tx.txid();
        for input in &tx.vin {
            admitted_key_images.insert(input.key_image);
        }
        selection.block_size += tx_size;
        selection.block_sigops += sigops;
        selection.total_fees += tx.fee;
        selection.txs.push(SelectedTx {
            tx: Arc::clone(tx),
            fee: tx.fee,
            sigops,
        });

        if print_priority {
            info!(priority = item.priority, fee_rate = %item.fee_rate, %txid, "selected");
        }

        // Wake orphans waiting on this transaction.
        if let Some(waiters) = dependers.remove(&txid) {
            for orphan_index in waiters {
                let orphan = &mut orphans[orphan_index];
                if orphan.depends_on.is_empty() {
                    continue;
                }
                orphan.depends_on.remove(&txid);
                if orphan.depends_on.is_empty() {
                    queue.push(orphan.item.clone());
                }
            }
        }
    }

    state.record_selection(selection.txs.len() as u64, selection.block_size as u64);
    selection
}

fn has_duplicate_key_image(tx: &Transaction, admitted: &HashSet<KeyImage>) -> bool {
    let mut seen: HashSet<KeyImage> = HashSet::new();
    for input in &tx.vin {
        if admitted.contains(&input.key_image) || !seen.insert(input.key_image) {
            return true;
        }
    }
    false
}
