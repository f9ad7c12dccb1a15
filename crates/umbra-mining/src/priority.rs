//! Transaction priority scoring and ordering.
//!
//! The selector ranks candidates through a max-heap whose order depends on
//! the current mode: priority-first while filling the priority area, then
//! fee-first. The heap is rebuilt on a mode transition rather than
//! carrying a mode flag per element comparison site.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use umbra_types::{FeeRate, Transaction};

/// Heap ordering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Priority descending, ties broken by fee rate.
    Priority,
    /// Fee rate descending, ties broken by priority.
    Fee,
}

/// One ranked candidate.
#[derive(Debug, Clone)]
pub struct TxPriority {
    /// Age-weighted priority, including any mempool delta.
    pub priority: f64,
    /// Declared fee rate, including any mempool fee delta.
    pub fee_rate: FeeRate,
    /// The candidate transaction.
    pub tx: Arc<Transaction>,
}

impl TxPriority {
    fn cmp_in(&self, other: &Self, mode: OrderingMode) -> Ordering {
        match mode {
            OrderingMode::Priority => self
                .priority
                .total_cmp(&other.priority)
                .then_with(|| self.fee_rate.cmp(&other.fee_rate)),
            OrderingMode::Fee => self
                .fee_rate
                .cmp(&other.fee_rate)
                .then_with(|| self.priority.total_cmp(&other.priority)),
        }
    }
}

struct Ranked {
    mode: OrderingMode,
    item: TxPriority,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.item.cmp_in(&other.item, self.mode)
    }
}

/// Max-heap over [`TxPriority`] under the current [`OrderingMode`].
pub struct TxPriorityQueue {
    mode: OrderingMode,
    heap: BinaryHeap<Ranked>,
}

impl TxPriorityQueue {
    /// An empty queue in the given mode.
    pub fn new(mode: OrderingMode) -> Self {
        Self {
            mode,
            heap: BinaryHeap::new(),
        }
    }

    /// The current mode.
    pub fn mode(&self) -> OrderingMode {
        self.mode
    }

    /// Insert a candidate.
    pub fn push(&mut self, item: TxPriority) {
        self.heap.push(Ranked {
            mode: self.mode,
            item,
        });
    }

    /// Remove and return the best candidate under the current mode.
    pub fn pop(&mut self) -> Option<TxPriority> {
        self.heap.pop().map(|ranked| ranked.item)
    }

    /// Number of queued candidates.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Switch modes, rebuilding the heap under the new order.
    pub fn rebuild(&mut self, mode: OrderingMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        let drained: Vec<TxPriority> = std::mem::take(&mut self.heap)
            .into_iter()
            .map(|ranked| ranked.item)
            .collect();
        self.heap = drained
            .into_iter()
            .map(|item| Ranked { mode, item })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_types::TxType;

    fn entry(priority: f64, fee: i64) -> TxPriority {
        TxPriority {
            priority,
            fee_rate: FeeRate::per_kb(fee),
            tx: Arc::new(Transaction {
                tx_type: TxType::Standard,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_priority_mode_order() {
        let mut queue = TxPriorityQueue::new(OrderingMode::Priority);
        queue.push(entry(1.0, 50_000));
        queue.push(entry(100.0, 0));
        queue.push(entry(10.0, 10_000));

        assert_eq!(queue.pop().unwrap().priority, 100.0);
        assert_eq!(queue.pop().unwrap().priority, 10.0);
        assert_eq!(queue.pop().unwrap().priority, 1.0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fee_mode_order() {
        let mut queue = TxPriorityQueue::new(OrderingMode::Fee);
        queue.push(entry(100.0, 0));
        queue.push(entry(1.0, 50_000));
        queue.push(entry(10.0, 10_000));

        assert_eq!(queue.pop().unwrap().fee_rate, FeeRate::per_kb(50_000));
        assert_eq!(queue.pop().unwrap().fee_rate, FeeRate::per_kb(10_000));
        assert_eq!(queue.pop().unwrap().fee_rate, FeeRate::per_kb(0));
    }

    #[test]
    fn test_tie_breaks() {
        let mut queue = TxPriorityQueue::new(OrderingMode::Priority);
        queue.push(entry(5.0, 1000));
        queue.push(entry(5.0, 9000));
        assert_eq!(queue.pop().unwrap().fee_rate, FeeRate::per_kb(9000));

        let mut queue = TxPriorityQueue::new(OrderingMode::Fee);
        queue.push(entry(7.0, 1000));
        queue.push(entry(3.0, 1000));
        assert_eq!(queue.pop().unwrap().priority, 7.0);
    }

    #[test]
    fn test_rebuild_switches_order() {
        let mut queue = TxPriorityQueue::new(OrderingMode::Priority);
        queue.push(entry(100.0, 0));
        queue.push(entry(1.0, 50_000));

        queue.rebuild(OrderingMode::Fee);
        assert_eq!(queue.mode(), OrderingMode::Fee);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().fee_rate, FeeRate::per_kb(50_000));
    }

    #[test]
    fn test_nan_priority_is_totally_ordered() {
        let mut queue = TxPriorityQueue::new(OrderingMode::Priority);
        queue.push(entry(f64::NAN, 0));
        queue.push(entry(1.0, 0));
        // total_cmp places NaN above all finite values; pops must not panic
        // and must return both entries.
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }
}
