//! Miner worker and supervisor tests.
//!
//! Covers block submission (stale, rejected, accepted), the PoW worker
//! end to end on regtest, stake minting and cooperative shutdown.

use crate::harness::{dev_coinstake, TestHarness, TEST_EPOCH};
use std::time::{Duration, Instant};
use umbra_mining::{
    create_new_block_with_key, process_block_found, MinerSupervisor, MiningError,
};
use umbra_types::COIN;

/// Poll `predicate` every 10 ms until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn test_stale_template_is_dropped_on_submit() {
    let harness = TestHarness::new();
    let ctx = harness.context();
    let template = create_new_block_with_key(&ctx, false).unwrap();

    // The tip advances before submission.
    let tip = harness.chain.tip().unwrap();
    let next = harness.make_pow_block(tip.hash, tip.time + 60);
    harness.chain.connect_block(next).unwrap();

    let result = process_block_found(&ctx, &template.block);
    assert!(matches!(result, Err(MiningError::SubmitStale)));

    // The stale block never reached the processor or the peers.
    assert!(harness.processor.processed().is_empty());
    assert!(harness.peers.broadcasts().is_empty());
    assert_eq!(harness.wallet.kept_keys(), 0);
}

#[test]
fn test_submission_processes_and_broadcasts() {
    let harness = TestHarness::new();
    let ctx = harness.context();
    let template = create_new_block_with_key(&ctx, false).unwrap();
    let hash = template.block.hash();

    process_block_found(&ctx, &template.block).unwrap();

    assert_eq!(harness.processor.processed().len(), 1);
    assert_eq!(harness.processor.found(), vec![hash]);
    assert_eq!(harness.peers.broadcasts(), vec![hash]);
    assert_eq!(harness.wallet.kept_keys(), 1);
    assert_eq!(harness.wallet.request_resets(), vec![hash]);

    // Chain activation moved the tip to the submitted block.
    assert_eq!(harness.chain.best_block_hash(), hash);
}

#[test]
fn test_rejected_submission_surfaces_error() {
    let harness = TestHarness::new();
    harness.processor.set_accept(false);
    let ctx = harness.context();
    let template = create_new_block_with_key(&ctx, false).unwrap();

    let result = process_block_found(&ctx, &template.block);
    assert!(matches!(result, Err(MiningError::SubmitRejected(_))));
    assert!(harness.peers.broadcasts().is_empty());
}

// ============================================================================
// Workers
// ============================================================================

#[test]
fn test_pow_worker_mines_a_block_on_regtest() {
    let harness = TestHarness::new();
    let supervisor = MinerSupervisor::new(harness.context());

    supervisor.set_generate(true, 1);
    assert!(supervisor.is_generating());

    let processor = harness.processor.clone();
    assert!(
        wait_until(Duration::from_secs(10), || !processor.processed().is_empty()),
        "worker should mine a block within the window"
    );
    supervisor.set_generate(false, 0);
    assert!(!supervisor.is_generating());

    let mined = &harness.processor.processed()[0];
    assert!(mined.is_proof_of_work());
    assert!(!mined.vtx[0].vout[0].commitment.is_empty());
    // The extra nonce rewrote the coinbase before hashing started.
    assert!(!mined.vtx[0].vin[0].script_sig.is_empty());
    assert_eq!(mined.header.hash_merkle_root, mined.merkle_root());
}

#[test]
fn test_stake_minter_produces_pos_blocks() {
    let harness = TestHarness::new();
    harness.enter_pos_phase();
    harness
        .wallet
        .set_coinstake(dev_coinstake(7, 50 * COIN, COIN), TEST_EPOCH as u32 + 15);

    let supervisor = MinerSupervisor::new(harness.context());
    supervisor.start_stake_minter();

    let processor = harness.processor.clone();
    assert!(
        wait_until(Duration::from_secs(10), || !processor.processed().is_empty()),
        "stake minter should submit a block"
    );
    supervisor.stop_all();

    let staked = &harness.processor.processed()[0];
    assert!(staked.is_proof_of_stake());
    assert!(!staked.block_sig.is_empty());
    assert_eq!(staked.vtx[0].vout[0].value, 0);
}

#[test]
fn test_gated_staker_shuts_down_promptly() {
    let harness = TestHarness::new();
    harness.enter_pos_phase();
    // No mintable coins: the worker parks in the gate loop.
    harness.wallet.set_mintable(false);

    let supervisor = MinerSupervisor::new(harness.context());
    supervisor.start_stake_minter();
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    supervisor.stop_all();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "cancellation must wake the gate sleep"
    );

    // The gate zeroed the search interval while closed.
    use std::sync::atomic::Ordering;
    assert_eq!(
        harness
            .state
            .last_coinstake_search_interval
            .load(Ordering::Relaxed),
        0
    );
    assert!(harness.processor.processed().is_empty());
}

#[test]
fn test_set_generate_replaces_previous_pool() {
    let harness = TestHarness::new();
    harness.enter_pos_phase();
    harness.wallet.set_mintable(false);

    let supervisor = MinerSupervisor::new(harness.context());
    supervisor.set_generate(true, 2);
    assert!(supervisor.is_generating());

    // Reconfiguration replaces the pool without leaking the old one.
    supervisor.set_generate(true, 1);
    assert!(supervisor.is_generating());

    supervisor.set_generate(false, 0);
    assert!(!supervisor.is_generating());
}

#[test]
fn test_poa_worker_builds_and_submits() {
    let harness = TestHarness::new();
    harness.enter_pos_phase();
    harness.extend_pos(101);

    let supervisor = MinerSupervisor::new(harness.context());
    supervisor.start_poa(Some(Duration::from_millis(50)));

    let processor = harness.processor.clone();
    assert!(
        wait_until(Duration::from_secs(10), || !processor.processed().is_empty()),
        "PoA worker should submit an audit block"
    );
    supervisor.stop_all();

    let audit_block = &harness.processor.processed()[0];
    assert!(audit_block.is_poa());
    assert_eq!(
        audit_block.pos_blocks_audited.len(),
        harness.chain.params().max_pos_blocks_audited
    );
}

#[test]
fn test_poa_worker_is_replaced_idempotently() {
    let harness = TestHarness::new();

    let supervisor = MinerSupervisor::new(harness.context());
    supervisor.start_poa(Some(Duration::from_secs(60)));
    supervisor.start_poa(Some(Duration::from_secs(60)));
    supervisor.stop_all();

    // Nothing was due below the PoA start height.
    assert!(harness.processor.processed().is_empty());
}
