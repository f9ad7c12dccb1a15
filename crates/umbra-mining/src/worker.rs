//! Miner worker loops.
//!
//! Each worker is one OS thread. It gates on its prerequisites, builds a
//! template, then either nonce-searches (PoW) or submits the already
//! solved stake block (PoS). The PoA worker periodically builds and
//! submits audit blocks. All loops unwind through
//! [`MiningError::Cancelled`] at the token's checkpoints.

use crate::poa::create_new_poa_block_with_key;
use crate::template::{create_new_block_with_key, increment_extra_nonce, update_time};
use crate::{CancelToken, MinerContext, MiningError, MiningResult};
use std::time::Duration;
use tracing::{debug, info, warn};
use umbra_types::{decode_compact, hash_meets_target, Block};

/// Gate re-check cadence.
const GATE_SLEEP: Duration = Duration::from_secs(5);

/// Nonce ceiling; past it the template is rebuilt.
const MAX_NONCE: u32 = 0xffff_0000;

/// Seconds between mintable-coin polls while the last poll succeeded.
const MINTABLE_CHECK_SECS: i64 = 5 * 60;

/// Seconds between mintable-coin polls while the last poll failed.
const MINTABLE_RECHECK_SECS: i64 = 60;

/// Run one miner worker until cancellation or a permanent exit condition.
///
/// This is the worker boundary: every error is caught and logged here, and
/// nothing propagates out of the thread.
pub fn run_miner(ctx: &MinerContext, proof_of_stake: bool, token: &CancelToken) {
    info!(proof_of_stake, "miner worker started");
    match miner_loop(ctx, proof_of_stake, token) {
        Ok(()) => info!("miner worker exiting"),
        Err(MiningError::Cancelled) => info!("miner worker cancelled"),
        Err(err) => warn!(%err, "miner worker terminated"),
    }
}

fn miner_loop(ctx: &MinerContext, mut proof_of_stake: bool, token: &CancelToken) -> MiningResult<()> {
    let params = ctx.chain.params();
    let mut mintable_coins = false;
    let mut last_mintable_check: i64 = 0;
    let mut last_loop_orphan = false;

    loop {
        token.checkpoint()?;

        let tip = match ctx.chain.tip() {
            Some(tip) => tip,
            None => {
                token.sleep(GATE_SLEEP)?;
                continue;
            }
        };
        if tip.height >= params.last_pow_block {
            proof_of_stake = true;
        }

        if proof_of_stake {
            // Limit how often the wallet is asked for mintable coins.
            let now = ctx.clock.adjusted_time();
            if now - last_mintable_check > MINTABLE_CHECK_SECS {
                last_mintable_check = now;
                mintable_coins = ctx.wallet.mintable_coins();
            }

            while ctx.peers.peer_count() == 0
                || ctx.wallet.is_locked()
                || !mintable_coins
                || ctx.wallet.reserve_balance() >= ctx.wallet.balance()
                || !ctx.masternodes.is_synced()
            {
                ctx.state.reset_coinstake_interval();
                token.sleep(GATE_SLEEP)?;
                // Re-poll faster while the wallet reports nothing to stake.
                let now = ctx.clock.adjusted_time();
                if !mintable_coins && now - last_mintable_check > MINTABLE_RECHECK_SECS {
                    last_mintable_check = now;
                    mintable_coins = ctx.wallet.mintable_coins();
                }
            }
        } else if tip.height.saturating_sub(6) > params.last_pow_block {
            // Run for a little while past the PoS switch in case the chain
            // rewinds, then exit the PoW thread for good.
            info!(height = tip.height, "exiting proof of work mining thread");
            return Ok(());
        }

        // Throttle rebuilding on a tip this process hashed moments ago.
        let tip = ctx.chain.tip().ok_or(MiningError::NoTip)?;
        if !last_loop_orphan {
            let now = ctx.clock.adjusted_time();
            let min_interval = ctx.wallet.hash_interval().max(1) as i64;
            if ctx.state.recently_hashed(tip.height, now, min_interval) {
                token.sleep(GATE_SLEEP)?;
                continue;
            }
        }
        last_loop_orphan = false;

        // Create new block.
        let transactions_updated_last = ctx.mempool.transactions_updated();
        let prev = tip;
        let template = match create_new_block_with_key(ctx, proof_of_stake) {
            Ok(template) => template,
            Err(MiningError::Cancelled) => return Err(MiningError::Cancelled),
            Err(err) => {
                debug!(%err, "no template this round");
                ctx.state
                    .record_hashed_block(prev.height, ctx.clock.adjusted_time());
                continue;
            }
        };
        ctx.state
            .record_hashed_block(prev.height, ctx.clock.adjusted_time());

        if proof_of_stake {
            // The stake itself is the solution; the template arrives signed.
            let block = template.block;
            match process_block_found(ctx, &block) {
                Ok(()) => {}
                Err(MiningError::SubmitStale) => {
                    debug!(hash = %block.hash(), "staked block became stale");
                }
                Err(MiningError::SubmitRejected(reason)) => {
                    warn!(%reason, hash = %block.hash(), "staked block rejected");
                }
                Err(err) => return Err(err),
            }
            continue;
        }

        // PoW search.
        let mut block = template.block;
        increment_extra_nonce(&mut block, prev.height, &ctx.state, params);
        debug!(
            txs = block.vtx.len(),
            size = block.serialized_size(),
            "running miner with transactions in block"
        );

        let start = ctx.clock.adjusted_time();
        let mut target = decode_compact(block.header.bits);
        'search: loop {
            let mut hashes_done: u64 = 0;
            loop {
                let hash = block.hash();
                if hash_meets_target(&hash, &target) {
                    info!(%hash, "proof-of-work found");
                    match process_block_found(ctx, &block) {
                        Ok(()) => {
                            if params.mine_blocks_on_demand {
                                // One block per round in regression tests.
                                return Ok(());
                            }
                        }
                        Err(MiningError::SubmitStale) => {
                            debug!(%hash, "mined block became stale");
                            last_loop_orphan = true;
                        }
                        Err(MiningError::SubmitRejected(reason)) => {
                            warn!(%reason, %hash, "mined block rejected");
                        }
                        Err(err) => return Err(err),
                    }
                    break 'search;
                }
                block.header.nonce += 1;
                hashes_done += 1;
                if block.header.nonce & 0xff == 0 {
                    break;
                }
            }

            // Heartbeat between nonce batches.
            ctx.state
                .count_hashes(hashes_done, ctx.clock.millis(), ctx.clock.adjusted_time());
            token.checkpoint()?;
            if ctx.peers.peer_count() == 0 && params.mining_requires_peers {
                break 'search;
            }
            if block.header.nonce >= MAX_NONCE {
                break 'search;
            }
            if ctx.mempool.transactions_updated() != transactions_updated_last
                && ctx.clock.adjusted_time() - start > 60
            {
                break 'search;
            }
            match ctx.chain.tip() {
                Some(current) if current.hash == prev.hash => {}
                _ => break 'search,
            }

            update_time(&mut block.header, &ctx.chain, &prev, ctx.clock.as_ref());
            if params.allow_min_difficulty_blocks {
                // Changing the time can change the work required on
                // min-difficulty networks.
                target = decode_compact(block.header.bits);
            }
        }
    }
}

/// Run the PoA worker: build and submit an audit block every `period`.
pub fn run_poa_miner(ctx: &MinerContext, period: Duration, token: &CancelToken) {
    info!(period_secs = period.as_secs(), "PoA worker started");
    match poa_loop(ctx, period, token) {
        Ok(()) => info!("PoA worker exiting"),
        Err(MiningError::Cancelled) => info!("PoA worker cancelled"),
        Err(err) => warn!(%err, "PoA worker terminated"),
    }
}

fn poa_loop(ctx: &MinerContext, period: Duration, token: &CancelToken) -> MiningResult<()> {
    loop {
        token.sleep(period)?;
        match create_new_poa_block_with_key(ctx) {
            Ok(Some(template)) => {
                let block = template.block;
                match process_block_found(ctx, &block) {
                    Ok(()) => info!(hash = %block.hash(), audited = block.pos_blocks_audited.len(), "PoA block submitted"),
                    Err(MiningError::SubmitStale) => {
                        debug!(hash = %block.hash(), "PoA block became stale");
                    }
                    Err(MiningError::SubmitRejected(reason)) => {
                        warn!(%reason, hash = %block.hash(), "PoA block rejected");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(None) => debug!("no PoA block due"),
            Err(MiningError::Cancelled) => return Err(MiningError::Cancelled),
            Err(err) => warn!(%err, "PoA template build failed"),
        }
    }
}

/// Submit a solved block, as if it had arrived from a peer.
///
/// The stale check runs under the best-block lock; a stale template is
/// dropped and never reaches the processor.
pub fn process_block_found(ctx: &MinerContext, block: &Block) -> MiningResult<()> {
    let hash = block.hash();
    debug!(%hash, "submitting mined block");

    if block.header.hash_prev_block != ctx.chain.best_block_hash() {
        return Err(MiningError::SubmitStale);
    }

    // The reserve key is consumed by this block.
    ctx.wallet.keep_reserve_key();
    ctx.wallet.reset_request_count(&hash);

    // Inform about the new block, then process it like a network block.
    ctx.processor.block_found(&hash);
    if !ctx.processor.process_new_block(block.clone()) {
        return Err(MiningError::SubmitRejected("block not accepted".to_string()));
    }

    ctx.peers.broadcast_block_inventory(&hash);
    Ok(())
}
