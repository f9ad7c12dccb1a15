//! Standard (PoW / PoS) block template assembly.

use crate::selector::{select_transactions, SelectionBudget};
use crate::{MinerContext, MinerState, MiningError, MiningResult, TemplateFailure};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};
use umbra_chain::{BlockIndex, Chain, Clock, NetworkParams};
use umbra_types::{
    Block, BlockHeader, BlockTemplate, Hash256, Script, Transaction, TxIn, TxOut, TxType,
    BLOCK_VERSION, MAX_COINBASE_SCRIPT_SIG_SIZE, OP_0,
};

/// Build a block template on the current tip.
///
/// `script_pub_key` receives the miner payout; `tx_pub`/`tx_priv` are the
/// ephemeral transaction keys embedded in the paying output. Any failure
/// returns no template and the worker loops.
///
/// The mempool snapshot and the fresh coins view taken here stand in for
/// the combined chain/mempool lock scope: both are immutable for the
/// duration of the selection pass.
pub fn create_new_block(
    ctx: &MinerContext,
    script_pub_key: Script,
    tx_pub: &[u8],
    tx_priv: &[u8],
    proof_of_stake: bool,
) -> MiningResult<BlockTemplate> {
    let params = ctx.chain.params();
    let tip = ctx.chain.tip().ok_or(MiningError::NoTip)?;
    let height = tip.height + 1;

    let mut template = BlockTemplate::default();
    let block = &mut template.block;

    block.header.version = BLOCK_VERSION;
    if params.mine_blocks_on_demand {
        if let Some(version) = ctx.options.block_version_override {
            block.header.version = version;
        }
    }

    // Coinbase: one null input, one output paying the miner.
    let mut coinbase = Transaction {
        tx_type: TxType::Coinbase,
        vin: vec![TxIn::null()],
        vout: vec![TxOut::new(params.block_value(tip.height), script_pub_key)],
        ..Default::default()
    };
    coinbase.vout[0].tx_pub = tx_pub.to_vec();
    coinbase.vout[0].tx_priv = tx_priv.to_vec();
    block.vtx.push(coinbase);
    template.tx_fees.push(-1); // updated at end
    template.tx_sigops.push(0); // updated at end

    if proof_of_stake {
        block.header.time = ctx.clock.adjusted_time() as u32;
        block.header.bits = ctx.chain.next_work_required(&tip, &block.header);

        let search_time = block.header.time as i64;
        let last_search = ctx
            .state
            .last_coinstake_search_time
            .load(Ordering::Relaxed);
        let mut stake_found = false;
        if search_time >= last_search {
            if let Some((coinstake, stake_time)) = ctx
                .wallet
                .create_coinstake(block.header.bits, search_time - last_search)
            {
                block.header.time = stake_time;
                block.vtx[0].vout[0].set_empty();
                block.vtx.push(coinstake);
                template.tx_fees.push(0);
                template.tx_sigops.push(0);
                stake_found = true;
            }
            ctx.state
                .update_coinstake_search(search_time, search_time - last_search);
        }

        if !stake_found {
            debug!("stake not found");
            return Err(TemplateFailure::NoStake.into());
        }
        // Marker, payment and reward outputs are all required below.
        if block.vtx[1].vout.len() < 3 {
            return Err(TemplateFailure::NoStake.into());
        }
    }

    // Collect memory pool transactions into the block.
    let options = ctx.options.clamped(params);
    let budget = SelectionBudget {
        max_size: options.block_max_size,
        priority_size: options.block_priority_size,
        min_size: options.block_min_size,
    };
    let snapshot = ctx.mempool.snapshot();
    let view = ctx.coins.view_at_tip();
    let selection = select_transactions(
        &snapshot,
        &ctx.mempool,
        &view,
        &ctx.chain,
        &ctx.invalid_outpoints,
        height,
        &budget,
        options.print_priority,
        &ctx.state,
    );
    let fees = selection.total_fees;
    for selected in selection.txs {
        block.vtx.push((*selected.tx).clone());
        template.tx_fees.push(selected.fee);
        template.tx_sigops.push(selected.sigops);
    }

    if !proof_of_stake {
        // Masternode and general budget payments.
        ctx.masternodes
            .fill_block_payee(&mut block.vtx[0], fees, false);
        if block.vtx[0].vout.len() > 1 {
            block.payee = block.vtx[0].vout[1].script_pubkey.clone();
        } else {
            block.vtx[0].vout[0].value += fees;
        }
    } else {
        block.vtx[1].vout[2].value += fees;
    }
    template.tx_fees[0] = fees;

    // Compute final coinbase transaction.
    block.vtx[0].vin[0].script_sig = Script::new().push_int(height as i64).push_op(OP_0);
    block.vtx[0].tx_type = TxType::RevealAmount;

    let zero_blind = [0u8; 32];
    if !proof_of_stake {
        let value = block.vtx[0].vout[0].value;
        let shared_secret = tx_pub.to_vec();
        ctx.wallet
            .encode_tx_out_amount(&mut block.vtx[0].vout[0], value, &shared_secret);
        block.vtx[0].vout[0].commitment = ctx
            .wallet
            .create_commitment(&zero_blind, value)
            .ok_or(TemplateFailure::CommitmentFailed)?;
    } else {
        // Merge the reward output into the stake payment, then commit to
        // the combined value on the payment output.
        let reward = block.vtx[1].vout[2].value;
        block.vtx[1].vout[1].value += reward;
        block.vtx[1].vout[2].set_empty();

        let value = block.vtx[1].vout[1].value;
        let shared_secret = block.vtx[1].vout[1].tx_pub.clone();
        block.vtx[1].vout[1].commitment.clear();
        ctx.wallet
            .encode_tx_out_amount(&mut block.vtx[1].vout[1], value, &shared_secret);
        block.vtx[1].vout[1].commitment = ctx
            .wallet
            .create_commitment(&zero_blind, value)
            .ok_or(TemplateFailure::CommitmentFailed)?;

        if !ctx.wallet.make_schnorr_signature(&mut block.vtx[1]) {
            warn!("failed to make schnorr signature");
            return Err(TemplateFailure::SignatureFailed.into());
        }
        if !ctx.wallet.verify_schnorr_key_image(&block.vtx[1]) {
            warn!("failed to verify schnorr key image");
            return Err(TemplateFailure::VerifyFailed.into());
        }
        ctx.wallet.is_transaction_for_me(&block.vtx[1]);
    }

    // Fill in header.
    block.header.hash_prev_block = tip.hash;
    if !proof_of_stake {
        update_time(&mut block.header, &ctx.chain, &tip, ctx.clock.as_ref());
    }
    block.header.bits = ctx.chain.next_work_required(&tip, &block.header);
    block.header.nonce = 0;
    block.header.accumulator_checkpoint = Hash256::ZERO;
    template.tx_sigops[0] = block.vtx[0].legacy_sigop_count();
    block.header.hash_merkle_root = block.merkle_root();

    if proof_of_stake {
        increment_extra_nonce(block, tip.height, &ctx.state, params);
        info!(hash = %block.hash(), "proof-of-stake block found");
        if !ctx.wallet.sign_block(block) {
            info!("signing new block failed, computing private key");
            if block.vtx.len() > 1 && block.vtx[1].vout.len() > 1 {
                ctx.wallet.add_computed_private_key(&block.vtx[1].vout[1]);
            }
            if !ctx.wallet.sign_block(block) {
                warn!("signing new block with utxo key failed");
                return Err(TemplateFailure::SignatureFailed.into());
            }
        }
    }

    // The template binds to the tip observed at build time.
    if ctx.chain.tip().map(|t| t.hash) != Some(tip.hash) {
        return Err(MiningError::StaleTip);
    }

    Ok(template)
}

/// Build a template with a fresh miner address from the wallet.
pub fn create_new_block_with_key(
    ctx: &MinerContext,
    proof_of_stake: bool,
) -> MiningResult<BlockTemplate> {
    let keys = ctx
        .wallet
        .generate_address()
        .ok_or(TemplateFailure::NoAddress)?;
    let script_pub_key = Script::pay_to_pubkey(&keys.pubkey);
    create_new_block(ctx, script_pub_key, &keys.tx_pub, &keys.tx_priv, proof_of_stake)
}

/// Bump the header time and, on min-difficulty networks, retarget.
pub fn update_time(header: &mut BlockHeader, chain: &Chain, prev: &BlockIndex, clock: &dyn Clock) {
    header.time = std::cmp::max(
        chain.median_time_past(prev) + 1,
        clock.adjusted_time() as u32,
    );
    if chain.params().allow_min_difficulty_blocks {
        header.bits = chain.next_work_required(prev, header);
    }
}

/// Rewrite the coinbase scriptSig with the next extra nonce and recompute
/// the Merkle root. The extra nonce resets whenever the previous block
/// changes.
pub fn increment_extra_nonce(
    block: &mut Block,
    prev_height: u32,
    state: &MinerState,
    params: &NetworkParams,
) -> u32 {
    let extra_nonce = state.next_extra_nonce(block.header.hash_prev_block);
    let height = prev_height + 1;
    let script_sig = Script::new()
        .push_int(height as i64)
        .push_int(extra_nonce as i64)
        .push_data(&params.coinbase_flags);
    assert!(script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);
    block.vtx[0].vin[0].script_sig = script_sig;
    block.header.hash_merkle_root = block.merkle_root();
    extra_nonce
}
