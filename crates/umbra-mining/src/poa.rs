//! Proof-of-Audit template assembly.
//!
//! A PoA block audits the PoS blocks produced since the previous PoA
//! block. The audit is a record, not a gate: a summary is appended even
//! when re-verification of the referenced block fails, with a zeroed
//! timestamp.

use crate::{BlockProcessor, MinerContext, MiningError, MiningResult, TemplateFailure};
use std::sync::Arc;
use tracing::{debug, warn};
use umbra_chain::{BlockIndex, Chain};
use umbra_types::{
    BlockTemplate, Hash256, PoSBlockSummary, Script, Transaction, TxIn, TxOut, TxType, COIN,
    MAX_COINBASE_SCRIPT_SIG_SIZE, POA_BLOCK_VERSION,
};

/// Enumerate the PoS blocks the next PoA block must audit.
///
/// Scans backward from `current_height` for the previous PoA block. With
/// no prior PoA, audits exactly `max_pos_blocks_audited` consecutive
/// blocks starting right after the last PoW block; otherwise resumes after
/// the last audited height, skipping non-PoS blocks, until the cap or the
/// tip. Failing to read an indexed block is fatal to the template.
pub fn list_pos_info(
    chain: &Chain,
    processor: &dyn BlockProcessor,
    current_height: u32,
) -> MiningResult<(Vec<PoSBlockSummary>, Option<Arc<BlockIndex>>)> {
    let params = chain.params();
    let max_audited = params.max_pos_blocks_audited;

    let mut prev_poa: Option<Arc<BlockIndex>> = None;
    let mut cursor = current_height;
    while cursor >= params.start_poa_block {
        let index = chain
            .index_at(cursor)
            .ok_or(umbra_chain::ChainError::UnknownHeight(cursor))?;
        if index.is_poa() {
            prev_poa = Some(index);
            break;
        }
        if cursor == 0 {
            break;
        }
        cursor -= 1;
    }

    let mut audits = Vec::new();
    match &prev_poa {
        None => {
            // First PoA block: the audit window is pinned to the start of
            // the PoS phase and must be complete.
            let first = params.last_pow_block + 1;
            let last = params.last_pow_block + max_audited as u32;
            if last > current_height {
                return Ok((audits, None));
            }
            for height in first..=last {
                let index = chain
                    .index_at(height)
                    .ok_or(umbra_chain::ChainError::UnknownHeight(height))?;
                audits.push(audit_summary(processor, &index));
            }
        }
        Some(prev) => {
            let prev_block = chain
                .read_block(prev)
                .map_err(TemplateFailure::ReadBlockFailed)?;
            let last_audited = prev_block
                .pos_blocks_audited
                .last()
                .map(|summary| summary.height)
                .unwrap_or(params.last_pow_block);

            let mut height = last_audited + 1;
            while height <= current_height {
                let index = chain
                    .index_at(height)
                    .ok_or(umbra_chain::ChainError::UnknownHeight(height))?;
                let block = chain
                    .read_block(&index)
                    .map_err(TemplateFailure::ReadBlockFailed)?;
                if block.is_proof_of_stake() {
                    audits.push(audit_summary(processor, &index));
                }
                if audits.len() == max_audited {
                    break;
                }
                height += 1;
            }
        }
    }

    Ok((audits, prev_poa))
}

fn audit_summary(processor: &dyn BlockProcessor, index: &BlockIndex) -> PoSBlockSummary {
    // Re-verification failure is recorded, not fatal.
    let time = if processor.reverify_pos_block(index) {
        index.time
    } else {
        warn!(height = index.height, hash = %index.hash, "PoS re-verification failed during audit");
        0
    };
    PoSBlockSummary {
        hash: index.hash,
        height: index.height,
        time,
    }
}

/// Build a PoA block template, or `None` when no PoA block is due.
pub fn create_new_poa_block(
    ctx: &MinerContext,
    script_pub_key: Script,
    tx_pub: &[u8],
    tx_priv: &[u8],
) -> MiningResult<Option<BlockTemplate>> {
    let params = ctx.chain.params();
    let tip = ctx.chain.tip().ok_or(MiningError::NoTip)?;
    if tip.height < params.start_poa_block {
        return Ok(None);
    }
    let height = tip.height + 1;

    let mut template = BlockTemplate::default();
    let block = &mut template.block;

    // Coinbase; its value is set once the audit count is known.
    let mut coinbase = Transaction {
        tx_type: TxType::Coinbase,
        vin: vec![TxIn::null()],
        vout: vec![TxOut::new(0, script_pub_key)],
        ..Default::default()
    };
    coinbase.vout[0].tx_pub = tx_pub.to_vec();
    coinbase.vout[0].tx_priv = tx_priv.to_vec();
    block.vtx.push(coinbase);
    template.tx_fees.push(-1); // updated at end
    template.tx_sigops.push(0); // updated at end

    block.header.time = ctx.clock.adjusted_time() as u32;
    block.header.bits = ctx.chain.next_work_required(&tip, &block.header);

    let (audits, prev_poa) = list_pos_info(&ctx.chain, ctx.processor.as_ref(), tip.height)?;
    if audits.is_empty() {
        debug!(height, "no PoS blocks pending audit");
        return Ok(None);
    }
    block.pos_blocks_audited = audits;
    block.header.version = POA_BLOCK_VERSION;

    // Reward is proportional to the number of audited blocks.
    let per_audit = if tip.height >= params.hard_fork_height {
        COIN / 4
    } else {
        COIN / 2
    };
    let reward = block.pos_blocks_audited.len() as i64 * per_audit;
    block.vtx[0].vout[0].value = reward;
    block.vtx[0].tx_type = TxType::RevealAmount;

    let zero_blind = [0u8; 32];
    let shared_secret = tx_pub.to_vec();
    ctx.wallet
        .encode_tx_out_amount(&mut block.vtx[0].vout[0], reward, &shared_secret);
    block.vtx[0].vout[0].commitment = ctx
        .wallet
        .create_commitment(&zero_blind, reward)
        .ok_or(TemplateFailure::CommitmentFailed)?;

    // Fill in header. A PoA block carries no mempool transactions.
    block.header.hash_prev_block = tip.hash;
    block.hash_prev_poa_block = prev_poa.map(|index| index.hash).unwrap_or(Hash256::ZERO);
    block.header.nonce = 0;
    template.tx_sigops[0] = block.vtx[0].legacy_sigop_count();
    template.tx_fees[0] = 0;

    // Compute final coinbase transaction.
    let script_sig = Script::new()
        .push_int(height as i64)
        .push_int(1)
        .push_data(&params.coinbase_flags);
    assert!(script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);
    block.vtx[0].vin[0].script_sig = script_sig;

    block.header.hash_merkle_root = block.merkle_root();
    block.hash_poa_merkle_root = block.poa_merkle_root();
    block.mined_hash = block.compute_mined_hash();

    Ok(Some(template))
}

/// Build a PoA template with a fresh miner address from the wallet.
pub fn create_new_poa_block_with_key(ctx: &MinerContext) -> MiningResult<Option<BlockTemplate>> {
    let keys = ctx
        .wallet
        .generate_address()
        .ok_or(TemplateFailure::NoAddress)?;
    let script_pub_key = Script::pay_to_pubkey(&keys.pubkey);
    create_new_poa_block(ctx, script_pub_key, &keys.tx_pub, &keys.tx_priv)
}
