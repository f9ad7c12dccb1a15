//! Test harness for integration tests.
//!
//! Provides an in-memory chain builder, a scriptable dev wallet, a
//! recording chain processor and a wired [`MinerContext`] for exercising
//! template assembly and the miner workers.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use umbra_chain::{
    BlockIndex, Chain, Coin, CoinsView, InvalidOutpoints, ManualClock, NetworkParams,
};
use umbra_mempool::Mempool;
use umbra_mining::{
    BlockProcessor, CoinsProvider, EphemeralKeys, MasternodeHooks, MinerContext, MinerOptions,
    MinerState, PeerSet, WalletBackend,
};
use umbra_types::{
    blake2b_256, Amount, Block, BlockHeader, Hash256, KeyImage, OutPoint, Script, Transaction,
    TxIn, TxOut, TxType, BLOCK_VERSION, COIN, POA_BLOCK_VERSION,
};

/// Epoch the manual clock starts at.
pub const TEST_EPOCH: i64 = 1_700_000_000;

/// Scriptable wallet stand-in.
///
/// Key material, commitments and signatures are deterministic hashes with
/// the right shape; the template builder only depends on their presence
/// and placement.
pub struct DevWallet {
    no_address: AtomicBool,
    locked: AtomicBool,
    mintable: AtomicBool,
    balance: AtomicI64,
    reserve: AtomicI64,
    hash_interval: AtomicU64,
    fixed_keys: Mutex<Option<EphemeralKeys>>,
    coinstake: Mutex<Option<(Transaction, u32)>>,
    fail_commitment: AtomicBool,
    fail_schnorr: AtomicBool,
    fail_verify: AtomicBool,
    /// Number of upcoming sign_block calls that must fail.
    fail_signs: AtomicU32,
    address_counter: AtomicU64,
    computed_keys: AtomicUsize,
    kept_keys: AtomicUsize,
    request_resets: Mutex<Vec<Hash256>>,
}

impl Default for DevWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl DevWallet {
    /// An unlocked wallet with balance and nothing scripted.
    pub fn new() -> Self {
        Self {
            no_address: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            mintable: AtomicBool::new(true),
            balance: AtomicI64::new(1000 * COIN),
            reserve: AtomicI64::new(0),
            hash_interval: AtomicU64::new(1),
            fixed_keys: Mutex::new(None),
            coinstake: Mutex::new(None),
            fail_commitment: AtomicBool::new(false),
            fail_schnorr: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            fail_signs: AtomicU32::new(0),
            address_counter: AtomicU64::new(0),
            computed_keys: AtomicUsize::new(0),
            kept_keys: AtomicUsize::new(0),
            request_resets: Mutex::new(Vec::new()),
        }
    }

    /// Pin the keys returned by `generate_address`.
    pub fn set_fixed_keys(&self, keys: EphemeralKeys) {
        *self.fixed_keys.lock() = Some(keys);
    }

    /// Make `generate_address` fail.
    pub fn set_no_address(&self, no_address: bool) {
        self.no_address.store(no_address, Ordering::SeqCst);
    }

    /// Script the next coinstake search results.
    pub fn set_coinstake(&self, tx: Transaction, time: u32) {
        *self.coinstake.lock() = Some((tx, time));
    }

    /// Clear the scripted coinstake.
    pub fn clear_coinstake(&self) {
        *self.coinstake.lock() = None;
    }

    /// Lock or unlock the wallet.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Toggle mintable-coin reports.
    pub fn set_mintable(&self, mintable: bool) {
        self.mintable.store(mintable, Ordering::SeqCst);
    }

    /// Fail commitment creation.
    pub fn set_fail_commitment(&self, fail: bool) {
        self.fail_commitment.store(fail, Ordering::SeqCst);
    }

    /// Fail Schnorr signing.
    pub fn set_fail_schnorr(&self, fail: bool) {
        self.fail_schnorr.store(fail, Ordering::SeqCst);
    }

    /// Fail key-image verification.
    pub fn set_fail_verify(&self, fail: bool) {
        self.fail_verify.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` block signatures fail.
    pub fn fail_next_signs(&self, count: u32) {
        self.fail_signs.store(count, Ordering::SeqCst);
    }

    /// How many computed private keys were added.
    pub fn computed_keys(&self) -> usize {
        self.computed_keys.load(Ordering::SeqCst)
    }

    /// How many reserve keys were kept.
    pub fn kept_keys(&self) -> usize {
        self.kept_keys.load(Ordering::SeqCst)
    }

    /// Request-counter resets seen so far.
    pub fn request_resets(&self) -> Vec<Hash256> {
        self.request_resets.lock().clone()
    }
}

impl WalletBackend for DevWallet {
    fn generate_address(&self) -> Option<EphemeralKeys> {
        if self.no_address.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(keys) = self.fixed_keys.lock().clone() {
            return Some(keys);
        }
        let counter = self.address_counter.fetch_add(1, Ordering::SeqCst);
        let entropy: u64 = rand::random();
        let seed = blake2b_256(&[counter.to_le_bytes(), entropy.to_le_bytes()].concat());
        let mut pubkey = vec![0x02];
        pubkey.extend_from_slice(seed.as_bytes());
        Some(EphemeralKeys {
            pubkey,
            tx_pub: derive_bytes(&seed, b"pub"),
            tx_priv: derive_bytes(&seed, b"priv"),
        })
    }

    fn create_coinstake(&self, _bits: u32, _search_window: i64) -> Option<(Transaction, u32)> {
        self.coinstake.lock().clone()
    }

    fn mintable_coins(&self) -> bool {
        self.mintable.load(Ordering::SeqCst)
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn balance(&self) -> Amount {
        self.balance.load(Ordering::SeqCst)
    }

    fn reserve_balance(&self) -> Amount {
        self.reserve.load(Ordering::SeqCst)
    }

    fn hash_interval(&self) -> u64 {
        self.hash_interval.load(Ordering::SeqCst)
    }

    fn encode_tx_out_amount(&self, out: &mut TxOut, amount: Amount, shared_secret: &[u8]) {
        let mut data = amount.to_le_bytes().to_vec();
        data.extend_from_slice(shared_secret);
        out.encoded_amount = blake2b_256(&data).as_bytes().to_vec();
    }

    fn create_commitment(&self, blind: &[u8; 32], value: Amount) -> Option<Vec<u8>> {
        if self.fail_commitment.load(Ordering::SeqCst) {
            return None;
        }
        let mut data = blind.to_vec();
        data.extend_from_slice(&value.to_le_bytes());
        Some(blake2b_256(&data).as_bytes().to_vec())
    }

    fn make_schnorr_signature(&self, tx: &mut Transaction) -> bool {
        if self.fail_schnorr.load(Ordering::SeqCst) {
            return false;
        }
        let mut data = tx.txid().as_bytes().to_vec();
        data.extend_from_slice(b"schnorr");
        tx.key_image_sig = blake2b_256(&data).as_bytes().to_vec();
        true
    }

    fn verify_schnorr_key_image(&self, tx: &Transaction) -> bool {
        !self.fail_verify.load(Ordering::SeqCst) && !tx.key_image_sig.is_empty()
    }

    fn add_computed_private_key(&self, _out: &TxOut) {
        self.computed_keys.fetch_add(1, Ordering::SeqCst);
    }

    fn sign_block(&self, block: &mut Block) -> bool {
        let pending = self.fail_signs.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_signs.store(pending - 1, Ordering::SeqCst);
            return false;
        }
        block.block_sig = blake2b_256(block.hash().as_bytes()).as_bytes().to_vec();
        true
    }

    fn is_transaction_for_me(&self, _tx: &Transaction) -> bool {
        true
    }

    fn keep_reserve_key(&self) {
        self.kept_keys.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_request_count(&self, block_hash: &Hash256) {
        self.request_resets.lock().push(*block_hash);
    }
}

/// Chain processor that records everything and optionally connects
/// accepted blocks to a chain.
pub struct RecordingProcessor {
    accept: AtomicBool,
    chain: Mutex<Option<Arc<Chain>>>,
    processed: Mutex<Vec<Block>>,
    found: Mutex<Vec<Hash256>>,
    reverify_failures: Mutex<HashSet<u32>>,
}

impl Default for RecordingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingProcessor {
    /// A processor accepting every block.
    pub fn new() -> Self {
        Self {
            accept: AtomicBool::new(true),
            chain: Mutex::new(None),
            processed: Mutex::new(Vec::new()),
            found: Mutex::new(Vec::new()),
            reverify_failures: Mutex::new(HashSet::new()),
        }
    }

    /// Connect accepted blocks to `chain`, emulating chain activation.
    pub fn activate_on(&self, chain: Arc<Chain>) {
        *self.chain.lock() = Some(chain);
    }

    /// Refuse upcoming blocks.
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Script a re-verification failure for the block at `height`.
    pub fn fail_reverify_at(&self, height: u32) {
        self.reverify_failures.lock().insert(height);
    }

    /// Blocks processed so far.
    pub fn processed(&self) -> Vec<Block> {
        self.processed.lock().clone()
    }

    /// Block-found signals seen so far.
    pub fn found(&self) -> Vec<Hash256> {
        self.found.lock().clone()
    }
}

impl BlockProcessor for RecordingProcessor {
    fn process_new_block(&self, block: Block) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(chain) = self.chain.lock().as_ref() {
            if chain.connect_block(block.clone()).is_err() {
                return false;
            }
        }
        self.processed.lock().push(block);
        true
    }

    fn block_found(&self, hash: &Hash256) {
        self.found.lock().push(*hash);
    }

    fn reverify_pos_block(&self, index: &BlockIndex) -> bool {
        !self.reverify_failures.lock().contains(&index.height)
    }
}

/// Fixed peer set.
pub struct StaticPeers {
    count: AtomicUsize,
    broadcasts: Mutex<Vec<Hash256>>,
}

impl Default for StaticPeers {
    fn default() -> Self {
        Self::new(1)
    }
}

impl StaticPeers {
    /// A peer set of the given size.
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Resize the peer set.
    pub fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Inventory broadcasts seen so far.
    pub fn broadcasts(&self) -> Vec<Hash256> {
        self.broadcasts.lock().clone()
    }
}

impl PeerSet for StaticPeers {
    fn peer_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn broadcast_block_inventory(&self, hash: &Hash256) {
        self.broadcasts.lock().push(*hash);
    }
}

/// Masternode layer stand-in: synced, with an optional scripted payee.
pub struct TestMasternodes {
    synced: AtomicBool,
    payee: Mutex<Option<(Script, Amount)>>,
}

impl Default for TestMasternodes {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMasternodes {
    /// A synced layer with no payment due.
    pub fn new() -> Self {
        Self {
            synced: AtomicBool::new(true),
            payee: Mutex::new(None),
        }
    }

    /// Toggle sync state.
    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Script a masternode payment for the next coinbase.
    pub fn set_payee(&self, script: Script, amount: Amount) {
        *self.payee.lock() = Some((script, amount));
    }
}

impl MasternodeHooks for TestMasternodes {
    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn fill_block_payee(&self, coinbase: &mut Transaction, _fees: Amount, _proof_of_stake: bool) {
        if let Some((script, amount)) = self.payee.lock().clone() {
            coinbase.vout.push(TxOut::new(amount, script));
        }
    }
}

/// Coins provider handing out fresh views seeded from a shared UTXO list.
#[derive(Default)]
pub struct TestCoins {
    coins: Mutex<Vec<(OutPoint, Coin)>>,
}

impl TestCoins {
    /// An empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an unspent output.
    pub fn add(&self, outpoint: OutPoint, coin: Coin) {
        self.coins.lock().push((outpoint, coin));
    }
}

impl CoinsProvider for TestCoins {
    fn view_at_tip(&self) -> CoinsView {
        let view = CoinsView::new();
        for (outpoint, coin) in self.coins.lock().iter() {
            view.add_coin(*outpoint, *coin);
        }
        view
    }
}

/// Everything a test needs, wired over regtest parameters.
pub struct TestHarness {
    /// The chain under test.
    pub chain: Arc<Chain>,
    /// Mempool.
    pub mempool: Arc<Mempool>,
    /// UTXO seed list.
    pub coins: Arc<TestCoins>,
    /// Scriptable wallet.
    pub wallet: Arc<DevWallet>,
    /// Recording chain processor.
    pub processor: Arc<RecordingProcessor>,
    /// Peer set.
    pub peers: Arc<StaticPeers>,
    /// Masternode layer.
    pub masternodes: Arc<TestMasternodes>,
    /// Outpoint blacklist.
    pub invalid_outpoints: Arc<InvalidOutpoints>,
    /// Manual clock.
    pub clock: Arc<ManualClock>,
    /// Shared miner state.
    pub state: Arc<MinerState>,
    /// Runtime options.
    pub options: MinerOptions,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// A fresh harness on regtest parameters with a connected genesis.
    pub fn new() -> Self {
        Self::with_params(NetworkParams::regtest())
    }

    /// A fresh harness over custom parameters with a connected genesis.
    pub fn with_params(params: NetworkParams) -> Self {
        let options = MinerOptions::from_params(&params);
        let chain = Arc::new(Chain::new(params));
        let processor = Arc::new(RecordingProcessor::new());
        processor.activate_on(Arc::clone(&chain));

        let harness = Self {
            chain,
            mempool: Arc::new(Mempool::new()),
            coins: Arc::new(TestCoins::new()),
            wallet: Arc::new(DevWallet::new()),
            processor,
            peers: Arc::new(StaticPeers::default()),
            masternodes: Arc::new(TestMasternodes::new()),
            invalid_outpoints: Arc::new(InvalidOutpoints::new()),
            clock: Arc::new(ManualClock::at(TEST_EPOCH)),
            state: Arc::new(MinerState::new()),
            options,
        };
        harness
            .chain
            .connect_block(harness.make_pow_block(Hash256::ZERO, TEST_EPOCH as u32 - 1000))
            .expect("genesis connects");
        harness
    }

    /// Wire a miner context from the harness parts.
    pub fn context(&self) -> MinerContext {
        MinerContext {
            chain: Arc::clone(&self.chain),
            mempool: Arc::clone(&self.mempool),
            coins: Arc::clone(&self.coins) as Arc<dyn CoinsProvider>,
            wallet: Arc::clone(&self.wallet) as Arc<dyn WalletBackend>,
            processor: Arc::clone(&self.processor) as Arc<dyn BlockProcessor>,
            peers: Arc::clone(&self.peers) as Arc<dyn PeerSet>,
            masternodes: Arc::clone(&self.masternodes) as Arc<dyn MasternodeHooks>,
            invalid_outpoints: Arc::clone(&self.invalid_outpoints),
            clock: Arc::clone(&self.clock) as Arc<dyn umbra_chain::Clock>,
            options: self.options.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// A minimal PoW block (coinbase only).
    pub fn make_pow_block(&self, prev: Hash256, time: u32) -> Block {
        let coinbase = Transaction {
            tx_type: TxType::Coinbase,
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50 * COIN, Script::pay_to_pubkey(&[2u8; 33]))],
            ..Default::default()
        };
        Block {
            header: BlockHeader {
                version: BLOCK_VERSION,
                hash_prev_block: prev,
                time,
                ..Default::default()
            },
            vtx: vec![coinbase],
            ..Default::default()
        }
    }

    /// A minimal PoS block: emptied coinbase plus a coinstake seeded from
    /// `seed`.
    pub fn make_pos_block(&self, prev: Hash256, time: u32, seed: u64) -> Block {
        let mut coinbase = Transaction {
            tx_type: TxType::Coinbase,
            vin: vec![TxIn::null()],
            vout: vec![TxOut::default()],
            ..Default::default()
        };
        coinbase.vout[0].set_empty();

        let coinstake = dev_coinstake(seed, 100 * COIN, 2 * COIN);
        Block {
            header: BlockHeader {
                version: BLOCK_VERSION,
                hash_prev_block: prev,
                time,
                ..Default::default()
            },
            vtx: vec![coinbase, coinstake],
            block_sig: blake2b_256(&seed.to_le_bytes()).as_bytes().to_vec(),
            ..Default::default()
        }
    }

    /// A minimal PoA block auditing the given heights.
    pub fn make_poa_block(
        &self,
        prev: Hash256,
        time: u32,
        audited: Vec<umbra_types::PoSBlockSummary>,
    ) -> Block {
        let coinbase = Transaction {
            tx_type: TxType::RevealAmount,
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(
                audited.len() as Amount * COIN / 2,
                Script::pay_to_pubkey(&[3u8; 33]),
            )],
            ..Default::default()
        };
        let mut block = Block {
            header: BlockHeader {
                version: POA_BLOCK_VERSION,
                hash_prev_block: prev,
                time,
                ..Default::default()
            },
            vtx: vec![coinbase],
            pos_blocks_audited: audited,
            ..Default::default()
        };
        block.hash_poa_merkle_root = block.poa_merkle_root();
        block.mined_hash = block.compute_mined_hash();
        block
    }

    /// Extend the chain with `count` PoW blocks.
    pub fn extend_pow(&self, count: u32) {
        for _ in 0..count {
            let tip = self.chain.tip().expect("tip exists");
            let block = self.make_pow_block(tip.hash, tip.time + 60);
            self.chain.connect_block(block).expect("block connects");
        }
    }

    /// Extend the chain with `count` PoS blocks.
    pub fn extend_pos(&self, count: u32) {
        for _ in 0..count {
            let tip = self.chain.tip().expect("tip exists");
            let seed = (tip.height as u64 + 1) << 16;
            let block = self.make_pos_block(tip.hash, tip.time + 60, seed);
            self.chain.connect_block(block).expect("block connects");
        }
    }

    /// Drive the chain to the start of the PoS phase.
    pub fn enter_pos_phase(&self) {
        let last_pow = self.chain.params().last_pow_block;
        let tip = self.chain.tip().expect("tip exists").height;
        if tip < last_pow {
            self.extend_pow(last_pow - tip);
        }
    }
}

/// Deterministic bytes derived from a hash and a label.
fn derive_bytes(seed: &Hash256, label: &[u8]) -> Vec<u8> {
    let mut data = seed.as_bytes().to_vec();
    data.extend_from_slice(label);
    blake2b_256(&data).as_bytes().to_vec()
}

/// A plausible coinstake: real input with a key image and the
/// marker/payment/reward output layout.
pub fn dev_coinstake(seed: u64, stake_value: Amount, reward: Amount) -> Transaction {
    let seed_hash = blake2b_256(&seed.to_le_bytes());
    let prevout = OutPoint::new(blake2b_256(&derive_bytes(&seed_hash, b"stake-src")), 0);
    let key_image = KeyImage(blake2b_256(&derive_bytes(&seed_hash, b"stake-ki")));

    let mut marker = TxOut::default();
    marker.set_empty();

    let mut payment = TxOut::new(
        stake_value,
        Script::pay_to_pubkey(&derive_bytes(&seed_hash, b"stake-pk")),
    );
    payment.tx_pub = derive_bytes(&seed_hash, b"stake-txpub");

    let reward_out = TxOut::new(reward, payment.script_pubkey.clone());

    Transaction {
        tx_type: TxType::Coinstake,
        vin: vec![TxIn::new(prevout, key_image)],
        vout: vec![marker, payment, reward_out],
        ..Default::default()
    }
}
