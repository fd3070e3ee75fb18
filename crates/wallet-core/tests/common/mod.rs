//! Shared fixtures for the manager integration tests: a scripted connector
//! and in-process signers for both curves.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use chain_btc::utxo::Utxo;
use ed25519_dalek::Signer as _;
use tokio::sync::Notify;

use wallet_core::{
    Amount, ChainState, Connector, ConnectorError, FeeRequest, HistoryPage, HistoryRequest,
    HistorySource, RawFeeData, Signer, SignerError, StateSnapshot, Token,
};

/// Routes the crate's spans and events to the test output once per binary.
pub fn init_logging() {
    wallet_core::logging::init_test_logging();
}

pub const BTC_RECIPIENT: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
pub const ETH_RECIPIENT: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

pub fn utxo(tag: u8, amount_sat: u64) -> Utxo {
    Utxo {
        txid: hex::encode([tag; 32]),
        vout: 0,
        amount_sat,
    }
}

pub fn utxo_snapshot(outputs: Vec<Utxo>, confirmed: &[&str]) -> StateSnapshot {
    StateSnapshot {
        balances: vec![],
        chain_state: ChainState::Utxo { outputs },
        confirmed_hashes: confirmed.iter().map(|h| h.to_string()).collect(),
    }
}

pub fn account_snapshot(balances: Vec<Amount>, sequence_number: u64, confirmed: &[&str]) -> StateSnapshot {
    StateSnapshot {
        balances,
        chain_state: ChainState::Account { sequence_number },
        confirmed_hashes: confirmed.iter().map(|h| h.to_string()).collect(),
    }
}

pub fn message_snapshot(balances: Vec<Amount>, blockhash: [u8; 32]) -> StateSnapshot {
    StateSnapshot {
        balances,
        chain_state: ChainState::Message {
            recent_blockhash: chain_sol::address::bytes_to_address(&blockhash),
            lamports_per_signature: 5_000,
        },
        confirmed_hashes: HashSet::new(),
    }
}

/// Holds the next `get_state` open until released, so a test can act while
/// a refresh is in flight. Only a call made while armed is held.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

/// A connector answering from scripted replies and counting every call.
pub struct ScriptedConnector {
    host: String,
    state: Mutex<Result<StateSnapshot, ConnectorError>>,
    fee: Mutex<Result<RawFeeData, ConnectorError>>,
    broadcast_replies: Mutex<VecDeque<Result<String, ConnectorError>>>,
    history: Mutex<Vec<HistoryPage>>,
    pub broadcasts: Mutex<Vec<Vec<u8>>>,
    pub state_tokens: Mutex<Vec<Token>>,
    pub history_calls: AtomicUsize,
    pub fee_requests: Mutex<Vec<FeeRequest>>,
    pub state_calls: AtomicUsize,
    pub fee_calls: AtomicUsize,
    pub broadcast_calls: AtomicUsize,
    pub gate: Gate,
}

impl ScriptedConnector {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            state: Mutex::new(Err(ConnectorError::Transport("no state scripted".into()))),
            fee: Mutex::new(Err(ConnectorError::Transport("no fee scripted".into()))),
            broadcast_replies: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            state_tokens: Mutex::new(Vec::new()),
            history_calls: AtomicUsize::new(0),
            fee_requests: Mutex::new(Vec::new()),
            state_calls: AtomicUsize::new(0),
            fee_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }

    pub fn set_state(&self, reply: Result<StateSnapshot, ConnectorError>) {
        *self.state.lock().unwrap() = reply;
    }

    pub fn set_fee(&self, reply: Result<RawFeeData, ConnectorError>) {
        *self.fee.lock().unwrap() = reply;
    }

    /// Queues a broadcast reply. With none queued, broadcasts succeed with
    /// `tx-<n>`.
    pub fn push_broadcast(&self, reply: Result<String, ConnectorError>) {
        self.broadcast_replies.lock().unwrap().push_back(reply);
    }

    /// Scripts the address history, one entry per page in order.
    pub fn set_history(&self, pages: Vec<HistoryPage>) {
        *self.history.lock().unwrap() = pages;
    }

    pub fn total_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
            + self.fee_calls.load(Ordering::SeqCst)
            + self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn last_broadcast(&self) -> Vec<u8> {
        self.broadcasts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing was broadcast")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn host(&self) -> &str {
        &self.host
    }

    async fn get_state(
        &self,
        _address: &str,
        tokens: &[Token],
        _pending_hashes: &[String],
    ) -> Result<StateSnapshot, ConnectorError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        *self.state_tokens.lock().unwrap() = tokens.to_vec();
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }
        self.state.lock().unwrap().clone()
    }

    async fn estimate_fee(&self, request: &FeeRequest) -> Result<RawFeeData, ConnectorError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        self.fee_requests.lock().unwrap().push(request.clone());
        self.fee.lock().unwrap().clone()
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ConnectorError> {
        let n = self.broadcast_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = self
            .broadcast_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("tx-{n}")));
        if reply.is_ok() {
            self.broadcasts.lock().unwrap().push(raw_tx.to_vec());
        }
        reply
    }
}

#[async_trait]
impl HistorySource for ScriptedConnector {
    async fn address_history(
        &self,
        _request: &HistoryRequest,
        page: usize,
    ) -> Result<HistoryPage, ConnectorError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let pages = self.history.lock().unwrap();
        pages
            .get(page - 1)
            .cloned()
            .ok_or_else(|| ConnectorError::Transport(format!("{}: no page {page}", self.host)))
    }
}

/// Signs digests with a secp256k1 key, as a hardware wallet would.
pub struct Secp256k1Signer {
    secret: SecretKey,
    pub calls: AtomicUsize,
}

impl Secp256k1Signer {
    pub fn new(seed: u8) -> Self {
        Self {
            secret: SecretKey::from_slice(&[seed; 32]).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.secret.public_key(&Secp256k1::new()).serialize().to_vec()
    }
}

#[async_trait]
impl Signer for Secp256k1Signer {
    async fn sign(&self, hashes: &[Vec<u8>], public_key: &[u8]) -> Result<Vec<Vec<u8>>, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if public_key != self.public_key().as_slice() {
            return Err(SignerError::new("unknown public key"));
        }
        let secp = Secp256k1::new();
        hashes
            .iter()
            .map(|hash| {
                let digest: [u8; 32] = hash
                    .as_slice()
                    .try_into()
                    .map_err(|_| SignerError::new("expected a 32-byte digest"))?;
                let sig = secp.sign_ecdsa(&Message::from_digest(digest), &self.secret);
                Ok(sig.serialize_compact().to_vec())
            })
            .collect()
    }
}

pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    pub fn new(seed: u8) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(&[seed; 32]),
        }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, hashes: &[Vec<u8>], _public_key: &[u8]) -> Result<Vec<Vec<u8>>, SignerError> {
        Ok(hashes
            .iter()
            .map(|payload| self.key.sign(payload).to_bytes().to_vec())
            .collect())
    }
}

/// Waits for a confirmation that never comes, as a user walking away from
/// a hardware wallet would.
pub struct StalledSigner {
    pub asked: Notify,
}

impl StalledSigner {
    pub fn new() -> Self {
        Self {
            asked: Notify::new(),
        }
    }
}

#[async_trait]
impl Signer for StalledSigner {
    async fn sign(&self, _hashes: &[Vec<u8>], _public_key: &[u8]) -> Result<Vec<Vec<u8>>, SignerError> {
        self.asked.notify_one();
        std::future::pending().await
    }
}

/// A signer whose user always declines.
pub struct RefusingSigner;

#[async_trait]
impl Signer for RefusingSigner {
    async fn sign(&self, _hashes: &[Vec<u8>], _public_key: &[u8]) -> Result<Vec<Vec<u8>>, SignerError> {
        Err(SignerError::new("user cancelled"))
    }
}
