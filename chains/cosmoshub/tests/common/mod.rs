#![allow(dead_code)]

use async_trait::async_trait;
use core_logic::{
    Destination, EndpointConfig, EventSink, RpcEndpoint, RpcManager, TxEvent, TxEventOutcome,
    WalletEvent,
};
use cosmoshub_sweeper::client::{
    ChainClient, ChainError, NodeStatus, Operation, SubmitResult, TxStatus,
};
use cosmoshub_sweeper::engine::{KindPolicy, TxLifecycle};
use cosmoshub_sweeper::utils::gas::{FixedProbe, GasEstimator};
use cosmoshub_sweeper::wallet::Wallet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub rpc_url: String,
    pub wallet: String,
    pub operation: Operation,
    pub fee: u64,
    pub gas: u64,
}

/// Replays scripted chain answers in order and records every call.
///
/// Balance and reward scripts keep answering with their last entry once
/// drained. Transaction lookups answer `Ok(None)` once drained.
#[derive(Default)]
pub struct MockChainClient {
    balances: Mutex<HashMap<String, VecDeque<Result<u64, ChainError>>>>,
    rewards: Mutex<HashMap<String, VecDeque<Result<u64, ChainError>>>>,
    submits: Mutex<VecDeque<SubmitResult>>,
    lookups: Mutex<VecDeque<Result<Option<TxStatus>, ChainError>>>,
    statuses: Mutex<HashMap<String, Result<NodeStatus, ChainError>>>,
    keys: Mutex<HashMap<String, String>>,
    pub submissions: Mutex<Vec<Submission>>,
    pub tx_queries: Mutex<Vec<(String, String)>>,
    pub balance_queries: Mutex<Vec<String>>,
}

fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(self, address: &str, answers: Vec<Result<u64, ChainError>>) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), answers.into());
        self
    }

    pub fn with_rewards(self, address: &str, answers: Vec<Result<u64, ChainError>>) -> Self {
        self.rewards
            .lock()
            .unwrap()
            .insert(address.to_string(), answers.into());
        self
    }

    pub fn with_submits(self, answers: Vec<SubmitResult>) -> Self {
        self.submits.lock().unwrap().extend(answers);
        self
    }

    pub fn with_lookups(self, answers: Vec<Result<Option<TxStatus>, ChainError>>) -> Self {
        self.lookups.lock().unwrap().extend(answers);
        self
    }

    pub fn with_status(self, rpc_url: &str, answer: Result<NodeStatus, ChainError>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(rpc_url.to_string(), answer);
        self
    }

    pub fn with_key(self, name: &str, address: &str) -> Self {
        self.keys
            .lock()
            .unwrap()
            .insert(name.to_string(), address.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn tx_queries(&self) -> Vec<(String, String)> {
        self.tx_queries.lock().unwrap().clone()
    }
}

fn unscripted(what: &str) -> ChainError {
    ChainError::Parse {
        endpoint: "mock".to_string(),
        reason: format!("no scripted {}", what),
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn query_balance(&self, _endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError> {
        self.balance_queries.lock().unwrap().push(address.to_string());
        let mut balances = self.balances.lock().unwrap();
        balances
            .get_mut(address)
            .and_then(next_sticky)
            .unwrap_or_else(|| Err(unscripted("balance")))
    }

    async fn query_rewards(&self, _endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError> {
        let mut rewards = self.rewards.lock().unwrap();
        rewards
            .get_mut(address)
            .and_then(next_sticky)
            .unwrap_or(Ok(0))
    }

    async fn submit(
        &self,
        endpoint: &RpcEndpoint,
        wallet: &Wallet,
        operation: &Operation,
        fee: u64,
        gas: u64,
    ) -> SubmitResult {
        self.submissions.lock().unwrap().push(Submission {
            rpc_url: endpoint.rpc_url.clone(),
            wallet: wallet.name.clone(),
            operation: operation.clone(),
            fee,
            gas,
        });
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitResult::Malformed {
                output: "no scripted submit".to_string(),
            })
    }

    async fn query_tx(
        &self,
        endpoint: &RpcEndpoint,
        hash: &str,
    ) -> Result<Option<TxStatus>, ChainError> {
        self.tx_queries
            .lock()
            .unwrap()
            .push((endpoint.api_url.clone(), hash.to_string()));
        self.lookups.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn node_status(&self, endpoint: &RpcEndpoint) -> Result<NodeStatus, ChainError> {
        self.statuses
            .lock()
            .unwrap()
            .get(&endpoint.rpc_url)
            .cloned()
            .unwrap_or_else(|| Err(unscripted("status")))
    }

    async fn key_address(&self, key_name: &str) -> Result<String, ChainError> {
        self.keys
            .lock()
            .unwrap()
            .get(key_name)
            .cloned()
            .ok_or_else(|| ChainError::Command {
                command: format!("gaiad keys show {} -a", key_name),
                reason: "key not found".to_string(),
            })
    }
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub txs: Mutex<Vec<TxEvent>>,
    pub wallets: Mutex<Vec<WalletEvent>>,
}

impl RecordingSink {
    pub fn outcomes(&self) -> Vec<TxEventOutcome> {
        self.txs
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.outcome.clone())
            .collect()
    }

    pub fn wallet_events(&self) -> Vec<WalletEvent> {
        self.wallets.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_tx(&self, event: &TxEvent) {
        self.txs.lock().unwrap().push(event.clone());
    }

    fn on_wallet(&self, event: &WalletEvent) {
        self.wallets.lock().unwrap().push(event.clone());
    }
}

pub const PRICE: f64 = 0.005;

pub fn endpoints(n: usize) -> Vec<EndpointConfig> {
    (1..=n)
        .map(|i| EndpointConfig {
            rpc: format!("http://rpc{}.test:26657", i),
            api: format!("http://api{}.test:1317", i),
        })
        .collect()
}

pub fn rpc_manager(n: usize) -> Arc<RpcManager> {
    Arc::new(RpcManager::with_rng(&endpoints(n), StdRng::seed_from_u64(11)).unwrap())
}

pub fn wallet(index: usize) -> Wallet {
    Wallet {
        index,
        name: format!("Wallet{}", index + 1),
        address: format!("cosmos1wallet{}", index + 1),
        destination: Destination {
            exchange: "OKX".to_string(),
            address: format!("cosmos1okx{}", index + 1),
        },
    }
}

/// Estimator answering 200000 gas for both kinds.
pub fn fixed_estimator() -> GasEstimator {
    GasEstimator::new(Arc::new(FixedProbe {
        withdraw: Some(200_000),
        send: Some(200_000),
    }))
    .with_attempts(1, 0)
}

pub fn lifecycle(
    client: Arc<MockChainClient>,
    rpc: Arc<RpcManager>,
    estimator: GasEstimator,
    sink: Arc<RecordingSink>,
) -> TxLifecycle<MockChainClient> {
    TxLifecycle::new(client, rpc, estimator, PRICE, sink)
}

pub fn fast_policy(max_attempts: u32, confirm_retries: u32, gas_multiplier: f64) -> KindPolicy {
    KindPolicy {
        max_attempts,
        confirm_retries,
        gas_multiplier,
        ..KindPolicy::withdraw()
    }
    .immediate()
}

pub fn found(code: u32, raw_log: &str) -> Result<Option<TxStatus>, ChainError> {
    Ok(Some(TxStatus {
        code,
        raw_log: raw_log.to_string(),
        height: 21_000_000,
    }))
}

pub fn broadcast(hash: &str) -> SubmitResult {
    SubmitResult::Broadcast {
        hash: hash.to_string(),
    }
}

pub const OUT_OF_GAS_LOG: &str =
    "out of gas in location: WriteFlat; gasWanted: 200000, gasUsed: 200931: out of gas";
