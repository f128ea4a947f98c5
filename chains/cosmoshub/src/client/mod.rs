//! Chain client capability.
//!
//! The engine and the sweeper only talk to [`ChainClient`]. The production
//! implementation, [`CosmosClient`], reads through the LCD REST API and
//! broadcasts through the `gaiad` binary so signing stays in its keyring.

pub mod gaiad;
pub mod lcd;

use crate::utils::gas::TxKind;
use crate::wallet::Wallet;
use async_trait::async_trait;
use core_logic::{NetworkError, RpcEndpoint};
use thiserror::Error;

pub use gaiad::GaiadCli;
pub use lcd::LcdClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Unparsable response from {endpoint}: {reason}")]
    Parse { endpoint: String, reason: String },

    #[error("Command '{command}' failed: {reason}")]
    Command { command: String, reason: String },
}

/// A state-changing operation the sweeper submits for a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    WithdrawAllRewards,
    Send { to: String, amount: u64 },
}

impl Operation {
    pub fn kind(&self) -> TxKind {
        match self {
            Operation::WithdrawAllRewards => TxKind::Withdraw,
            Operation::Send { .. } => TxKind::Send,
        }
    }
}

/// How the node answered a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Accepted into the mempool; inclusion is still unknown.
    Broadcast { hash: String },
    /// Refused during CheckTx with a non-zero code.
    CheckTxFailed {
        hash: String,
        code: u32,
        raw_log: String,
    },
    /// No transaction hash could be read from the response.
    Malformed { output: String },
}

/// Inclusion result of a transaction found on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    pub code: u32,
    pub raw_log: String,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub network: String,
    pub latest_block_height: u64,
    pub catching_up: bool,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Spendable balance in the staking denom.
    async fn query_balance(&self, endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError>;

    /// Pending staking rewards across all validators, truncated to whole units.
    async fn query_rewards(&self, endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError>;

    /// Sign and broadcast `operation` for `wallet`. Transport failures surface
    /// as [`SubmitResult::Malformed`].
    async fn submit(
        &self,
        endpoint: &RpcEndpoint,
        wallet: &Wallet,
        operation: &Operation,
        fee: u64,
        gas: u64,
    ) -> SubmitResult;

    /// `Ok(None)` when this node has not indexed the transaction (yet).
    async fn query_tx(&self, endpoint: &RpcEndpoint, hash: &str)
        -> Result<Option<TxStatus>, ChainError>;

    async fn node_status(&self, endpoint: &RpcEndpoint) -> Result<NodeStatus, ChainError>;

    /// Address of a key held in the signing keyring.
    async fn key_address(&self, key_name: &str) -> Result<String, ChainError>;
}

/// LCD queries plus `gaiad` broadcasts.
pub struct CosmosClient {
    lcd: LcdClient,
    cli: GaiadCli,
}

impl CosmosClient {
    pub fn new(lcd: LcdClient, cli: GaiadCli) -> Self {
        Self { lcd, cli }
    }
}

#[async_trait]
impl ChainClient for CosmosClient {
    async fn query_balance(&self, endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError> {
        self.lcd.balance(&endpoint.api_url, address).await
    }

    async fn query_rewards(&self, endpoint: &RpcEndpoint, address: &str) -> Result<u64, ChainError> {
        self.lcd.rewards(&endpoint.api_url, address).await
    }

    async fn submit(
        &self,
        endpoint: &RpcEndpoint,
        wallet: &Wallet,
        operation: &Operation,
        fee: u64,
        gas: u64,
    ) -> SubmitResult {
        self.cli
            .broadcast(&endpoint.rpc_url, wallet, operation, fee, gas)
            .await
    }

    async fn query_tx(
        &self,
        endpoint: &RpcEndpoint,
        hash: &str,
    ) -> Result<Option<TxStatus>, ChainError> {
        self.lcd.tx(&endpoint.api_url, hash).await
    }

    async fn node_status(&self, endpoint: &RpcEndpoint) -> Result<NodeStatus, ChainError> {
        self.lcd.node_status(&endpoint.rpc_url).await
    }

    async fn key_address(&self, key_name: &str) -> Result<String, ChainError> {
        self.cli.key_address(key_name).await
    }
}
