use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// What happened to one transaction attempt, or how the whole lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxEventOutcome {
    Submitted,
    OutOfGas,
    Confirmed,
    Rejected { code: Option<u32>, message: String },
    Unconfirmed,
    InsufficientFunds { balance: u64 },
    DryRun,
}

/// Structured per-attempt record handed to the observability layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxEvent {
    pub wallet: String,
    pub kind: String,
    pub attempt: u32,
    pub gas: u64,
    pub fee: u64,
    pub hash: Option<String>,
    pub outcome: TxEventOutcome,
}

/// End-of-wallet record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletEvent {
    pub wallet: String,
    pub reward_withdrawn: bool,
    pub amount_sent: u64,
    pub action_performed: bool,
    pub error: Option<String>,
}

/// Observability capability passed to the components that report progress.
pub trait EventSink: Send + Sync {
    fn on_tx(&self, event: &TxEvent);

    fn on_wallet(&self, _event: &WalletEvent) {}
}

#[async_trait]
pub trait WalletLoader: Send + Sync {
    type Wallet;

    /// Load the wallets to process, in their canonical order.
    async fn load_wallets(&self) -> Result<Vec<Self::Wallet>>;
}
