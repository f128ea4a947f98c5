use crate::traits::{TxEvent, TxEventOutcome, WalletEvent};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: u64,
    pub transactions: TxMetrics,
    pub wallets: WalletMetrics,
    pub rpc: RpcMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxMetrics {
    pub submitted: u64,
    pub confirmed: u64,
    pub rejected: u64,
    pub unconfirmed: u64,
    pub out_of_gas_retries: u64,
    pub insufficient_funds: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletMetrics {
    pub processed: u64,
    pub with_action: u64,
    pub failed: u64,
    pub rewards_withdrawn: u64,
    pub amount_sent: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcMetrics {
    pub total_calls: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    tx_submitted: AtomicU64,
    tx_confirmed: AtomicU64,
    tx_rejected: AtomicU64,
    tx_unconfirmed: AtomicU64,
    out_of_gas_retries: AtomicU64,
    insufficient_funds: AtomicU64,
    wallets_processed: AtomicU64,
    wallets_with_action: AtomicU64,
    wallets_failed: AtomicU64,
    rewards_withdrawn: AtomicU64,
    amount_sent: AtomicU64,
    rpc_calls: AtomicU64,
    rpc_latency_sum_ms: AtomicU64,
    rpc_min_latency_ms: AtomicU64,
    rpc_max_latency_ms: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            tx_submitted: AtomicU64::new(0),
            tx_confirmed: AtomicU64::new(0),
            tx_rejected: AtomicU64::new(0),
            tx_unconfirmed: AtomicU64::new(0),
            out_of_gas_retries: AtomicU64::new(0),
            insufficient_funds: AtomicU64::new(0),
            wallets_processed: AtomicU64::new(0),
            wallets_with_action: AtomicU64::new(0),
            wallets_failed: AtomicU64::new(0),
            rewards_withdrawn: AtomicU64::new(0),
            amount_sent: AtomicU64::new(0),
            rpc_calls: AtomicU64::new(0),
            rpc_latency_sum_ms: AtomicU64::new(0),
            rpc_min_latency_ms: AtomicU64::new(u64::MAX),
            rpc_max_latency_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tx(&self, event: &TxEvent) {
        let counter = match event.outcome {
            TxEventOutcome::Submitted => &self.tx_submitted,
            TxEventOutcome::OutOfGas => &self.out_of_gas_retries,
            TxEventOutcome::Confirmed => &self.tx_confirmed,
            TxEventOutcome::Rejected { .. } => &self.tx_rejected,
            TxEventOutcome::Unconfirmed => &self.tx_unconfirmed,
            TxEventOutcome::InsufficientFunds { .. } => &self.insufficient_funds,
            TxEventOutcome::DryRun => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_wallet(&self, event: &WalletEvent) {
        self.wallets_processed.fetch_add(1, Ordering::SeqCst);
        if event.action_performed {
            self.wallets_with_action.fetch_add(1, Ordering::SeqCst);
        }
        if event.error.is_some() {
            self.wallets_failed.fetch_add(1, Ordering::SeqCst);
        }
        if event.reward_withdrawn {
            self.rewards_withdrawn.fetch_add(1, Ordering::SeqCst);
        }
        self.amount_sent
            .fetch_add(event.amount_sent, Ordering::SeqCst);
    }

    pub fn record_rpc_latency(&self, latency: Duration) {
        self.rpc_calls.fetch_add(1, Ordering::SeqCst);
        self.rpc_latency_sum_ms
            .fetch_add(latency.as_millis() as u64, Ordering::SeqCst);

        let latency_ms = latency.as_millis() as u64;
        self.rpc_min_latency_ms
            .fetch_min(latency_ms, Ordering::SeqCst);
        self.rpc_max_latency_ms
            .fetch_max(latency_ms, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let confirmed = self.tx_confirmed.load(Ordering::SeqCst);
        let rejected = self.tx_rejected.load(Ordering::SeqCst);
        let unconfirmed = self.tx_unconfirmed.load(Ordering::SeqCst);
        let resolved = confirmed + rejected + unconfirmed;

        let rpc_calls = self.rpc_calls.load(Ordering::SeqCst);
        let rpc_latency = self.rpc_latency_sum_ms.load(Ordering::SeqCst);
        let min_rpc = self.rpc_min_latency_ms.load(Ordering::SeqCst);
        let max_rpc = self.rpc_max_latency_ms.load(Ordering::SeqCst);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.uptime().as_secs(),
            transactions: TxMetrics {
                submitted: self.tx_submitted.load(Ordering::SeqCst),
                confirmed,
                rejected,
                unconfirmed,
                out_of_gas_retries: self.out_of_gas_retries.load(Ordering::SeqCst),
                insufficient_funds: self.insufficient_funds.load(Ordering::SeqCst),
                success_rate: if resolved > 0 {
                    confirmed as f64 / resolved as f64 * 100.0
                } else {
                    0.0
                },
            },
            wallets: WalletMetrics {
                processed: self.wallets_processed.load(Ordering::SeqCst),
                with_action: self.wallets_with_action.load(Ordering::SeqCst),
                failed: self.wallets_failed.load(Ordering::SeqCst),
                rewards_withdrawn: self.rewards_withdrawn.load(Ordering::SeqCst),
                amount_sent: self.amount_sent.load(Ordering::SeqCst),
            },
            rpc: RpcMetrics {
                total_calls: rpc_calls,
                avg_latency_ms: if rpc_calls > 0 {
                    rpc_latency as f64 / rpc_calls as f64
                } else {
                    0.0
                },
                min_latency_ms: if min_rpc == u64::MAX { 0 } else { min_rpc },
                max_latency_ms: max_rpc,
            },
        }
    }

    pub fn to_json(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn export_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json();
        tokio::fs::write(path, json).await
    }

    pub fn tx_confirmed(&self) -> u64 {
        self.tx_confirmed.load(Ordering::SeqCst)
    }

    pub fn tx_submitted(&self) -> u64 {
        self.tx_submitted.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
