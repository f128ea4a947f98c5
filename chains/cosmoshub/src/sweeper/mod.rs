//! Per-wallet sweep: withdraw rewards above a threshold, then forward the
//! balance above a random reserve to the wallet's destination.

use crate::client::{ChainClient, Operation};
use crate::engine::{KindPolicy, TxLifecycle, TxOutcome, TxRequest};
use crate::utils::allocator::{allocate, min_send_threshold};
use crate::utils::gas::{calculate_fee, TxKind};
use crate::wallet::Wallet;
use anyhow::{Context, Result};
use core_logic::{
    is_transient_error, with_retry_if, EventSink, MetricsCollector, MetricsSnapshot, RetryConfig,
    RpcManager, TxEvent, TxEventOutcome, WalletEvent,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub min_rewards_to_withdraw: u64,
    pub min_reserve: u64,
    pub max_reserve: u64,
    /// Added to the send fee to get the smallest worthwhile transfer.
    pub send_margin: u64,
    /// Lower bound for the smallest worthwhile transfer.
    pub min_send_amount: u64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub dry_run: bool,
    pub skip_rewards: bool,
    pub withdraw_policy: KindPolicy,
    pub send_policy: KindPolicy,
    pub query_retry: RetryConfig,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min_rewards_to_withdraw: 700_000,
            min_reserve: 15_000,
            max_reserve: 25_000,
            send_margin: 3_000,
            min_send_amount: 50_000,
            min_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(7200),
            dry_run: false,
            skip_rewards: false,
            withdraw_policy: KindPolicy::withdraw(),
            send_policy: KindPolicy::send(),
            query_retry: RetryConfig::new(2, 1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRunResult {
    pub wallet: String,
    pub reward_withdrawn: bool,
    pub amount_sent: u64,
    pub action_performed: bool,
    pub withdraw: Option<TxOutcome>,
    pub send: Option<TxOutcome>,
    pub error: Option<String>,
}

impl WalletRunResult {
    fn new(wallet: &Wallet) -> Self {
        Self {
            wallet: wallet.name.clone(),
            reward_withdrawn: false,
            amount_sent: 0,
            action_performed: false,
            withdraw: None,
            send: None,
            error: None,
        }
    }

    fn event(&self) -> WalletEvent {
        WalletEvent {
            wallet: self.wallet.clone(),
            reward_withdrawn: self.reward_withdrawn,
            amount_sent: self.amount_sent,
            action_performed: self.action_performed,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub results: Vec<WalletRunResult>,
    pub metrics: Option<MetricsSnapshot>,
}

impl SweepSummary {
    pub fn with_action(&self) -> usize {
        self.results.iter().filter(|r| r.action_performed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

pub struct WalletSweeper<C> {
    client: Arc<C>,
    rpc: Arc<RpcManager>,
    lifecycle: TxLifecycle<C>,
    sink: Arc<dyn EventSink>,
    metrics: Option<Arc<MetricsCollector>>,
    settings: SweepSettings,
    rng: StdRng,
}

impl<C: ChainClient> WalletSweeper<C> {
    pub fn new(
        client: Arc<C>,
        rpc: Arc<RpcManager>,
        lifecycle: TxLifecycle<C>,
        sink: Arc<dyn EventSink>,
        settings: SweepSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            rpc,
            lifecycle,
            sink,
            metrics: None,
            settings,
            rng,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Processes every wallet once, in an order drawn from the sweeper's RNG.
    pub async fn run(&mut self, mut wallets: Vec<Wallet>) -> SweepSummary {
        wallets.shuffle(&mut self.rng);
        let total = wallets.len();
        info!("Sweeping {} wallets", total);

        let mut results = Vec::with_capacity(total);
        for (i, wallet) in wallets.iter().enumerate() {
            info!(
                "[{}] Processing {}/{} -> {}",
                wallet.name,
                i + 1,
                total,
                wallet.destination.exchange
            );

            let result = match self.process_wallet(wallet).await {
                Ok(result) => result,
                Err(e) => {
                    error!("[{}] FAILED: {:#}", wallet.name, e);
                    WalletRunResult {
                        error: Some(format!("{:#}", e)),
                        ..WalletRunResult::new(wallet)
                    }
                }
            };
            self.sink.on_wallet(&result.event());

            if result.action_performed {
                info!("[{}] Done with actions", wallet.name);
                if i + 1 < total {
                    let delay = self.draw_delay();
                    info!("[{}] Waiting {}s before the next wallet", wallet.name, delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            } else {
                info!("[{}] Done without actions", wallet.name);
            }
            results.push(result);
        }

        SweepSummary {
            results,
            metrics: self.metrics.as_ref().map(|m| m.snapshot()),
        }
    }

    pub async fn process_wallet(&mut self, wallet: &Wallet) -> Result<WalletRunResult> {
        let mut result = WalletRunResult::new(wallet);
        let estimator = self.lifecycle.estimator().clone();
        let gas_price = self.lifecycle.gas_price();

        let balance = self.query_balance(wallet).await?;
        let withdraw_gas = estimator.estimate(TxKind::Withdraw).await;
        let withdraw_fee =
            calculate_fee(withdraw_gas, gas_price).context("Withdraw fee calculation failed")?;
        info!(
            "[{}] Balance {} uatom, withdraw fee {} uatom",
            wallet.name, balance, withdraw_fee
        );

        if balance < withdraw_fee {
            info!(
                "[{}] Balance {} below withdraw fee {}. Skipping",
                wallet.name, balance, withdraw_fee
            );
            return Ok(result);
        }

        if self.settings.skip_rewards {
            info!("[{}] Reward withdrawal disabled", wallet.name);
        } else {
            let rewards = self.query_rewards(wallet).await?;
            if rewards >= self.settings.min_rewards_to_withdraw {
                if self.settings.dry_run {
                    info!("[{}] [DRY RUN] Would withdraw {} uatom", wallet.name, rewards);
                    self.emit_dry_run(wallet, TxKind::Withdraw, withdraw_gas, withdraw_fee);
                } else {
                    let request = TxRequest {
                        wallet: wallet.clone(),
                        operation: Operation::WithdrawAllRewards,
                        balance,
                        initial_gas: Some(withdraw_gas),
                    };
                    let report = self
                        .lifecycle
                        .run(&request, &self.settings.withdraw_policy)
                        .await;
                    if report.is_confirmed() {
                        info!("[{}] SUCCESS withdrew {} uatom", wallet.name, rewards);
                        result.reward_withdrawn = true;
                    } else {
                        warn!("[{}] Withdrawal ended {:?}", wallet.name, report.outcome);
                    }
                    result.withdraw = Some(report.outcome);
                }
            } else {
                info!(
                    "[{}] Rewards {} below {}. Not withdrawing",
                    wallet.name, rewards, self.settings.min_rewards_to_withdraw
                );
            }
        }

        let balance = self.query_balance(wallet).await?;
        let allocation = allocate(
            balance,
            self.settings.min_reserve,
            self.settings.max_reserve,
            &mut self.rng,
        );
        let send_gas = estimator.estimate(TxKind::Send).await;
        let send_fee = calculate_fee(send_gas, gas_price).context("Send fee calculation failed")?;
        let threshold = min_send_threshold(
            send_fee,
            self.settings.send_margin,
            self.settings.min_send_amount,
        );

        if balance < send_fee {
            info!(
                "[{}] Balance {} cannot cover the send fee {}. Skipping transfer",
                wallet.name, balance, send_fee
            );
        } else if allocation.send_amount < threshold {
            info!(
                "[{}] Send amount {} below minimum {}. Skipping transfer",
                wallet.name, allocation.send_amount, threshold
            );
        } else if self.settings.dry_run {
            info!(
                "[{}] [DRY RUN] Would send {} uatom to {} ({}), keeping {}",
                wallet.name,
                allocation.send_amount,
                wallet.destination.exchange,
                wallet.destination.address,
                allocation.reserve
            );
            self.emit_dry_run(wallet, TxKind::Send, send_gas, send_fee);
        } else {
            let request = TxRequest {
                wallet: wallet.clone(),
                operation: Operation::Send {
                    to: wallet.destination.address.clone(),
                    amount: allocation.send_amount,
                },
                balance,
                initial_gas: Some(send_gas),
            };
            let report = self.lifecycle.run(&request, &self.settings.send_policy).await;
            if report.is_confirmed() {
                info!(
                    "[{}] SUCCESS sent {} uatom to {}",
                    wallet.name, allocation.send_amount, wallet.destination.exchange
                );
                result.amount_sent = allocation.send_amount;
            } else {
                warn!("[{}] Transfer ended {:?}", wallet.name, report.outcome);
            }
            result.send = Some(report.outcome);
        }

        result.action_performed = result.reward_withdrawn || result.amount_sent > 0;
        Ok(result)
    }

    fn emit_dry_run(&self, wallet: &Wallet, kind: TxKind, gas: u64, fee: u64) {
        self.sink.on_tx(&TxEvent {
            wallet: wallet.name.clone(),
            kind: kind.to_string(),
            attempt: 0,
            gas,
            fee,
            hash: None,
            outcome: TxEventOutcome::DryRun,
        });
    }

    fn draw_delay(&mut self) -> Duration {
        let low = self.settings.min_delay.min(self.settings.max_delay);
        let high = self.settings.min_delay.max(self.settings.max_delay);
        if low == high {
            return low;
        }
        let millis = self
            .rng
            .gen_range(low.as_millis() as u64..=high.as_millis() as u64);
        Duration::from_millis(millis)
    }

    async fn query_balance(&self, wallet: &Wallet) -> Result<u64> {
        let label = format!("[{}] balance query", wallet.name);
        with_retry_if(self.settings.query_retry, &label, is_transient_error, || async move {
            let endpoint = self.rpc.pick();
            match self.client.query_balance(endpoint, &wallet.address).await {
                Ok(balance) => {
                    self.rpc.record_success(&endpoint.rpc_url);
                    Ok(balance)
                }
                Err(e) => {
                    self.rpc.record_failure(&endpoint.rpc_url);
                    Err(e.into())
                }
            }
        })
        .await
    }

    async fn query_rewards(&self, wallet: &Wallet) -> Result<u64> {
        let label = format!("[{}] rewards query", wallet.name);
        with_retry_if(self.settings.query_retry, &label, is_transient_error, || async move {
            let endpoint = self.rpc.pick();
            match self.client.query_rewards(endpoint, &wallet.address).await {
                Ok(rewards) => {
                    self.rpc.record_success(&endpoint.rpc_url);
                    Ok(rewards)
                }
                Err(e) => {
                    self.rpc.record_failure(&endpoint.rpc_url);
                    Err(e.into())
                }
            }
        })
        .await
    }
}
