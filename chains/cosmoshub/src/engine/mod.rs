//! Transaction lifecycle and fee escalation.
//!
//! [`TxLifecycle::run`] drives one operation for one wallet from gas
//! estimation to a terminal [`TxOutcome`]. Only one attempt is ever in flight:
//! each submission is resolved before the next one is made.

pub mod classify;

use crate::client::{ChainClient, Operation, SubmitResult, TxStatus};
use crate::utils::gas::{calculate_fee, escalate_gas, GasEstimator, TxKind};
use crate::wallet::Wallet;
use classify::{classify, Verdict};
use core_logic::{EventSink, RpcManager, TxEvent, TxEventOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry and polling limits for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindPolicy {
    /// Submissions allowed, first one included.
    pub max_attempts: u32,
    /// Polling rounds over every endpoint before giving up.
    pub confirm_retries: u32,
    pub confirm_wait: Duration,
    /// Pause between a broadcast and the first polling round.
    pub settle_wait: Duration,
    /// Gas growth factor after an out-of-gas failure. Must exceed 1.0.
    pub gas_multiplier: f64,
}

impl KindPolicy {
    pub fn withdraw() -> Self {
        Self {
            max_attempts: 3,
            confirm_retries: 10,
            confirm_wait: Duration::from_secs(30),
            settle_wait: Duration::from_secs(30),
            gas_multiplier: 1.2,
        }
    }

    pub fn send() -> Self {
        Self {
            gas_multiplier: 1.1,
            ..Self::withdraw()
        }
    }

    /// Same limits with every wait set to zero.
    pub fn immediate(self) -> Self {
        Self {
            confirm_wait: Duration::ZERO,
            settle_wait: Duration::ZERO,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct TxRequest {
    pub wallet: Wallet,
    pub operation: Operation,
    /// Last known spendable balance.
    pub balance: u64,
    /// Gas from an earlier estimate. Estimated afresh when `None`.
    pub initial_gas: Option<u64>,
}

/// Terminal result of a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed {
        hash: String,
    },
    Rejected {
        hash: Option<String>,
        code: Option<u32>,
        message: String,
    },
    /// Never seen on any endpoint, or out-of-gas retries exhausted.
    Unconfirmed {
        hash: String,
    },
    InsufficientFunds {
        balance: u64,
        fee: u64,
    },
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }

    fn event_outcome(&self) -> TxEventOutcome {
        match self {
            TxOutcome::Confirmed { .. } => TxEventOutcome::Confirmed,
            TxOutcome::Rejected { code, message, .. } => TxEventOutcome::Rejected {
                code: *code,
                message: message.clone(),
            },
            TxOutcome::Unconfirmed { .. } => TxEventOutcome::Unconfirmed,
            TxOutcome::InsufficientFunds { balance, .. } => {
                TxEventOutcome::InsufficientFunds { balance: *balance }
            }
        }
    }

    fn hash(&self) -> Option<String> {
        match self {
            TxOutcome::Confirmed { hash } | TxOutcome::Unconfirmed { hash } => Some(hash.clone()),
            TxOutcome::Rejected { hash, .. } => hash.clone(),
            TxOutcome::InsufficientFunds { .. } => None,
        }
    }
}

/// Where a single submission ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Confirmed,
    OutOfGas,
    Rejected,
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxAttempt {
    pub hash: Option<String>,
    pub gas: u64,
    pub fee: u64,
    pub state: AttemptState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    pub outcome: TxOutcome,
    pub attempts: Vec<TxAttempt>,
}

impl LifecycleReport {
    pub fn is_confirmed(&self) -> bool {
        self.outcome.is_confirmed()
    }

    /// Gas used by each submission, in order.
    pub fn gas_sequence(&self) -> Vec<u64> {
        self.attempts.iter().map(|a| a.gas).collect()
    }
}

pub struct TxLifecycle<C> {
    client: Arc<C>,
    rpc: Arc<RpcManager>,
    estimator: GasEstimator,
    gas_price: f64,
    sink: Arc<dyn EventSink>,
}

struct Ctx<'a> {
    wallet: &'a Wallet,
    kind: TxKind,
    attempt: u32,
    gas: u64,
    fee: u64,
}

impl<C: ChainClient> TxLifecycle<C> {
    pub fn new(
        client: Arc<C>,
        rpc: Arc<RpcManager>,
        estimator: GasEstimator,
        gas_price: f64,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            rpc,
            estimator,
            gas_price,
            sink,
        }
    }

    pub fn estimator(&self) -> &GasEstimator {
        &self.estimator
    }

    pub fn gas_price(&self) -> f64 {
        self.gas_price
    }

    pub async fn run(&self, request: &TxRequest, policy: &KindPolicy) -> LifecycleReport {
        let wallet = &request.wallet;
        let kind = request.operation.kind();
        let mut balance = request.balance;
        let mut attempts = Vec::new();
        let mut ctx = Ctx {
            wallet,
            kind,
            attempt: 1,
            gas: match request.initial_gas {
                Some(gas) => gas,
                None => self.estimator.estimate(kind).await,
            },
            fee: 0,
        };

        loop {
            ctx.fee = match calculate_fee(ctx.gas, self.gas_price) {
                Ok(fee) => fee,
                Err(e) => {
                    let outcome = TxOutcome::Rejected {
                        hash: None,
                        code: None,
                        message: format!("fee calculation failed: {}", e),
                    };
                    return self.finish(&ctx, outcome, attempts);
                }
            };

            if balance < ctx.fee {
                info!(
                    "[{}] {} skipped: balance {} below fee {}",
                    wallet.name, kind, balance, ctx.fee
                );
                let outcome = TxOutcome::InsufficientFunds {
                    balance,
                    fee: ctx.fee,
                };
                return self.finish(&ctx, outcome, attempts);
            }

            let endpoint = self.rpc.pick();
            debug!(
                "[{}] {} attempt {} via {} (gas {}, fee {})",
                wallet.name, kind, ctx.attempt, endpoint.rpc_url, ctx.gas, ctx.fee
            );

            let (hash, status) = match self
                .client
                .submit(endpoint, wallet, &request.operation, ctx.fee, ctx.gas)
                .await
            {
                SubmitResult::Malformed { output } => {
                    warn!("[{}] {} broadcast unreadable: {}", wallet.name, kind, output);
                    attempts.push(TxAttempt {
                        hash: None,
                        gas: ctx.gas,
                        fee: ctx.fee,
                        state: AttemptState::Rejected,
                    });
                    let outcome = TxOutcome::Rejected {
                        hash: None,
                        code: None,
                        message: format!("no transaction hash in broadcast output: {}", output),
                    };
                    return self.finish(&ctx, outcome, attempts);
                }
                SubmitResult::CheckTxFailed {
                    hash,
                    code,
                    raw_log,
                } => {
                    self.rpc.record_success(&endpoint.rpc_url);
                    self.emit(&ctx, Some(hash.clone()), TxEventOutcome::Submitted);
                    let status = TxStatus {
                        code,
                        raw_log,
                        height: 0,
                    };
                    (hash, Some(status))
                }
                SubmitResult::Broadcast { hash } => {
                    self.rpc.record_success(&endpoint.rpc_url);
                    info!("[{}] {} broadcast: {}", wallet.name, kind, hash);
                    self.emit(&ctx, Some(hash.clone()), TxEventOutcome::Submitted);
                    let status = self.await_confirmation(&hash, policy).await;
                    (hash, status)
                }
            };

            let Some(status) = status else {
                attempts.push(self.attempt(&ctx, &hash, AttemptState::Unconfirmed));
                return self.finish(&ctx, TxOutcome::Unconfirmed { hash }, attempts);
            };

            match classify(status.code, &status.raw_log) {
                Verdict::Success => {
                    attempts.push(self.attempt(&ctx, &hash, AttemptState::Confirmed));
                    return self.finish(&ctx, TxOutcome::Confirmed { hash }, attempts);
                }
                Verdict::Failed => {
                    attempts.push(self.attempt(&ctx, &hash, AttemptState::Rejected));
                    let outcome = TxOutcome::Rejected {
                        hash: Some(hash),
                        code: Some(status.code),
                        message: status.raw_log,
                    };
                    return self.finish(&ctx, outcome, attempts);
                }
                Verdict::OutOfGas => {
                    attempts.push(self.attempt(&ctx, &hash, AttemptState::OutOfGas));
                    self.emit(&ctx, Some(hash.clone()), TxEventOutcome::OutOfGas);

                    if ctx.attempt >= policy.max_attempts {
                        warn!(
                            "[{}] {} still out of gas after {} attempts",
                            wallet.name, kind, ctx.attempt
                        );
                        return self.finish(&ctx, TxOutcome::Unconfirmed { hash }, attempts);
                    }

                    let raised = escalate_gas(ctx.gas, policy.gas_multiplier);
                    info!(
                        "[{}] {} out of gas at {}. Retrying with {}",
                        wallet.name, kind, ctx.gas, raised
                    );
                    ctx.attempt += 1;
                    ctx.gas = raised;
                    balance = self.refresh_balance(wallet, balance).await;
                }
            }
        }
    }

    /// Polls every endpoint in order, round after round, until one of them
    /// has the transaction. `None` when no round found it.
    async fn await_confirmation(&self, hash: &str, policy: &KindPolicy) -> Option<TxStatus> {
        if !policy.settle_wait.is_zero() {
            tokio::time::sleep(policy.settle_wait).await;
        }

        for round in 1..=policy.confirm_retries {
            for endpoint in self.rpc.endpoints() {
                match self.client.query_tx(endpoint, hash).await {
                    Ok(Some(status)) => {
                        self.rpc.record_success(&endpoint.rpc_url);
                        debug!("{} found on {} at height {}", hash, endpoint.api_url, status.height);
                        return Some(status);
                    }
                    Ok(None) => {
                        self.rpc.record_success(&endpoint.rpc_url);
                    }
                    Err(e) => {
                        warn!("Querying {} on {} failed: {}", hash, endpoint.api_url, e);
                        self.rpc.record_failure(&endpoint.rpc_url);
                    }
                }
            }

            debug!(
                "{} not found in round {}/{}",
                hash, round, policy.confirm_retries
            );
            if round < policy.confirm_retries && !policy.confirm_wait.is_zero() {
                tokio::time::sleep(policy.confirm_wait).await;
            }
        }

        warn!(
            "{} not confirmed after {} rounds",
            hash, policy.confirm_retries
        );
        None
    }

    async fn refresh_balance(&self, wallet: &Wallet, known: u64) -> u64 {
        let endpoint = self.rpc.pick();
        match self.client.query_balance(endpoint, &wallet.address).await {
            Ok(balance) => {
                self.rpc.record_success(&endpoint.rpc_url);
                balance
            }
            Err(e) => {
                warn!(
                    "[{}] balance refresh failed, keeping {}: {}",
                    wallet.name, known, e
                );
                self.rpc.record_failure(&endpoint.rpc_url);
                known
            }
        }
    }

    fn attempt(&self, ctx: &Ctx<'_>, hash: &str, state: AttemptState) -> TxAttempt {
        TxAttempt {
            hash: Some(hash.to_string()),
            gas: ctx.gas,
            fee: ctx.fee,
            state,
        }
    }

    fn emit(&self, ctx: &Ctx<'_>, hash: Option<String>, outcome: TxEventOutcome) {
        self.sink.on_tx(&TxEvent {
            wallet: ctx.wallet.name.clone(),
            kind: ctx.kind.to_string(),
            attempt: ctx.attempt,
            gas: ctx.gas,
            fee: ctx.fee,
            hash,
            outcome,
        });
    }

    fn finish(
        &self,
        ctx: &Ctx<'_>,
        outcome: TxOutcome,
        attempts: Vec<TxAttempt>,
    ) -> LifecycleReport {
        self.emit(ctx, outcome.hash(), outcome.event_outcome());
        LifecycleReport { outcome, attempts }
    }
}
