use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use core_logic::{with_retry, RetryConfig};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// The two operations the sweeper submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Withdraw,
    Send,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::Withdraw => write!(f, "withdraw"),
            TxKind::Send => write!(f, "send"),
        }
    }
}

/// A value per operation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerKind<T> {
    pub withdraw: T,
    pub send: T,
}

impl<T: Copy> PerKind<T> {
    pub fn get(&self, kind: TxKind) -> T {
        match kind {
            TxKind::Withdraw => self.withdraw,
            TxKind::Send => self.send,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeError {
    #[error("gas must be positive")]
    ZeroGas,

    #[error("gas price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("fee for {gas} gas at {unit_price} overflows")]
    Overflow { gas: u64, unit_price: f64 },
}

/// `floor(gas * unit_price) + 1`; the extra unit keeps truncation from
/// producing a fee below the node's minimum.
pub fn calculate_fee(gas: u64, unit_price: f64) -> Result<u64, FeeError> {
    if gas == 0 {
        return Err(FeeError::ZeroGas);
    }
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return Err(FeeError::InvalidPrice(unit_price));
    }

    let raw = (gas as f64 * unit_price).floor();
    if !raw.is_finite() || raw >= u64::MAX as f64 {
        return Err(FeeError::Overflow { gas, unit_price });
    }

    (raw as u64)
        .checked_add(1)
        .ok_or(FeeError::Overflow { gas, unit_price })
}

/// Next gas budget after an out-of-gas failure. Always strictly larger than
/// `gas`, saturating at `u64::MAX`.
pub fn escalate_gas(gas: u64, multiplier: f64) -> u64 {
    let scaled = (gas as f64 * multiplier).floor();
    let scaled = if scaled.is_finite() && scaled < u64::MAX as f64 {
        scaled as u64
    } else {
        u64::MAX
    };
    scaled.max(gas.saturating_add(1))
}

/// Source of live gas usage figures.
#[async_trait]
pub trait GasProbe: Send + Sync {
    /// Whether the probe can answer for `kind` at all. An unavailable probe
    /// sends the estimator straight to its fallback.
    fn is_available(&self, _kind: TxKind) -> bool {
        true
    }

    /// Raw probe output; parsed by the estimator.
    async fn probe(&self, kind: TxKind) -> Result<String>;
}

/// Runs a shell command per kind and reads the gas figure from stdout.
#[derive(Debug, Clone, Default)]
pub struct ScriptProbe {
    withdraw: Option<String>,
    send: Option<String>,
}

impl ScriptProbe {
    pub fn new(withdraw: Option<String>, send: Option<String>) -> Self {
        Self { withdraw, send }
    }

    fn command(&self, kind: TxKind) -> Option<&str> {
        match kind {
            TxKind::Withdraw => self.withdraw.as_deref(),
            TxKind::Send => self.send.as_deref(),
        }
    }
}

#[async_trait]
impl GasProbe for ScriptProbe {
    fn is_available(&self, kind: TxKind) -> bool {
        self.command(kind).is_some_and(|c| !c.trim().is_empty())
    }

    async fn probe(&self, kind: TxKind) -> Result<String> {
        let command = self
            .command(kind)
            .ok_or_else(|| anyhow!("no {} gas probe configured", kind))?;

        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        if !output.status.success() {
            bail!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Answers with fixed figures; `None` makes that kind unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe {
    pub withdraw: Option<u64>,
    pub send: Option<u64>,
}

impl FixedProbe {
    fn figure(&self, kind: TxKind) -> Option<u64> {
        match kind {
            TxKind::Withdraw => self.withdraw,
            TxKind::Send => self.send,
        }
    }
}

#[async_trait]
impl GasProbe for FixedProbe {
    fn is_available(&self, kind: TxKind) -> bool {
        self.figure(kind).is_some()
    }

    async fn probe(&self, kind: TxKind) -> Result<String> {
        self.figure(kind)
            .map(|gas| gas.to_string())
            .ok_or_else(|| anyhow!("no fixed {} gas figure", kind))
    }
}

/// Accepts a non-negative decimal figure and rounds it to whole gas units.
pub fn parse_gas_output(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| anyhow!("unparsable gas figure '{}'", trimmed))?;

    if !value.is_finite() || value < 0.0 || trimmed.starts_with('-') {
        bail!("gas figure out of range: '{}'", trimmed);
    }
    let gas = value.round();
    if gas < 1.0 || gas >= u64::MAX as f64 {
        bail!("gas figure out of range: '{}'", trimmed);
    }
    Ok(gas as u64)
}

/// Probe-backed gas estimates with fixed per-kind fallbacks.
#[derive(Clone)]
pub struct GasEstimator {
    probe: Arc<dyn GasProbe>,
    fallback: PerKind<u64>,
    max_attempts: u32,
    retry_delay_ms: u64,
}

impl GasEstimator {
    pub const DEFAULT_ATTEMPTS: u32 = 5;
    pub const FALLBACK_WITHDRAW: u64 = 900_000;
    pub const FALLBACK_SEND: u64 = 250_000;

    pub fn new(probe: Arc<dyn GasProbe>) -> Self {
        Self {
            probe,
            fallback: PerKind {
                withdraw: Self::FALLBACK_WITHDRAW,
                send: Self::FALLBACK_SEND,
            },
            max_attempts: Self::DEFAULT_ATTEMPTS,
            retry_delay_ms: 1000,
        }
    }

    pub fn with_fallback(mut self, fallback: PerKind<u64>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_attempts(mut self, max_attempts: u32, retry_delay_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn fallback(&self, kind: TxKind) -> u64 {
        self.fallback.get(kind)
    }

    /// Never fails: after `max_attempts` unusable probe results the per-kind
    /// fallback is returned and a warning is logged.
    pub async fn estimate(&self, kind: TxKind) -> u64 {
        let fallback = self.fallback(kind);

        if !self.probe.is_available(kind) {
            return fallback;
        }

        let retry = RetryConfig::new(self.max_attempts - 1, self.retry_delay_ms)
            .without_jitter()
            .linear();
        let probe = &self.probe;
        let result = with_retry(retry, &format!("{} gas probe", kind), || async move {
            let raw = probe.probe(kind).await?;
            parse_gas_output(&raw)
        })
        .await;

        match result {
            Ok(gas) => {
                info!("Live {} gas estimate: {}", kind, gas);
                gas
            }
            Err(e) => {
                warn!(
                    "No usable {} gas estimate ({:#}). Using fallback {}",
                    kind, e, fallback
                );
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProbe {
        outputs: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GasProbe for ScriptedProbe {
        async fn probe(&self, _kind: TxKind) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outputs.get(n) {
                Some(&"ERR") | None => bail!("probe failed"),
                Some(out) => Ok(out.to_string()),
            }
        }
    }

    fn estimator(outputs: Vec<&'static str>) -> (GasEstimator, Arc<ScriptedProbe>) {
        let probe = Arc::new(ScriptedProbe {
            outputs,
            calls: AtomicU32::new(0),
        });
        let estimator = GasEstimator::new(probe.clone()).with_attempts(5, 0);
        (estimator, probe)
    }

    #[test]
    fn test_fee_rounding() {
        assert_eq!(calculate_fee(900_000, 0.005).unwrap(), 4_501);
        assert_eq!(calculate_fee(250_000, 0.005).unwrap(), 1_251);
        assert_eq!(calculate_fee(1, 0.005).unwrap(), 1);
        assert_eq!(calculate_fee(199, 0.005).unwrap(), 1);
        assert_eq!(calculate_fee(200, 0.005).unwrap(), 2);
    }

    #[test]
    fn test_fee_rejects_bad_input() {
        assert_eq!(calculate_fee(0, 0.005), Err(FeeError::ZeroGas));
        assert_eq!(calculate_fee(10, 0.0), Err(FeeError::InvalidPrice(0.0)));
        assert!(matches!(
            calculate_fee(10, f64::NAN),
            Err(FeeError::InvalidPrice(_))
        ));
        assert!(matches!(
            calculate_fee(u64::MAX, 2.0),
            Err(FeeError::Overflow { .. })
        ));
    }

    #[test]
    fn test_fee_is_at_least_one_and_monotonic() {
        for price in [0.0001, 0.005, 0.025, 0.5, 1.0] {
            let mut previous = 0;
            for gas in (1..200_000u64).step_by(997) {
                let fee = calculate_fee(gas, price).unwrap();
                assert!(fee >= 1);
                assert!(fee >= previous, "fee dropped at gas {} price {}", gas, price);
                previous = fee;
            }
        }
    }

    #[test]
    fn test_escalation_strictly_increases() {
        assert_eq!(escalate_gas(900_000, 1.2), 1_080_000);
        assert_eq!(escalate_gas(250_000, 1.1), 275_000);
        assert_eq!(escalate_gas(5, 1.1), 6);
        assert_eq!(escalate_gas(u64::MAX, 1.2), u64::MAX);

        let mut gas = 100;
        for _ in 0..20 {
            let next = escalate_gas(gas, 1.1);
            assert!(next > gas);
            gas = next;
        }
    }

    #[test]
    fn test_parse_gas_output() {
        assert_eq!(parse_gas_output("231456\n").unwrap(), 231_456);
        assert_eq!(parse_gas_output(" 231456.6 ").unwrap(), 231_457);
        assert!(parse_gas_output("").is_err());
        assert!(parse_gas_output("-5").is_err());
        assert!(parse_gas_output("0").is_err());
        assert!(parse_gas_output("NaN").is_err());
        assert!(parse_gas_output("gas: 12").is_err());
    }

    #[tokio::test]
    async fn test_estimate_uses_probe() {
        let (estimator, probe) = estimator(vec!["812345.4"]);
        assert_eq!(estimator.estimate(TxKind::Withdraw).await, 812_345);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_estimate_retries_unparsable_output() {
        let (estimator, probe) = estimator(vec!["ERR", "garbage", "260000"]);
        assert_eq!(estimator.estimate(TxKind::Send).await, 260_000);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_estimate_falls_back_after_max_attempts() {
        let (estimator, probe) = estimator(vec![]);
        assert_eq!(estimator.estimate(TxKind::Withdraw).await, 900_000);
        assert_eq!(estimator.estimate(TxKind::Send).await, 250_000);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_unavailable_probe_is_not_called() {
        let estimator = GasEstimator::new(Arc::new(ScriptProbe::new(None, None)))
            .with_fallback(PerKind {
                withdraw: 700_000,
                send: 200_000,
            });
        assert_eq!(estimator.estimate(TxKind::Withdraw).await, 700_000);
        assert_eq!(estimator.estimate(TxKind::Send).await, 200_000);
    }

    #[tokio::test]
    async fn test_fixed_probe() {
        let estimator = GasEstimator::new(Arc::new(FixedProbe {
            withdraw: Some(640_000),
            send: None,
        }));
        assert_eq!(estimator.estimate(TxKind::Withdraw).await, 640_000);
        assert_eq!(estimator.estimate(TxKind::Send).await, 250_000);
    }

    #[tokio::test]
    async fn test_script_probe_reads_stdout() {
        let probe = ScriptProbe::new(Some("echo 345678".to_string()), None);
        assert!(probe.is_available(TxKind::Withdraw));
        assert!(!probe.is_available(TxKind::Send));

        let estimator = GasEstimator::new(Arc::new(probe)).with_attempts(1, 0);
        assert_eq!(estimator.estimate(TxKind::Withdraw).await, 345_678);
    }
}
