use crate::engine::KindPolicy;
use crate::sweeper::SweepSettings;
use crate::utils::gas::{GasEstimator, PerKind, TxKind};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use core_logic::{ChainConfig, ConfigError, DestinationSource, EndpointConfig, RetryConfig};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "SWEEPER";
pub const MAX_WALLETS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub chain: ChainConfig,
    pub endpoints: Vec<EndpointConfig>,
    pub num_wallets: usize,
    /// Fee per gas unit, in the staking denom.
    pub gas_price: f64,
    pub gaiad: GaiadConfig,
    pub destinations: Vec<DestinationSource>,
    pub thresholds: ThresholdConfig,
    pub delays: DelayConfig,
    pub confirmation: ConfirmationConfig,
    #[serde(deserialize_with = "withdraw_kind")]
    pub withdraw: KindConfig,
    #[serde(deserialize_with = "send_kind")]
    pub send: KindConfig,
    /// Probe calls per gas estimate before the fallback is used.
    pub gas_probe_attempts: u32,
    pub dry_run: bool,
    pub skip_rewards: bool,
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GaiadConfig {
    pub binary: String,
    pub keyring_backend: Option<String>,
    pub home: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub min_rewards_to_withdraw: u64,
    pub min_send_amount: u64,
    pub send_margin: u64,
    pub min_reserve: u64,
    pub max_reserve: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub min_secs: u64,
    pub max_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub retries: u32,
    pub wait_secs: u64,
    pub settle_secs: u64,
}

/// Per-operation settings. A `[withdraw]` or `[send]` table only needs the
/// keys it changes; the rest come from that kind's defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindConfig {
    pub max_attempts: u32,
    pub gas_multiplier: f64,
    pub fallback_gas: u64,
    /// Shell command printing a gas figure. An empty string disables the probe.
    pub probe_command: Option<String>,
}

impl KindConfig {
    pub fn withdraw() -> Self {
        Self {
            max_attempts: 3,
            gas_multiplier: 1.2,
            fallback_gas: GasEstimator::FALLBACK_WITHDRAW,
            probe_command: Some("./calculate_gas.sh".to_string()),
        }
    }

    pub fn send() -> Self {
        Self {
            max_attempts: 3,
            gas_multiplier: 1.1,
            fallback_gas: GasEstimator::FALLBACK_SEND,
            probe_command: Some("./calculate_send_gas.sh".to_string()),
        }
    }

    /// The probe command, if one is set and non-empty.
    pub fn probe(&self) -> Option<String> {
        self.probe_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
            .map(str::to_string)
    }

    fn merged(self, overrides: KindOverrides) -> Self {
        Self {
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            gas_multiplier: overrides.gas_multiplier.unwrap_or(self.gas_multiplier),
            fallback_gas: overrides.fallback_gas.unwrap_or(self.fallback_gas),
            probe_command: overrides.probe_command.or(self.probe_command),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KindOverrides {
    max_attempts: Option<u32>,
    gas_multiplier: Option<f64>,
    fallback_gas: Option<u64>,
    probe_command: Option<String>,
}

fn withdraw_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<KindConfig, D::Error> {
    KindOverrides::deserialize(deserializer).map(|o| KindConfig::withdraw().merged(o))
}

fn send_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<KindConfig, D::Error> {
    KindOverrides::deserialize(deserializer).map(|o| KindConfig::send().merged(o))
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            endpoints: vec![
                endpoint(
                    "https://cosmos-rpc.publicnode.com:443",
                    "https://cosmos-rest.publicnode.com",
                ),
                endpoint(
                    "https://cosmos-rpc.polkachu.com:443",
                    "https://cosmos-api.polkachu.com",
                ),
                endpoint(
                    "https://cosmoshub-mainnet-rpc.itrocket.net",
                    "https://cosmoshub-mainnet-api.itrocket.net",
                ),
            ],
            num_wallets: 119,
            gas_price: 0.005,
            gaiad: GaiadConfig::default(),
            destinations: vec![
                destination("OKX", "okx_wallets"),
                destination("Bitget", "bitget_wallets"),
                destination("Binance", "binance_wallets"),
            ],
            thresholds: ThresholdConfig::default(),
            delays: DelayConfig::default(),
            confirmation: ConfirmationConfig::default(),
            withdraw: KindConfig::withdraw(),
            send: KindConfig::send(),
            gas_probe_attempts: GasEstimator::DEFAULT_ATTEMPTS,
            dry_run: false,
            skip_rewards: false,
            log_dir: "logs".to_string(),
        }
    }
}

impl Default for GaiadConfig {
    fn default() -> Self {
        Self {
            binary: "gaiad".to_string(),
            keyring_backend: None,
            home: None,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_rewards_to_withdraw: 700_000,
            min_send_amount: 50_000,
            send_margin: 3_000,
            min_reserve: 15_000,
            max_reserve: 25_000,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_secs: 3600,
            max_secs: 7200,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            wait_secs: 30,
            settle_secs: 30,
        }
    }
}

fn endpoint(rpc: &str, api: &str) -> EndpointConfig {
    EndpointConfig {
        rpc: rpc.to_string(),
        api: api.to_string(),
    }
}

fn destination(exchange: &str, path: &str) -> DestinationSource {
    DestinationSource {
        exchange: exchange.to_string(),
        path: path.to_string(),
    }
}

impl SweeperConfig {
    /// Defaults, overridden by the TOML file at `path` if it exists, then by
    /// `SWEEPER_*` environment variables (`__` separates nested keys).
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`SweeperConfig::load`], reading variables from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(path: &str, env: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid configuration in {}", path))
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.endpoints.is_empty() {
            problems.push(ConfigError::NoEndpoints.to_string());
        }
        for ep in &self.endpoints {
            for url in [&ep.rpc, &ep.api] {
                if !is_http_url(url) {
                    problems.push(ConfigError::InvalidRpcUrl { url: url.clone() }.to_string());
                }
            }
        }

        if !(1..=MAX_WALLETS).contains(&self.num_wallets) {
            problems.push(invalid(
                "num_wallets",
                format!("must be between 1 and {}, got {}", MAX_WALLETS, self.num_wallets),
            ));
        }
        if !(self.gas_price > 0.0 && self.gas_price <= 1.0) {
            problems.push(invalid(
                "gas_price",
                format!("must be in (0, 1], got {}", self.gas_price),
            ));
        }
        if self.thresholds.min_reserve > self.thresholds.max_reserve {
            problems.push(invalid(
                "thresholds.min_reserve",
                format!(
                    "{} exceeds max_reserve {}",
                    self.thresholds.min_reserve, self.thresholds.max_reserve
                ),
            ));
        }
        if self.delays.min_secs > self.delays.max_secs {
            problems.push(invalid(
                "delays.min_secs",
                format!(
                    "{} exceeds max_secs {}",
                    self.delays.min_secs, self.delays.max_secs
                ),
            ));
        }
        if self.confirmation.retries == 0 {
            problems.push(invalid("confirmation.retries", "must be at least 1".to_string()));
        }
        if self.gas_probe_attempts == 0 {
            problems.push(invalid("gas_probe_attempts", "must be at least 1".to_string()));
        }
        for (name, kind) in [("withdraw", &self.withdraw), ("send", &self.send)] {
            if kind.max_attempts == 0 {
                problems.push(invalid(
                    &format!("{}.max_attempts", name),
                    "must be at least 1".to_string(),
                ));
            }
            if !(kind.gas_multiplier.is_finite() && kind.gas_multiplier > 1.0) {
                problems.push(invalid(
                    &format!("{}.gas_multiplier", name),
                    format!("must be greater than 1.0, got {}", kind.gas_multiplier),
                ));
            }
            if kind.fallback_gas == 0 {
                problems.push(invalid(
                    &format!("{}.fallback_gas", name),
                    "must be positive".to_string(),
                ));
            }
        }
        if self.gaiad.binary.trim().is_empty() {
            problems.push(
                ConfigError::MissingField {
                    field: "gaiad.binary".to_string(),
                }
                .to_string(),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Rejected(problems))
        }
    }

    pub fn policy_for(&self, kind: TxKind) -> KindPolicy {
        let per_kind = match kind {
            TxKind::Withdraw => &self.withdraw,
            TxKind::Send => &self.send,
        };
        KindPolicy {
            max_attempts: per_kind.max_attempts,
            confirm_retries: self.confirmation.retries,
            confirm_wait: Duration::from_secs(self.confirmation.wait_secs),
            settle_wait: Duration::from_secs(self.confirmation.settle_secs),
            gas_multiplier: per_kind.gas_multiplier,
        }
    }

    pub fn fallback_gas(&self) -> PerKind<u64> {
        PerKind {
            withdraw: self.withdraw.fallback_gas,
            send: self.send.fallback_gas,
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            min_rewards_to_withdraw: self.thresholds.min_rewards_to_withdraw,
            min_reserve: self.thresholds.min_reserve,
            max_reserve: self.thresholds.max_reserve,
            send_margin: self.thresholds.send_margin,
            min_send_amount: self.thresholds.min_send_amount,
            min_delay: Duration::from_secs(self.delays.min_secs),
            max_delay: Duration::from_secs(self.delays.max_secs),
            dry_run: self.dry_run,
            skip_rewards: self.skip_rewards,
            withdraw_policy: self.policy_for(TxKind::Withdraw),
            send_policy: self.policy_for(TxKind::Send),
            query_retry: RetryConfig::new(2, 1000),
        }
    }

    /// Human-readable overview logged at startup.
    pub fn summary(&self) -> String {
        let exchanges: Vec<&str> = self
            .destinations
            .iter()
            .map(|d| d.exchange.as_str())
            .collect();
        format!(
            "{} ({}) | {} wallets | {} endpoints | gas price {} {} | withdraw at {} | reserve {}-{} | delay {}-{}s | exchanges: {}{}",
            self.chain.name,
            self.chain.chain_id,
            self.num_wallets,
            self.endpoints.len(),
            self.gas_price,
            self.chain.denom,
            self.thresholds.min_rewards_to_withdraw,
            self.thresholds.min_reserve,
            self.thresholds.max_reserve,
            self.delays.min_secs,
            self.delays.max_secs,
            exchanges.join(", "),
            if self.dry_run { " | DRY RUN" } else { "" }
        )
    }
}

fn invalid(field: &str, reason: String) -> String {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
    .to_string()
}

fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
