use super::{ChainError, NodeStatus, TxStatus};
use anyhow::Context;
use core_logic::{MetricsCollector, NetworkError};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only access to the LCD REST API and the node `/status` route.
#[derive(Debug, Clone)]
pub struct LcdClient {
    client: Client,
    denom: String,
    metrics: Option<Arc<MetricsCollector>>,
}

#[derive(Debug, Deserialize)]
struct Coin {
    denom: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct RewardsResponse {
    #[serde(default)]
    total: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct TxEnvelope {
    tx_response: TxResponse,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default)]
    height: String,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    result: StatusResult,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    node_info: NodeInfo,
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    network: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
    catching_up: bool,
}

impl LcdClient {
    pub fn new(denom: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("cosmoshub-sweeper/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            denom: denom.to_string(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn balance(&self, api_url: &str, address: &str) -> Result<u64, ChainError> {
        let url = format!(
            "{}/cosmos/bank/v1beta1/balances/{}",
            api_url.trim_end_matches('/'),
            address
        );
        let body = self.get_text(&url).await?;
        parse_balance(&body, &self.denom).map_err(|reason| ChainError::Parse {
            endpoint: api_url.to_string(),
            reason,
        })
    }

    pub async fn rewards(&self, api_url: &str, address: &str) -> Result<u64, ChainError> {
        let url = format!(
            "{}/cosmos/distribution/v1beta1/delegators/{}/rewards",
            api_url.trim_end_matches('/'),
            address
        );
        let body = self.get_text(&url).await?;
        parse_rewards(&body, &self.denom).map_err(|reason| ChainError::Parse {
            endpoint: api_url.to_string(),
            reason,
        })
    }

    pub async fn tx(&self, api_url: &str, hash: &str) -> Result<Option<TxStatus>, ChainError> {
        let url = format!(
            "{}/cosmos/tx/v1beta1/txs/{}",
            api_url.trim_end_matches('/'),
            hash
        );

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| network_error(e, api_url))?;
        self.observe(started);

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(e, api_url))?;

        if status == StatusCode::NOT_FOUND || (!status.is_success() && body.contains("not found")) {
            debug!("tx {} not yet indexed on {}", hash, api_url);
            return Ok(None);
        }
        check_status(status, api_url)?;

        // Lagging nodes sometimes answer 200 with an empty or partial body.
        Ok(parse_tx(&body))
    }

    pub async fn node_status(&self, rpc_url: &str) -> Result<NodeStatus, ChainError> {
        let url = format!("{}/status", rpc_url.trim_end_matches('/'));
        let envelope: StatusEnvelope = self.get_json(&url, rpc_url).await?;

        let latest_block_height = envelope
            .result
            .sync_info
            .latest_block_height
            .parse()
            .map_err(|_| ChainError::Parse {
                endpoint: rpc_url.to_string(),
                reason: "latest_block_height is not a number".to_string(),
            })?;

        Ok(NodeStatus {
            network: envelope.result.node_info.network,
            latest_block_height,
            catching_up: envelope.result.sync_info.catching_up,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, ChainError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(e, url))?;
        self.observe(started);

        check_status(response.status(), url)?;
        response.text().await.map_err(|e| network_error(e, url).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, endpoint: &str) -> Result<T, ChainError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| ChainError::Parse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    fn observe(&self, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc_latency(started.elapsed());
        }
    }
}

fn network_error(e: reqwest::Error, endpoint: &str) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout {
            timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            endpoint: endpoint.to_string(),
        }
    } else if e.is_connect() {
        NetworkError::ConnectionRefused {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    } else {
        NetworkError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

fn check_status(status: StatusCode, endpoint: &str) -> Result<(), NetworkError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(NetworkError::RateLimited {
            endpoint: endpoint.to_string(),
        });
    }
    if !status.is_success() {
        return Err(NetworkError::HttpError {
            status_code: status.as_u16(),
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}

/// Integer part of a Cosmos amount string. Reward amounts are decimals
/// with eighteen fractional digits.
fn whole_units(amount: &str) -> Result<u64, String> {
    let integer = amount.split('.').next().unwrap_or_default();
    if integer.is_empty() {
        return Ok(0);
    }
    integer
        .parse()
        .map_err(|_| format!("invalid amount '{}'", amount))
}

fn parse_balance(body: &str, denom: &str) -> Result<u64, String> {
    let response: BalancesResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    response
        .balances
        .iter()
        .find(|c| c.denom == denom)
        .map(|c| whole_units(&c.amount))
        .unwrap_or(Ok(0))
}

fn parse_rewards(body: &str, denom: &str) -> Result<u64, String> {
    let response: RewardsResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    response
        .total
        .iter()
        .find(|c| c.denom == denom)
        .map(|c| whole_units(&c.amount))
        .unwrap_or(Ok(0))
}

fn parse_tx(body: &str) -> Option<TxStatus> {
    let envelope: TxEnvelope = serde_json::from_str(body).ok()?;
    let response = envelope.tx_response;
    Some(TxStatus {
        code: response.code,
        raw_log: response.raw_log,
        height: response.height.parse().unwrap_or(0),
    })
}
