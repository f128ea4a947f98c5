use crate::client::ChainClient;
use core_logic::RpcManager;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub rpc_url: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub latest_block_height: Option<u64>,
    pub detail: String,
}

/// Probes `/status` on every endpoint, records the result in `rpc` and logs
/// a table. A node that is still catching up counts as unhealthy.
pub async fn check_endpoints<C: ChainClient>(
    client: &C,
    rpc: &RpcManager,
    expected_network: &str,
) -> Vec<EndpointReport> {
    let mut reports = Vec::with_capacity(rpc.endpoints_count());

    for endpoint in rpc.endpoints() {
        let started = Instant::now();
        let result = client.node_status(endpoint).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let report = match result {
            Ok(status) if status.catching_up => EndpointReport {
                rpc_url: endpoint.rpc_url.clone(),
                healthy: false,
                latency_ms,
                latest_block_height: Some(status.latest_block_height),
                detail: "catching up".to_string(),
            },
            Ok(status) if !expected_network.is_empty() && status.network != expected_network => {
                EndpointReport {
                    rpc_url: endpoint.rpc_url.clone(),
                    healthy: false,
                    latency_ms,
                    latest_block_height: Some(status.latest_block_height),
                    detail: format!("wrong network {}", status.network),
                }
            }
            Ok(status) => EndpointReport {
                rpc_url: endpoint.rpc_url.clone(),
                healthy: true,
                latency_ms,
                latest_block_height: Some(status.latest_block_height),
                detail: "ok".to_string(),
            },
            Err(e) => EndpointReport {
                rpc_url: endpoint.rpc_url.clone(),
                healthy: false,
                latency_ms,
                latest_block_height: None,
                detail: e.to_string(),
            },
        };

        rpc.update_health(&report.rpc_url, report.healthy, report.latency_ms);
        reports.push(report);
    }

    for report in &reports {
        let height = report
            .latest_block_height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        if report.healthy {
            info!(
                "{:<50} {:>6}ms  height {:>10}  {}",
                report.rpc_url, report.latency_ms, height, report.detail
            );
        } else {
            warn!(
                "{:<50} {:>6}ms  height {:>10}  FAILED: {}",
                report.rpc_url, report.latency_ms, height, report.detail
            );
        }
    }

    let healthy = reports.iter().filter(|r| r.healthy).count();
    if healthy == 0 {
        warn!("No healthy endpoints. Continuing with all {}", reports.len());
    } else {
        info!("{}/{} endpoints healthy", healthy, reports.len());
    }

    reports
}
