//! # Core Logic - RPC Manager
//!
//! Endpoint selection for chain queries and broadcasts. Picks are uniformly
//! random over the healthy endpoints; confirmation polling walks every
//! endpoint in configuration order.

use crate::config::EndpointConfig;
use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Consecutive failures after which an endpoint is treated as unhealthy.
pub const FAILURE_THRESHOLD: u64 = 3;

/// RPC endpoint information
#[derive(Debug)]
pub struct RpcEndpoint {
    pub rpc_url: String,
    pub api_url: String,
    pub last_latency_ms: AtomicU64,
    pub failure_count: AtomicU64,
    pub healthy: AtomicBool,
}

impl RpcEndpoint {
    /// Create a new RPC endpoint
    pub fn new(rpc_url: String, api_url: String) -> Self {
        Self {
            rpc_url,
            api_url,
            last_latency_ms: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Get current latency in milliseconds
    pub fn latency_ms(&self) -> u64 {
        self.last_latency_ms.load(Ordering::SeqCst)
    }

    /// Check if endpoint is healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Get failure count
    pub fn failures(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }
}

/// Health status of an RPC endpoint
#[derive(Debug, Clone)]
pub struct RpcHealthStatus {
    pub url: String,
    pub latency_ms: u64,
    pub healthy: bool,
    pub failure_count: u64,
}

/// Manager for a fixed set of endpoints with health tracking and random selection.
#[derive(Debug)]
pub struct RpcManager {
    endpoints: Vec<RpcEndpoint>,
    rng: Mutex<StdRng>,
}

impl RpcManager {
    /// Create a manager seeded from OS entropy.
    pub fn new(configs: &[EndpointConfig]) -> Result<Self, ConfigError> {
        Self::with_rng(configs, StdRng::from_entropy())
    }

    /// Create a manager with an explicit random source, so picks are reproducible.
    pub fn with_rng(configs: &[EndpointConfig], rng: StdRng) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        let endpoints = configs
            .iter()
            .map(|c| RpcEndpoint::new(c.rpc.clone(), c.api.clone()))
            .collect();

        Ok(Self {
            endpoints,
            rng: Mutex::new(rng),
        })
    }

    /// Pick a random endpoint. Healthy endpoints are preferred; when none is
    /// healthy the whole set is eligible again.
    pub fn pick(&self) -> &RpcEndpoint {
        let healthy: Vec<usize> = self
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_healthy())
            .map(|(i, _)| i)
            .collect();

        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let idx = if healthy.is_empty() {
            rng.gen_range(0..self.endpoints.len())
        } else {
            healthy[rng.gen_range(0..healthy.len())]
        };

        &self.endpoints[idx]
    }

    /// All endpoints in configuration order, regardless of health.
    pub fn endpoints(&self) -> &[RpcEndpoint] {
        &self.endpoints
    }

    /// Get all RPC URLs
    pub fn urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.rpc_url.as_str()).collect()
    }

    /// Get count of endpoints
    pub fn endpoints_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Get count of healthy endpoints
    pub fn healthy_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_healthy()).count()
    }

    fn find(&self, rpc_url: &str) -> Option<&RpcEndpoint> {
        self.endpoints.iter().find(|e| e.rpc_url == rpc_url)
    }

    /// Record a successful request for an endpoint
    pub fn record_success(&self, rpc_url: &str) {
        if let Some(endpoint) = self.find(rpc_url) {
            endpoint.failure_count.store(0, Ordering::SeqCst);
            endpoint.healthy.store(true, Ordering::SeqCst);
        }
    }

    /// Record a failed request for an endpoint
    pub fn record_failure(&self, rpc_url: &str) {
        if let Some(endpoint) = self.find(rpc_url) {
            let failures = endpoint.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= FAILURE_THRESHOLD && endpoint.healthy.swap(false, Ordering::SeqCst) {
                warn!(
                    "Marking RPC {} as unhealthy after {} failures",
                    rpc_url, failures
                );
            }
        }
    }

    /// Update health status for an endpoint
    pub fn update_health(&self, rpc_url: &str, healthy: bool, latency_ms: u64) {
        if let Some(endpoint) = self.find(rpc_url) {
            endpoint.last_latency_ms.store(latency_ms, Ordering::SeqCst);
            endpoint.healthy.store(healthy, Ordering::SeqCst);
            if healthy {
                endpoint.failure_count.store(0, Ordering::SeqCst);
            } else {
                endpoint.failure_count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Get all health statuses
    pub fn health_status(&self) -> Vec<RpcHealthStatus> {
        self.endpoints
            .iter()
            .map(|e| RpcHealthStatus {
                url: e.rpc_url.clone(),
                latency_ms: e.latency_ms(),
                healthy: e.is_healthy(),
                failure_count: e.failures(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(n: usize) -> Vec<EndpointConfig> {
        (0..n)
            .map(|i| EndpointConfig {
                rpc: format!("https://rpc{}.example.com", i),
                api: format!("https://api{}.example.com", i),
            })
            .collect()
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let err = RpcManager::new(&[]).unwrap_err();
        assert_eq!(err, ConfigError::NoEndpoints);
    }

    #[test]
    fn test_endpoints_keep_configuration_order() {
        let manager = RpcManager::new(&configs(3)).unwrap();
        assert_eq!(
            manager.urls(),
            vec![
                "https://rpc0.example.com",
                "https://rpc1.example.com",
                "https://rpc2.example.com"
            ]
        );
    }

    #[test]
    fn test_pick_is_reproducible_with_same_seed() {
        let a = RpcManager::with_rng(&configs(5), StdRng::seed_from_u64(7)).unwrap();
        let b = RpcManager::with_rng(&configs(5), StdRng::seed_from_u64(7)).unwrap();

        let picks_a: Vec<String> = (0..20).map(|_| a.pick().rpc_url.clone()).collect();
        let picks_b: Vec<String> = (0..20).map(|_| b.pick().rpc_url.clone()).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_pick_covers_every_endpoint() {
        let manager = RpcManager::with_rng(&configs(3), StdRng::seed_from_u64(1)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(manager.pick().rpc_url.clone());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_unhealthy_endpoint_is_skipped() {
        let manager = RpcManager::with_rng(&configs(2), StdRng::seed_from_u64(3)).unwrap();
        for _ in 0..FAILURE_THRESHOLD {
            manager.record_failure("https://rpc0.example.com");
        }
        assert_eq!(manager.healthy_count(), 1);

        for _ in 0..50 {
            assert_eq!(manager.pick().rpc_url, "https://rpc1.example.com");
        }
    }

    #[test]
    fn test_all_unhealthy_falls_back_to_full_set() {
        let manager = RpcManager::with_rng(&configs(2), StdRng::seed_from_u64(3)).unwrap();
        manager.update_health("https://rpc0.example.com", false, 10);
        manager.update_health("https://rpc1.example.com", false, 10);
        assert_eq!(manager.healthy_count(), 0);

        let url = manager.pick().rpc_url.clone();
        assert!(url == "https://rpc0.example.com" || url == "https://rpc1.example.com");
    }

    #[test]
    fn test_success_resets_failures() {
        let manager = RpcManager::new(&configs(1)).unwrap();
        manager.record_failure("https://rpc0.example.com");
        manager.record_failure("https://rpc0.example.com");
        manager.record_success("https://rpc0.example.com");

        let status = manager.health_status();
        assert_eq!(status[0].failure_count, 0);
        assert!(status[0].healthy);
    }
}
