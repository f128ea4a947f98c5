use super::{ChainError, Operation, SubmitResult};
use crate::wallet::Wallet;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Broadcasts through the `gaiad` binary. The keyring it points at holds the
/// signing keys; this process never sees them.
#[derive(Debug, Clone)]
pub struct GaiadCli {
    binary: String,
    chain_id: String,
    denom: String,
    keyring_backend: Option<String>,
    home: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

impl GaiadCli {
    pub fn new(binary: &str, chain_id: &str, denom: &str) -> Self {
        Self {
            binary: binary.to_string(),
            chain_id: chain_id.to_string(),
            denom: denom.to_string(),
            keyring_backend: None,
            home: None,
        }
    }

    pub fn with_keyring_backend(mut self, backend: Option<String>) -> Self {
        self.keyring_backend = backend;
        self
    }

    pub fn with_home(mut self, home: Option<String>) -> Self {
        self.home = home;
        self
    }

    fn keyring_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(backend) = &self.keyring_backend {
            args.push("--keyring-backend".to_string());
            args.push(backend.clone());
        }
        if let Some(home) = &self.home {
            args.push("--home".to_string());
            args.push(home.clone());
        }
        args
    }

    /// Full argument list for a broadcast, without the binary name.
    pub fn broadcast_args(
        &self,
        rpc_url: &str,
        wallet: &Wallet,
        operation: &Operation,
        fee: u64,
        gas: u64,
    ) -> Vec<String> {
        let mut args: Vec<String> = match operation {
            Operation::WithdrawAllRewards => vec![
                "tx".into(),
                "distribution".into(),
                "withdraw-all-rewards".into(),
            ],
            Operation::Send { to, amount } => vec![
                "tx".into(),
                "bank".into(),
                "send".into(),
                wallet.address.clone(),
                to.clone(),
                format!("{}{}", amount, self.denom),
            ],
        };

        args.extend([
            "--from".to_string(),
            wallet.name.clone(),
            "--fees".to_string(),
            format!("{}{}", fee, self.denom),
            "--gas".to_string(),
            gas.to_string(),
            "--node".to_string(),
            rpc_url.to_string(),
            "--chain-id".to_string(),
            self.chain_id.clone(),
            "-y".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ]);
        args.extend(self.keyring_args());
        args
    }

    pub async fn broadcast(
        &self,
        rpc_url: &str,
        wallet: &Wallet,
        operation: &Operation,
        fee: u64,
        gas: u64,
    ) -> SubmitResult {
        let args = self.broadcast_args(rpc_url, wallet, operation, fee, gas);
        debug!("{} {}", self.binary, args.join(" "));

        let output = match Command::new(&self.binary).args(&args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run {}: {}", self.binary, e);
                return SubmitResult::Malformed {
                    output: e.to_string(),
                };
            }
        };

        if !output.status.success() {
            warn!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_broadcast(&String::from_utf8_lossy(&output.stdout))
    }

    pub async fn key_address(&self, key_name: &str) -> Result<String, ChainError> {
        let mut args = vec![
            "keys".to_string(),
            "show".to_string(),
            key_name.to_string(),
            "-a".to_string(),
        ];
        args.extend(self.keyring_args());

        let command = format!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| ChainError::Command {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        let address = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || address.is_empty() {
            return Err(ChainError::Command {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(address)
    }
}

/// Reads the JSON printed by `gaiad tx ... -o json`. Anything without a
/// transaction hash is malformed.
pub fn parse_broadcast(stdout: &str) -> SubmitResult {
    let trimmed = stdout.trim();
    // gaiad may print a gas estimate line before the JSON document
    let json = trimmed
        .find('{')
        .map(|start| &trimmed[start..])
        .unwrap_or(trimmed);

    match serde_json::from_str::<BroadcastResponse>(json) {
        Ok(response) if !response.txhash.is_empty() => {
            if response.code == 0 {
                SubmitResult::Broadcast {
                    hash: response.txhash,
                }
            } else {
                SubmitResult::CheckTxFailed {
                    hash: response.txhash,
                    code: response.code,
                    raw_log: response.raw_log,
                }
            }
        }
        _ => SubmitResult::Malformed {
            output: trimmed.to_string(),
        },
    }
}
