use serde::{Deserialize, Serialize};

/// A chain access point. Transactions are broadcast and health-checked through
/// `rpc`; balance, reward and transaction queries go through `api`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub rpc: String,
    pub api: String,
}

/// One named source of destination addresses (an exchange deposit list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSource {
    pub exchange: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: String,
    pub denom: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "Cosmos Hub".to_string(),
            chain_id: "cosmoshub-4".to_string(),
            denom: "uatom".to_string(),
        }
    }
}
