use crate::client::ChainClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{Destination, DestinationBook, WalletError, WalletLoader};
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// A keyring account to sweep and where its surplus goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    /// Zero-based ordinal; the key is named `Wallet{index+1}`.
    pub index: usize,
    pub name: String,
    pub address: String,
    pub destination: Destination,
}

pub fn key_name(index: usize) -> String {
    format!("Wallet{}", index + 1)
}

/// Builds the wallet roster from the keyring and the destination lists.
pub struct KeyringRoster<C> {
    client: Arc<C>,
    book: DestinationBook,
    num_wallets: usize,
    rng: Mutex<StdRng>,
}

impl<C: ChainClient> KeyringRoster<C> {
    pub fn new(client: Arc<C>, book: DestinationBook, num_wallets: usize, rng: StdRng) -> Self {
        Self {
            client,
            book,
            num_wallets,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl<C: ChainClient> WalletLoader for KeyringRoster<C> {
    type Wallet = Wallet;

    async fn load_wallets(&self) -> Result<Vec<Wallet>> {
        let destinations = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.book.assign(self.num_wallets, &mut *rng)?
        };

        let mut wallets = Vec::with_capacity(self.num_wallets);
        for (index, destination) in destinations.into_iter().enumerate() {
            let name = key_name(index);
            let Some(destination) = destination else {
                warn!("Skipping {}: empty line in every destination list", name);
                continue;
            };
            let address = match self.client.key_address(&name).await {
                Ok(address) => address,
                Err(e) => {
                    error!("Skipping {}: {}", name, e);
                    continue;
                }
            };
            wallets.push(Wallet {
                index,
                name,
                address,
                destination,
            });
        }

        if wallets.is_empty() {
            return Err(WalletError::KeyLookupFailed {
                name: key_name(0),
                reason: "no keyring address could be resolved".to_string(),
            })
            .context("Wallet roster is empty");
        }

        info!(
            "Resolved {} of {} wallets from the keyring",
            wallets.len(),
            self.num_wallets
        );
        Ok(wallets)
    }
}
