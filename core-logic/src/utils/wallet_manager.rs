use crate::config::DestinationSource;
use crate::error::WalletError;
use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Where a wallet's surplus is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub exchange: String,
    pub address: String,
}

/// Destination address lists, one per exchange. Line `i` of every list
/// belongs to wallet `i` (`Wallet{i+1}`). Blank and `#` lines keep their
/// position and leave that wallet without an address in the list.
#[derive(Debug, Default)]
pub struct DestinationBook {
    lists: Vec<(String, Vec<Option<String>>)>,
}

impl DestinationBook {
    /// Reads every configured list. A missing file is not an error: that
    /// exchange simply contributes no addresses.
    pub fn load(sources: &[DestinationSource]) -> Result<Self> {
        let mut lists = Vec::with_capacity(sources.len());

        for source in sources {
            let path = Path::new(&source.path);
            if !path.exists() {
                warn!(
                    "{} not found. No {} destinations.",
                    source.path, source.exchange
                );
                lists.push((source.exchange.clone(), Vec::new()));
                continue;
            }

            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", source.path))?;
            let slots = parse_address_list(&content);
            let gaps = slots.iter().filter(|slot| slot.is_none()).count();
            if gaps > 0 {
                warn!(
                    "{} has {} empty line(s). Those wallets get no {} destination.",
                    source.path, gaps, source.exchange
                );
            }

            info!(
                "Loaded {} {} destinations from {}",
                slots.len() - gaps,
                source.exchange,
                source.path
            );
            lists.push((source.exchange.clone(), slots));
        }

        Ok(Self { lists })
    }

    pub fn from_lists(lists: Vec<(String, Vec<String>)>) -> Self {
        let lists = lists
            .into_iter()
            .map(|(exchange, list)| (exchange, list.into_iter().map(Some).collect()))
            .collect();
        Self { lists }
    }

    /// Per-exchange address counts, in configuration order. Empty lines are
    /// not counted.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.lists
            .iter()
            .map(|(exchange, list)| {
                (exchange.as_str(), list.iter().filter(|slot| slot.is_some()).count())
            })
            .collect()
    }

    /// Lists that have a line for every one of `required` wallets.
    fn usable(&self, required: usize) -> Vec<&(String, Vec<Option<String>>)> {
        self.lists
            .iter()
            .filter(|(_, list)| !list.is_empty() && list.len() >= required)
            .collect()
    }

    /// Assign a destination to each of `num_wallets` wallets, by position.
    /// When several lists hold an address for a wallet, the exchange is
    /// drawn at random. `None` when no usable list has an address on that
    /// wallet's line.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        num_wallets: usize,
        rng: &mut R,
    ) -> Result<Vec<Option<Destination>>, WalletError> {
        if self.counts().iter().all(|(_, n)| *n == 0) {
            return Err(WalletError::NoDestinations);
        }

        let usable = self.usable(num_wallets);
        if usable.is_empty() {
            let found = self
                .lists
                .iter()
                .map(|(exchange, list)| format!("{}: {}", exchange, list.len()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(WalletError::NotEnoughDestinations {
                found,
                required: num_wallets,
            });
        }

        let destinations = (0..num_wallets)
            .map(|i| {
                let candidates: Vec<_> = usable
                    .iter()
                    .filter_map(|(exchange, list)| {
                        list[i].as_ref().map(|address| (exchange, address))
                    })
                    .collect();
                let (exchange, address) = match candidates.len() {
                    0 => return None,
                    1 => candidates[0],
                    n => candidates[rng.gen_range(0..n)],
                };
                Some(Destination {
                    exchange: exchange.clone(),
                    address: address.clone(),
                })
            })
            .collect();

        Ok(destinations)
    }
}

fn parse_address_list(content: &str) -> Vec<Option<String>> {
    content
        .lines()
        .map(str::trim)
        .map(|line| {
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn list(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_parse_keeps_line_positions() {
        let parsed = parse_address_list("cosmos1a\n\n# okx\n  cosmos1b  \n");
        assert_eq!(
            parsed,
            vec![
                Some("cosmos1a".to_string()),
                None,
                None,
                Some("cosmos1b".to_string())
            ]
        );
    }

    #[test]
    fn test_blank_line_does_not_shift_later_wallets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("okx_wallets");
        fs::write(&path, "addr_w1\n\naddr_w3\naddr_w4\n").unwrap();

        let book = DestinationBook::load(&[DestinationSource {
            exchange: "OKX".to_string(),
            path: path.to_string_lossy().into_owned(),
        }])
        .unwrap();
        assert_eq!(book.counts(), vec![("OKX", 3)]);

        let mut rng = StdRng::seed_from_u64(1);
        let destinations = book.assign(4, &mut rng).unwrap();
        let addresses: Vec<_> = destinations
            .iter()
            .map(|d| d.as_ref().map(|d| d.address.as_str()))
            .collect();
        assert_eq!(
            addresses,
            vec![Some("addr_w1"), None, Some("addr_w3"), Some("addr_w4")]
        );
    }

    #[test]
    fn test_gap_is_filled_from_another_list() {
        let book = DestinationBook {
            lists: vec![
                (
                    "OKX".to_string(),
                    vec![Some("okx0".to_string()), None],
                ),
                (
                    "Bitget".to_string(),
                    vec![Some("bg0".to_string()), Some("bg1".to_string())],
                ),
            ],
        };
        let mut rng = StdRng::seed_from_u64(3);

        let destinations = book.assign(2, &mut rng).unwrap();
        let second = destinations[1].as_ref().unwrap();
        assert_eq!(second.exchange, "Bitget");
        assert_eq!(second.address, "bg1");
    }

    #[test]
    fn test_missing_file_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("okx_wallets");
        let mut f = fs::File::create(&present).unwrap();
        writeln!(f, "cosmos1okx0\ncosmos1okx1").unwrap();

        let book = DestinationBook::load(&[
            DestinationSource {
                exchange: "OKX".to_string(),
                path: present.to_string_lossy().into_owned(),
            },
            DestinationSource {
                exchange: "Bitget".to_string(),
                path: dir.path().join("missing").to_string_lossy().into_owned(),
            },
        ])
        .unwrap();

        assert_eq!(book.counts(), vec![("OKX", 2), ("Bitget", 0)]);
    }

    #[test]
    fn test_assign_is_positional() {
        let book = DestinationBook::from_lists(vec![("OKX".to_string(), list("okx", 3))]);
        let mut rng = StdRng::seed_from_u64(1);

        let destinations: Vec<_> = book
            .assign(3, &mut rng)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(destinations.len(), 3);
        assert_eq!(destinations[0].address, "okx0");
        assert_eq!(destinations[2].address, "okx2");
        assert!(destinations.iter().all(|d| d.exchange == "OKX"));
    }

    #[test]
    fn test_short_list_is_not_usable() {
        let book = DestinationBook::from_lists(vec![
            ("OKX".to_string(), list("okx", 5)),
            ("Bitget".to_string(), list("bg", 2)),
        ]);
        let mut rng = StdRng::seed_from_u64(9);

        let destinations = book.assign(4, &mut rng).unwrap();
        assert!(destinations
            .iter()
            .all(|d| d.as_ref().map(|d| d.exchange.as_str()) == Some("OKX")));
    }

    #[test]
    fn test_assign_mixes_usable_lists_by_index() {
        let book = DestinationBook::from_lists(vec![
            ("OKX".to_string(), list("okx", 40)),
            ("Bitget".to_string(), list("bg", 40)),
        ]);
        let mut rng = StdRng::seed_from_u64(4);

        let destinations: Vec<_> = book
            .assign(40, &mut rng)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(destinations.len(), 40);
        assert!(destinations.iter().any(|d| d.exchange == "OKX"));
        assert!(destinations.iter().any(|d| d.exchange == "Bitget"));
        for (i, d) in destinations.iter().enumerate() {
            let prefix = if d.exchange == "OKX" { "okx" } else { "bg" };
            assert_eq!(d.address, format!("{}{}", prefix, i));
        }
    }

    #[test]
    fn test_no_lists_is_an_error() {
        let book = DestinationBook::from_lists(vec![("OKX".to_string(), Vec::new())]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            book.assign(1, &mut rng).unwrap_err(),
            WalletError::NoDestinations
        );
    }

    #[test]
    fn test_not_enough_addresses_is_an_error() {
        let book = DestinationBook::from_lists(vec![("OKX".to_string(), list("okx", 2))]);
        let mut rng = StdRng::seed_from_u64(0);
        match book.assign(3, &mut rng).unwrap_err() {
            WalletError::NotEnoughDestinations { found, required } => {
                assert_eq!(found, "OKX: 2");
                assert_eq!(required, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
