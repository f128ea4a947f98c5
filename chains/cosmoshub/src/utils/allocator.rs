use rand::Rng;

/// Split of a balance into what stays in the wallet and what is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub reserve: u64,
    pub send_amount: u64,
}

/// Draws a reserve uniformly from `[min_reserve, max_reserve]` clamped to
/// `[0, balance]`; the rest of the balance is the send amount. Inverted
/// bounds are swapped.
pub fn allocate<R: Rng + ?Sized>(
    balance: u64,
    min_reserve: u64,
    max_reserve: u64,
    rng: &mut R,
) -> Allocation {
    let mut low = min_reserve.min(balance);
    let mut high = max_reserve.min(balance);
    if low > high {
        std::mem::swap(&mut low, &mut high);
    }

    let reserve = if low == high {
        low
    } else {
        rng.gen_range(low..=high)
    };

    Allocation {
        reserve,
        send_amount: balance - reserve,
    }
}

/// Smallest send worth its fee: `fee + margin`, never below `floor`.
pub fn min_send_threshold(fee: u64, margin: u64, floor: u64) -> u64 {
    fee.saturating_add(margin).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_reserve_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let a = allocate(100_000, 15_000, 25_000, &mut rng);
            assert!((15_000..=25_000).contains(&a.reserve));
            assert!((75_000..=85_000).contains(&a.send_amount));
            assert_eq!(a.reserve + a.send_amount, 100_000);
        }
    }

    #[test]
    fn test_same_seed_same_allocation() {
        let first: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..10)
                .map(|_| allocate(1_000_000, 15_000, 25_000, &mut rng))
                .collect()
        };
        let second: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..10)
                .map(|_| allocate(1_000_000, 15_000, 25_000, &mut rng))
                .collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_small_balance_is_fully_reserved() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            allocate(10_000, 15_000, 25_000, &mut rng),
            Allocation {
                reserve: 10_000,
                send_amount: 0
            }
        );
        assert_eq!(allocate(0, 15_000, 25_000, &mut rng).send_amount, 0);
    }

    #[test]
    fn test_partial_clamp_and_inverted_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let a = allocate(20_000, 15_000, 25_000, &mut rng);
            assert!((15_000..=20_000).contains(&a.reserve));

            let b = allocate(100_000, 25_000, 15_000, &mut rng);
            assert!((15_000..=25_000).contains(&b.reserve));
        }
    }

    #[test]
    fn test_fixed_reserve() {
        let mut rng = StdRng::seed_from_u64(9);
        let a = allocate(50_000, 20_000, 20_000, &mut rng);
        assert_eq!(a.reserve, 20_000);
        assert_eq!(a.send_amount, 30_000);
    }

    #[test]
    fn test_threshold() {
        assert_eq!(min_send_threshold(1_251, 3_000, 50_000), 50_000);
        assert_eq!(min_send_threshold(60_000, 3_000, 50_000), 63_000);
        assert_eq!(min_send_threshold(u64::MAX, 3_000, 50_000), u64::MAX);
    }
}
