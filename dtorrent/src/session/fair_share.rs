//! Weighted fair-share allocation with saturation: distribute a global cap
//! across demands so that (a) the sum of allocations equals
//! `min(cap, sum of demands)`, (b) no allocation exceeds its own ceiling,
//! (c) excess is repeatedly re-distributed to entrants still below their
//! demand until quiescence. Used identically for upload rate, download
//! rate, max uploads, and max connections — a pure function, tested
//! directly the way the teacher tests its other pure value types.

/// One torrent's demand and ceiling for whatever resource is being shared.
#[derive(Debug, Clone, Copy)]
pub struct Demand {
    pub requested: u64,
    pub ceiling: Option<u64>,
}

/// Splits `cap` across `demands`, returning one allocation per entry in the
/// same order. `cap == None` means unlimited: every demand is granted up to
/// its own ceiling (or in full, if it has none).
pub fn allocate(cap: Option<u64>, demands: &[Demand]) -> Vec<u64> {
    let cap = match cap {
        Some(cap) => cap,
        None => {
            return demands
                .iter()
                .map(|d| d.ceiling.map(|c| c.min(d.requested)).unwrap_or(d.requested))
                .collect()
        }
    };

    let mut allocations = vec![0u64; demands.len()];
    let mut remaining = cap;
    let mut unsatisfied: Vec<usize> = (0..demands.len())
        .filter(|&i| demands[i].requested > 0)
        .collect();

    while remaining > 0 && !unsatisfied.is_empty() {
        let share = remaining / unsatisfied.len() as u64;
        if share == 0 {
            // Fewer units left than entrants: hand out one unit at a time,
            // in order, until the remainder is exhausted.
            for &i in &unsatisfied {
                if remaining == 0 {
                    break;
                }
                let room = demands[i].requested - allocations[i];
                let ceil_room = demands[i]
                    .ceiling
                    .map(|c| c.saturating_sub(allocations[i]))
                    .unwrap_or(u64::MAX);
                let grant = room.min(ceil_room).min(1);
                allocations[i] += grant;
                remaining -= grant;
            }
            break;
        }

        let mut still_unsatisfied = Vec::new();
        for &i in &unsatisfied {
            let room = demands[i].requested - allocations[i];
            let ceil_room = demands[i]
                .ceiling
                .map(|c| c.saturating_sub(allocations[i]))
                .unwrap_or(u64::MAX);
            let grant = share.min(room).min(ceil_room);
            allocations[i] += grant;
            remaining -= grant;
            if allocations[i] < demands[i].requested
                && demands[i].ceiling.map(|c| allocations[i] < c).unwrap_or(true)
            {
                still_unsatisfied.push(i);
            }
        }

        if still_unsatisfied.len() == unsatisfied.len() {
            // No entrant could absorb more this round (everyone capped by
            // their own ceiling) — further rounds would spin forever.
            break;
        }
        unsatisfied = still_unsatisfied;
    }

    allocations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_cap_grants_full_demand() {
        let demands = [
            Demand { requested: 100, ceiling: None },
            Demand { requested: 200, ceiling: Some(150) },
        ];
        let result = allocate(None, &demands);
        assert_eq!(result, vec![100, 150]);
    }

    #[test]
    fn equal_split_when_demand_exceeds_cap() {
        let demands = [
            Demand { requested: 100, ceiling: None },
            Demand { requested: 100, ceiling: None },
        ];
        let result = allocate(Some(100), &demands);
        assert_eq!(result.iter().sum::<u64>(), 100);
        assert_eq!(result[0], 50);
        assert_eq!(result[1], 50);
    }

    #[test]
    fn excess_redistributes_to_entrants_below_ceiling() {
        let demands = [
            Demand { requested: 10, ceiling: Some(10) },
            Demand { requested: 90, ceiling: None },
        ];
        let result = allocate(Some(100), &demands);
        assert_eq!(result[0], 10);
        assert_eq!(result[1], 90);
    }

    #[test]
    fn sum_never_exceeds_cap_or_total_demand() {
        let demands = [
            Demand { requested: 5, ceiling: None },
            Demand { requested: 3, ceiling: None },
        ];
        let result = allocate(Some(100), &demands);
        assert_eq!(result.iter().sum::<u64>(), 8);
    }
}
