//! Blackjack selection: hunt for a subset whose value lands exactly on the
//! target plus its own fee, so the transaction needs no change at all.
//!
//! Subsets are enumerated by growing cardinality under a per-size
//! combination budget. If no exact subset exists, the closest subset above
//! the two-output requirement is returned. A subset-sum DP refines small
//! wallets where enumeration alone is too coarse.

use crate::constants::{
    BLACKJACK_CLOSEST_MAX_INPUTS, BLACKJACK_COMBINATIONS_PER_SIZE, BLACKJACK_EXACT_MAX_INPUTS,
};
use crate::error::SelectionFailure;
use crate::selector::accumulative::{sort_for, SortOrder};
use crate::selector::{eligible_utxos, selection_fee, settle, validate_options, UtxoSelector};
use crate::types::{Selection, SelectionOptions, Utxo};

/// Wallet size up to which the subset-sum DP refinement runs.
const DP_MAX_POOL: usize = 64;
/// Target cap for the DP table, in sats.
const DP_MAX_TARGET: u64 = 1_000_000;

/// Exact-match subset search.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackjackSelector {
    /// Accepted overshoot above target plus fee for an "exact" hit, in sats.
    pub tolerance: u64,
}

impl BlackjackSelector {
    /// Selector accepting hits within `tolerance` sats of exact.
    pub fn new(tolerance: u64) -> Self {
        Self { tolerance }
    }

    /// Visit combinations of `k` out of `n` indices, lexicographically, until
    /// the budget runs out or the visitor asks to stop.
    fn for_each_combination(
        n: usize,
        k: usize,
        budget: usize,
        options: &SelectionOptions,
        mut visit: impl FnMut(&[usize]) -> bool,
    ) -> Result<(), SelectionFailure> {
        if k > n {
            return Ok(());
        }
        let mut indices: Vec<usize> = (0..k).collect();
        let mut visited = 0;
        loop {
            if options.is_cancelled() {
                return Err(SelectionFailure::timeout("blackjack", true));
            }
            visited += 1;
            if !visit(&indices) || visited >= budget {
                return Ok(());
            }

            // Advance to the next combination.
            let mut slot = k;
            while slot > 0 && indices[slot - 1] == slot - 1 + n - k {
                slot -= 1;
            }
            if slot == 0 {
                return Ok(());
            }
            indices[slot - 1] += 1;
            for next in slot..k {
                indices[next] = indices[next - 1] + 1;
            }
        }
    }

    fn exact_phase(
        &self,
        pool: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Option<Vec<Utxo>>, SelectionFailure> {
        let cap = options
            .max_inputs
            .map_or(BLACKJACK_EXACT_MAX_INPUTS, |max| {
                (max as usize).min(BLACKJACK_EXACT_MAX_INPUTS)
            })
            .min(pool.len());

        let mut best: Option<(Vec<usize>, u64)> = None;
        for k in 1..=cap {
            Self::for_each_combination(
                pool.len(),
                k,
                BLACKJACK_COMBINATIONS_PER_SIZE,
                options,
                |indices| {
                    let subset: Vec<Utxo> =
                        indices.iter().map(|&i| pool[i].clone()).collect();
                    let total: u64 = subset.iter().map(|utxo| utxo.value).sum();
                    let needed =
                        options.target_value + selection_fee(&subset, 1, options.fee_rate);
                    if total >= needed && total - needed <= self.tolerance {
                        let improved = best
                            .as_ref()
                            .is_none_or(|(_, best_total)| total < *best_total);
                        if improved {
                            best = Some((indices.to_vec(), total));
                        }
                    }
                    true
                },
            )?;
            if best.is_some() {
                break;
            }
        }
        Ok(best.map(|(indices, _)| indices.iter().map(|&i| pool[i].clone()).collect()))
    }

    /// Subset-sum DP with an input-count dimension, for precision on small
    /// wallets. Inputs are priced as P2WPKH spends.
    fn dp_phase(&self, pool: &[Utxo], options: &SelectionOptions) -> Option<Vec<Utxo>> {
        let pair_fee = selection_fee(&pool[..pool.len().min(2)], 1, options.fee_rate);
        let cap = options.target_value.checked_add(pair_fee + self.tolerance)?;
        if pool.len() > DP_MAX_POOL || cap > DP_MAX_TARGET {
            return None;
        }

        // reachable[sum] = (count, utxo index, previous sum), minimal count.
        let mut reachable: Vec<Option<(u32, usize, u64)>> = vec![None; cap as usize + 1];
        reachable[0] = Some((0, usize::MAX, 0));
        for (index, utxo) in pool.iter().enumerate() {
            if utxo.value > cap {
                continue;
            }
            for sum in (utxo.value..=cap).rev() {
                let below = reachable[(sum - utxo.value) as usize];
                if let Some((count, _, _)) = below {
                    let candidate = (count + 1, index, sum - utxo.value);
                    let better = match reachable[sum as usize] {
                        None => true,
                        Some((existing, _, _)) => count + 1 < existing,
                    };
                    if better {
                        reachable[sum as usize] = Some(candidate);
                    }
                }
            }
        }

        let max_inputs = options.max_inputs.unwrap_or(u32::MAX);
        for sum in (1..=cap).rev() {
            let Some((count, _, _)) = reachable[sum as usize] else {
                continue;
            };
            if count == 0 || count > max_inputs {
                continue;
            }
            let fee = selection_fee(&pool[..1], 1, options.fee_rate)
                + (count as u64 - 1) * pool[0].input_kind().vbytes() * options.fee_rate;
            let needed = options.target_value + fee;
            if sum >= needed && sum - needed <= self.tolerance {
                // Reconstruct the subset. Parent entries can be overwritten
                // by later, cheaper chains; a chain that reuses an input or
                // no longer adds up is discarded rather than trusted.
                let mut subset: Vec<Utxo> = Vec::new();
                let mut seen = std::collections::HashSet::new();
                let mut cursor = sum;
                while cursor != 0 {
                    let (_, index, previous) = reachable[cursor as usize]?;
                    if !seen.insert(pool[index].outpoint()) {
                        return None;
                    }
                    subset.push(pool[index].clone());
                    cursor = previous;
                }
                if subset.iter().map(|utxo| utxo.value).sum::<u64>() != sum {
                    return None;
                }
                return Some(subset);
            }
        }
        None
    }

    fn closest_phase(
        &self,
        pool: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Option<Vec<Utxo>>, SelectionFailure> {
        let cap = options
            .max_inputs
            .map_or(BLACKJACK_CLOSEST_MAX_INPUTS, |max| {
                (max as usize).min(BLACKJACK_CLOSEST_MAX_INPUTS)
            })
            .min(pool.len());

        let mut best: Option<(Vec<usize>, u64)> = None;
        for k in 1..=cap {
            Self::for_each_combination(
                pool.len(),
                k,
                BLACKJACK_COMBINATIONS_PER_SIZE,
                options,
                |indices| {
                    let subset: Vec<Utxo> =
                        indices.iter().map(|&i| pool[i].clone()).collect();
                    let total: u64 = subset.iter().map(|utxo| utxo.value).sum();
                    let needed =
                        options.target_value + selection_fee(&subset, 2, options.fee_rate);
                    if total >= needed {
                        let improved = best
                            .as_ref()
                            .is_none_or(|(_, best_total)| total < *best_total);
                        if improved {
                            best = Some((indices.to_vec(), total));
                        }
                    }
                    true
                },
            )?;
        }
        Ok(best.map(|(indices, _)| indices.iter().map(|&i| pool[i].clone()).collect()))
    }
}

impl UtxoSelector for BlackjackSelector {
    fn name(&self) -> &'static str {
        "blackjack"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;
        let pool = sort_for(SortOrder::LargestFirst, eligible);

        if let Some(exact) = self.exact_phase(&pool, options)? {
            return settle(exact, options);
        }
        if let Some(exact) = self.dp_phase(&pool, options) {
            return settle(exact, options);
        }
        if let Some(closest) = self.closest_phase(&pool, options)? {
            return settle(closest, options);
        }

        let available: u64 = pool.iter().map(|utxo| utxo.value).sum();
        let minimal = options.target_value + selection_fee(&pool[..1], 1, options.fee_rate);
        if available < minimal {
            Err(SelectionFailure::insufficient_funds(available, minimal))
        } else {
            Err(SelectionFailure::no_solution(
                self.name(),
                "no subset reaches the target within the search budget",
            ))
        }
    }
}
