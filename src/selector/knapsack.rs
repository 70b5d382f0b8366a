//! Stochastic knapsack selection.
//!
//! A preliminary pairwise scan handles trivial exact matches; the stochastic
//! walk then retains the solution with the smallest acceptable excess. The
//! always-terminating fallback is largest-first accumulation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{
    KNAPSACK_CHANGE_FLOOR, KNAPSACK_INCLUSION_PROBABILITY, KNAPSACK_ITERATIONS,
};
use crate::error::SelectionFailure;
use crate::selector::accumulative::{accumulate_sorted, sort_for, SortOrder};
use crate::selector::{eligible_utxos, selection_fee, settle, validate_options, UtxoSelector};
use crate::types::{Selection, SelectionOptions, Utxo};

/// Stochastic inclusion walk over the UTXO set.
#[derive(Debug, Clone, Copy)]
pub struct KnapsackSelector {
    /// Per-UTXO inclusion probability of the walk.
    pub inclusion_probability: f64,
    /// Iteration budget.
    pub iterations: usize,
}

impl Default for KnapsackSelector {
    fn default() -> Self {
        Self {
            inclusion_probability: KNAPSACK_INCLUSION_PROBABILITY,
            iterations: KNAPSACK_ITERATIONS,
        }
    }
}

impl KnapsackSelector {
    /// Excess of a candidate over target plus its two-output fee, when it
    /// covers them.
    fn excess_of(candidate: &[Utxo], options: &SelectionOptions) -> Option<u64> {
        let total: u64 = candidate.iter().map(|utxo| utxo.value).sum();
        let needed = options.target_value + selection_fee(candidate, 2, options.fee_rate);
        total.checked_sub(needed)
    }

    /// Singleton and pair scan for exact or near-exact hits.
    fn pairwise_scan(pool: &[Utxo], options: &SelectionOptions) -> Option<Vec<Utxo>> {
        for (i, a) in pool.iter().enumerate() {
            let single = std::slice::from_ref(a);
            if Self::excess_of(single, options) == Some(0) {
                return Some(vec![a.clone()]);
            }
            for b in pool.iter().skip(i + 1) {
                let pair = [a.clone(), b.clone()];
                if Self::excess_of(&pair, options) == Some(0) {
                    return Some(pair.to_vec());
                }
            }
        }
        None
    }

    /// Whether `excess` is acceptable: zero, or large enough to become change.
    fn acceptable(excess: u64) -> bool {
        excess == 0 || excess >= KNAPSACK_CHANGE_FLOOR
    }
}

impl UtxoSelector for KnapsackSelector {
    fn name(&self) -> &'static str {
        "knapsack"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;
        let pool = sort_for(SortOrder::LargestFirst, eligible);

        if let Some(exact) = Self::pairwise_scan(&pool, options) {
            return settle(exact, options);
        }

        let mut rng: StdRng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_inputs = options.max_inputs.map_or(usize::MAX, |max| max as usize);

        let mut best: Option<(Vec<Utxo>, u64)> = None;
        for _ in 0..self.iterations {
            if options.is_cancelled() {
                return Err(SelectionFailure::timeout(self.name(), true));
            }

            let mut candidate: Vec<Utxo> = Vec::new();
            let mut total: u64 = 0;
            // First a probabilistic pass, then a mandatory top-up with
            // whatever was skipped, walking largest-first both times.
            for mandatory in [false, true] {
                for utxo in &pool {
                    if candidate.len() >= max_inputs {
                        break;
                    }
                    let covered = total
                        >= options.target_value + selection_fee(&candidate, 2, options.fee_rate);
                    if covered {
                        break;
                    }
                    if candidate.iter().any(|chosen| chosen.outpoint() == utxo.outpoint()) {
                        continue;
                    }
                    if mandatory || rng.gen_bool(self.inclusion_probability) {
                        total += utxo.value;
                        candidate.push(utxo.clone());
                    }
                }
            }

            let Some(excess) = Self::excess_of(&candidate, options) else {
                continue;
            };
            if !Self::acceptable(excess) {
                continue;
            }
            let improved = best
                .as_ref()
                .is_none_or(|(_, best_excess)| excess < *best_excess);
            if improved {
                best = Some((candidate, excess));
            }
            if let Some((_, best_excess)) = &best {
                // Early exit on a perfect match or a tight-enough solution.
                if *best_excess == 0
                    || (*best_excess as f64) < options.target_value as f64 * 0.05
                {
                    break;
                }
            }
        }

        if let Some((candidate, _)) = best {
            return settle(candidate, options);
        }

        tracing::debug!("knapsack walk found nothing acceptable, falling back to accumulative");
        let fallback = accumulate_sorted(sort_for(SortOrder::LargestFirst, pool), options)?;
        settle(fallback, options)
    }
}
