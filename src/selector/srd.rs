//! Single Random Draw: shuffle, then accumulate until the target is covered.
//!
//! The plain draw is the Core-style privacy selector. The enhanced variant
//! draws `mix_depth` extra inputs past coverage and can interleave the
//! shuffle by script type to avoid wallet fingerprinting.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_core::RngCore;

use crate::error::SelectionFailure;
use crate::selector::{eligible_utxos, selection_fee, settle, validate_options, UtxoSelector};
use crate::size::InputKind;
use crate::types::{Selection, SelectionOptions, Utxo};

/// The Knuth shuffle over the original Fisher-Yates method.
pub(crate) fn shuffle_slice<T>(list: &mut [T], rng: &mut impl RngCore) {
    if list.is_empty() {
        return;
    }
    let mut current_index = list.len() - 1;
    while current_index > 0 {
        let random_index = rng.next_u32() as usize % (current_index + 1);
        list.swap(current_index, random_index);
        current_index -= 1;
    }
}

/// Pull UTXOs at random until there are enough to meet the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRandomDrawSelector {
    /// Extra random inputs drawn after the target is covered.
    pub mix_depth: usize,
    /// Round-robin the draw across script types.
    pub interleave_script_types: bool,
}

impl SingleRandomDrawSelector {
    /// The enhanced variant: extra mixing draws and script-type interleaving.
    pub fn enhanced(mix_depth: usize, interleave_script_types: bool) -> Self {
        Self {
            mix_depth,
            interleave_script_types,
        }
    }

    fn draw_order(&self, mut pool: Vec<Utxo>, rng: &mut impl RngCore) -> Vec<Utxo> {
        shuffle_slice(&mut pool, rng);
        if !self.interleave_script_types {
            return pool;
        }

        // Bucket by script kind, preserving the shuffled order within each
        // bucket, then deal round-robin so runs of one type are broken up.
        let mut buckets: Vec<(InputKind, Vec<Utxo>)> = Vec::new();
        for utxo in pool {
            let kind = utxo.input_kind();
            match buckets.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, bucket)) => bucket.push(utxo),
                None => buckets.push((kind, vec![utxo])),
            }
        }
        let mut interleaved = Vec::new();
        let mut round = 0;
        loop {
            let mut emitted = false;
            for (_, bucket) in &buckets {
                if let Some(utxo) = bucket.get(round) {
                    interleaved.push(utxo.clone());
                    emitted = true;
                }
            }
            if !emitted {
                break;
            }
            round += 1;
        }
        interleaved
    }
}

impl UtxoSelector for SingleRandomDrawSelector {
    fn name(&self) -> &'static str {
        "single-random-draw"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;
        let available: u64 = eligible.iter().map(|utxo| utxo.value).sum();

        let mut rng: StdRng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let order = self.draw_order(eligible, &mut rng);
        let max_inputs = options.max_inputs.map_or(usize::MAX, |max| max as usize);

        let mut selected: Vec<Utxo> = Vec::new();
        let mut total: u64 = 0;
        let mut extra_draws = self.mix_depth;
        for utxo in order {
            if options.is_cancelled() {
                return Err(SelectionFailure::timeout(self.name(), true));
            }
            if selected.len() >= max_inputs {
                break;
            }
            // The draw always budgets for a change output: privacy prefers
            // change over a fingerprintable changeless spend.
            let covered =
                total >= options.target_value + selection_fee(&selected, 2, options.fee_rate);
            if covered {
                if extra_draws == 0 {
                    break;
                }
                extra_draws -= 1;
            }
            total += utxo.value;
            selected.push(utxo);
        }

        let needed = options.target_value + selection_fee(&selected, 2, options.fee_rate);
        if total < needed {
            let minimal = options.target_value + selection_fee(&selected, 1, options.fee_rate);
            if total < minimal {
                return Err(SelectionFailure::insufficient_funds(available, minimal));
            }
        }
        settle(selected, options)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::selector::testutil::utxo;

    fn seeded(target: u64, fee_rate: u64, seed: u64) -> SelectionOptions {
        let mut options = SelectionOptions::new(target, fee_rate);
        options.rng_seed = Some(seed);
        options
    }

    #[test]
    fn covers_target_with_change() {
        let pool: Vec<Utxo> = (1..=8).map(|i| utxo(40_000, i)).collect();
        let options = seeded(90_000, 4, 1);
        let selection = SingleRandomDrawSelector::default().select(&pool, &options).unwrap();
        assert!(selection.total_value >= options.target_value + selection.fee);
        assert!(selection.change > 0);
        assert_eq!(
            selection.total_value,
            options.target_value + selection.change + selection.fee
        );
    }

    #[test]
    fn same_seed_same_draw() {
        let pool: Vec<Utxo> = (1..=10).map(|i| utxo(15_000 + 500 * i as u64, i)).collect();
        let options = seeded(42_000, 2, 99);
        let selector = SingleRandomDrawSelector::default();
        assert_eq!(
            selector.select(&pool, &options).unwrap(),
            selector.select(&pool, &options).unwrap()
        );
    }

    #[test]
    fn different_seeds_usually_differ() {
        let pool: Vec<Utxo> = (1..=10).map(|i| utxo(15_000 + 500 * i as u64, i)).collect();
        let selector = SingleRandomDrawSelector::default();
        let picks: Vec<_> = (0..8)
            .map(|seed| {
                let options = seeded(20_000, 2, seed);
                selector.select(&pool, &options).unwrap().outpoints()
            })
            .collect();
        assert!(picks.iter().any(|pick| pick != &picks[0]));
    }

    #[test]
    fn mix_depth_draws_extra_inputs() {
        let pool: Vec<Utxo> = (1..=10).map(|i| utxo(50_000, i)).collect();
        let options = seeded(40_000, 1, 5);
        let plain = SingleRandomDrawSelector::default().select(&pool, &options).unwrap();
        let mixed = SingleRandomDrawSelector::enhanced(2, false)
            .select(&pool, &options)
            .unwrap();
        assert_eq!(mixed.input_count, plain.input_count + 2);
    }

    #[test]
    fn insufficient_pool_reports_available() {
        let pool = vec![utxo(5_000, 1), utxo(5_000, 2)];
        let options = seeded(50_000, 1, 5);
        let err = SingleRandomDrawSelector::default().select(&pool, &options).unwrap_err();
        assert_eq!(err.available(), Some(10_000));
    }
}
