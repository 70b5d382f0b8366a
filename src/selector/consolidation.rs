//! Consolidation selection: when blockspace is cheap relative to the
//! long-term rate, sweep small UTXOs alongside a primary large input to
//! shrink the wallet. High-fee regimes disable the sweep entirely.

use crate::error::SelectionFailure;
use crate::selector::accumulative::{accumulate_sorted, sort_for, SortOrder};
use crate::selector::{eligible_utxos, settle, validate_options, UtxoSelector};
use crate::types::{Selection, SelectionOptions, Utxo};

/// Knobs of the consolidation sweep.
#[derive(Debug, Clone, Copy)]
pub struct ConsolidationConfig {
    /// Value at or below which a UTXO counts as sweepable, in sats.
    pub small_utxo_threshold: u64,
    /// Minimum number of small UTXOs a sweep must include.
    pub min_consolidation_count: usize,
    /// Wallet size above which sweeping is worthwhile.
    pub target_pool_size: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            small_utxo_threshold: 10_000,
            min_consolidation_count: 5,
            target_pool_size: 20,
        }
    }
}

/// Rate-gated sweeping selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationSelector {
    /// Sweep configuration.
    pub config: ConsolidationConfig,
}

impl ConsolidationSelector {
    /// Selector with explicit sweep knobs.
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    /// Whether current conditions justify sweeping.
    fn should_consolidate(&self, pool_size: usize, options: &SelectionOptions) -> bool {
        options.fee_rate * 2 < options.long_term_rate() && pool_size > self.config.target_pool_size
    }

    /// Whether fees are high enough to force a minimal-input selection.
    fn high_fee_mode(options: &SelectionOptions) -> bool {
        options.fee_rate >= options.long_term_rate() * 2
    }

    fn sweep(
        &self,
        pool: Vec<Utxo>,
        options: &SelectionOptions,
    ) -> Result<Vec<Utxo>, SelectionFailure> {
        let (small, large): (Vec<Utxo>, Vec<Utxo>) = pool
            .into_iter()
            .partition(|utxo| utxo.value <= self.config.small_utxo_threshold);

        // Primary large input first, then smalls ascending so the cheapest
        // wallet clutter goes first.
        let mut order: Vec<Utxo> = Vec::with_capacity(small.len() + 1);
        if let Some(primary) = sort_for(SortOrder::LargestFirst, large).into_iter().next() {
            order.push(primary);
        }
        order.extend(sort_for(SortOrder::SmallestFirst, small));

        let mut selected = accumulate_sorted(order.clone(), options)?;

        // Keep sweeping past coverage up to the configured count, as long as
        // every extra input still pays for itself and the cap allows it.
        let max_inputs = options.max_inputs.map_or(usize::MAX, |max| max as usize);
        let extras: Vec<Utxo> = order
            .into_iter()
            .filter(|utxo| utxo.value <= self.config.small_utxo_threshold)
            .filter(|utxo| !selected.iter().any(|s| s.outpoint() == utxo.outpoint()))
            .filter(|utxo| utxo.effective_value(options.fee_rate) > 0)
            .collect();
        for utxo in extras {
            if small_count(&selected, self.config.small_utxo_threshold)
                >= self.config.min_consolidation_count
                || selected.len() >= max_inputs
            {
                break;
            }
            selected.push(utxo);
        }
        Ok(selected)
    }
}

fn small_count(selected: &[Utxo], threshold: u64) -> usize {
    selected.iter().filter(|utxo| utxo.value <= threshold).count()
}

impl UtxoSelector for ConsolidationSelector {
    fn name(&self) -> &'static str {
        "consolidation"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;

        if Self::high_fee_mode(options) || !self.should_consolidate(eligible.len(), options) {
            let minimal = accumulate_sorted(sort_for(SortOrder::LargestFirst, eligible), options)?;
            return settle(minimal, options);
        }

        let selected = self.sweep(eligible, options)?;
        settle(selected, options)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::selector::testutil::utxo;

    fn crowded_pool() -> Vec<Utxo> {
        let mut pool: Vec<Utxo> = (1..=30).map(|i| utxo(8_000, i)).collect();
        pool.push(utxo(200_000, 31));
        pool
    }

    #[test]
    fn cheap_blockspace_sweeps_small_utxos() {
        let mut options = SelectionOptions::new(100_000, 1);
        options.long_term_fee_rate = Some(10);

        let selector = ConsolidationSelector::default();
        let selection = selector.select(&crowded_pool(), &options).unwrap();

        let smalls = selection
            .inputs
            .iter()
            .filter(|input| input.value <= 10_000)
            .count();
        assert!(smalls >= selector.config.min_consolidation_count);
        assert!(selection.inputs.iter().any(|input| input.value == 200_000));
        assert_eq!(
            selection.total_value,
            options.target_value + selection.change + selection.fee
        );
    }

    #[test]
    fn high_fees_fall_back_to_minimal_inputs() {
        let mut options = SelectionOptions::new(100_000, 25);
        options.long_term_fee_rate = Some(10);

        let selection = ConsolidationSelector::default()
            .select(&crowded_pool(), &options)
            .unwrap();
        assert_eq!(selection.input_count, 1);
        assert_eq!(selection.inputs[0].value, 200_000);
    }

    #[test]
    fn small_wallet_does_not_bother_sweeping() {
        let pool = vec![utxo(8_000, 1), utxo(8_000, 2), utxo(200_000, 3)];
        let mut options = SelectionOptions::new(50_000, 1);
        options.long_term_fee_rate = Some(10);

        let selection = ConsolidationSelector::default().select(&pool, &options).unwrap();
        assert_eq!(selection.input_count, 1);
    }

    #[test]
    fn sweep_honors_max_inputs() {
        let mut options = SelectionOptions::new(100_000, 1);
        options.long_term_fee_rate = Some(10);
        options.max_inputs = Some(3);

        let selection = ConsolidationSelector::default()
            .select(&crowded_pool(), &options)
            .unwrap();
        assert!(selection.input_count <= 3);
    }
}
