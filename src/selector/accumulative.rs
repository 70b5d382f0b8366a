//! Accumulative selection: sort, then include until the target plus fee is
//! met. The sort order doubles as the strategy knob, which is also where the
//! legacy FIFO/LIFO selectors collapsed into.

use crate::error::SelectionFailure;
use crate::selector::{eligible_utxos, selection_fee, settle, validate_options, UtxoSelector};
use crate::types::{Selection, SelectionOptions, Utxo};

/// Pre-sort applied before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Descending value; the minimal-input default.
    #[default]
    LargestFirst,
    /// Most confirmations first (FIFO over the wallet's history).
    OldestFirst,
    /// Ascending value; the consolidation order.
    SmallestFirst,
}

/// Sort-then-accumulate selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulativeSelector {
    /// Sort order; `options.consolidate` overrides it to smallest-first.
    pub order: SortOrder,
}

impl AccumulativeSelector {
    /// Selector with an explicit sort order.
    pub fn new(order: SortOrder) -> Self {
        Self { order }
    }
}

/// Include from `sorted` until the accumulated value covers the target plus
/// the fee of the running selection. Shared by the fallback paths of other
/// selectors.
pub(crate) fn accumulate_sorted(
    sorted: Vec<Utxo>,
    options: &SelectionOptions,
) -> Result<Vec<Utxo>, SelectionFailure> {
    let available: u64 = sorted.iter().map(|utxo| utxo.value).sum();
    let max_inputs = options.max_inputs.map(|max| max as usize);

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total: u64 = 0;
    for utxo in sorted {
        if options.is_cancelled() {
            return Err(SelectionFailure::timeout("accumulative", true));
        }
        if max_inputs.is_some_and(|max| selected.len() == max) {
            break;
        }
        total += utxo.value;
        selected.push(utxo);
        if total >= options.target_value + selection_fee(&selected, 1, options.fee_rate) {
            return Ok(selected);
        }
    }

    // Ran out of inputs or hit the cap before covering the target.
    let needed = options.target_value + selection_fee(&selected, 1, options.fee_rate);
    if available >= needed {
        Err(SelectionFailure::exceeds_max_inputs(
            options.max_inputs.unwrap_or(selected.len() as u32),
        ))
    } else {
        Err(SelectionFailure::insufficient_funds(available, needed))
    }
}

/// Sort `utxos` for accumulation under `order`.
pub(crate) fn sort_for(order: SortOrder, mut utxos: Vec<Utxo>) -> Vec<Utxo> {
    match order {
        SortOrder::LargestFirst => utxos.sort_by(|a, b| b.value.cmp(&a.value)),
        SortOrder::OldestFirst => {
            utxos.sort_by(|a, b| b.confirmations.unwrap_or(0).cmp(&a.confirmations.unwrap_or(0)))
        }
        SortOrder::SmallestFirst => utxos.sort_by_key(|utxo| utxo.value),
    }
    utxos
}

impl UtxoSelector for AccumulativeSelector {
    fn name(&self) -> &'static str {
        "accumulative"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;

        let order = if options.consolidate {
            SortOrder::SmallestFirst
        } else {
            self.order
        };
        let selected = accumulate_sorted(sort_for(order, eligible), options)?;
        settle(selected, options)
    }
}
