//! UTXO selection algorithms behind one contract.
//!
//! Every selector validates its options, filters the UTXO set by
//! confirmations and the protection oracle, searches, and either returns a
//! [`Selection`] honoring the success invariants or a [`SelectionFailure`].
//! Selectors never retry.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{NoUtxosCause, SelectionFailure};
use crate::fee::{dust_threshold, fee_for};
use crate::size::{tx_vsize, InputKind, OutputKind};
use crate::types::{Selection, SelectionOptions, Utxo};

pub mod accumulative;
pub mod blackjack;
pub mod bnb;
pub mod consolidation;
pub mod knapsack;
pub mod srd;
pub mod tax;
pub mod waste;
pub mod waste_optimized;

pub use accumulative::{AccumulativeSelector, SortOrder};
pub use blackjack::BlackjackSelector;
pub use bnb::BranchAndBoundSelector;
pub use consolidation::{ConsolidationConfig, ConsolidationSelector};
pub use knapsack::KnapsackSelector;
pub use srd::SingleRandomDrawSelector;
pub use tax::{CostBasis, CostBasisBook, RealizedGain, TaxOptimizedSelector, TaxReport, TaxStrategy};
pub use waste_optimized::{StrategyStats, WasteOptimizedSelector, WasteWeights};

/// Common contract of every selection algorithm.
pub trait UtxoSelector: Debug + Send + Sync {
    /// Stable algorithm name, used in diagnostics and meta-selection stats.
    fn name(&self) -> &'static str;

    /// Attempt a selection over `utxos` under `options`.
    fn select(&self, utxos: &[Utxo], options: &SelectionOptions)
        -> Result<Selection, SelectionFailure>;
}

/// Named selection algorithms constructible without external metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    /// Branch-and-Bound with accumulative fallback.
    BranchAndBound,
    /// Exact-match subset search.
    Blackjack,
    /// Stochastic knapsack.
    Knapsack,
    /// Single random draw.
    SingleRandomDraw,
    /// Largest-first accumulation.
    Accumulative,
    /// Meta-selector ranking child strategies by weighted waste.
    WasteOptimized,
    /// Rate-gated small-UTXO sweeping.
    Consolidation,
    /// Cost-basis-aware accumulation.
    TaxOptimized,
}

/// Factory: a boxed handle for the named algorithm with default parameters.
pub fn selector_for(kind: SelectorKind) -> Box<dyn UtxoSelector> {
    match kind {
        SelectorKind::BranchAndBound => Box::new(BranchAndBoundSelector::default()),
        SelectorKind::Blackjack => Box::new(BlackjackSelector::default()),
        SelectorKind::Knapsack => Box::new(KnapsackSelector::default()),
        SelectorKind::SingleRandomDraw => Box::new(SingleRandomDrawSelector::default()),
        SelectorKind::Accumulative => Box::new(AccumulativeSelector::default()),
        SelectorKind::WasteOptimized => Box::new(WasteOptimizedSelector::default()),
        SelectorKind::Consolidation => Box::new(ConsolidationSelector::default()),
        SelectorKind::TaxOptimized => Box::new(TaxOptimizedSelector::default()),
    }
}

/// Check the selector preconditions.
pub(crate) fn validate_options(options: &SelectionOptions) -> Result<(), SelectionFailure> {
    if options.target_value == 0 {
        return Err(SelectionFailure::invalid_options("target_value must be positive"));
    }
    if options.fee_rate == 0 {
        return Err(SelectionFailure::invalid_options("fee_rate must be positive"));
    }
    if options.max_inputs == Some(0) {
        return Err(SelectionFailure::invalid_options("max_inputs must be positive when set"));
    }
    Ok(())
}

/// Filter the wallet view down to eligible UTXOs.
///
/// Drops unconfirmed-below-threshold, uneconomical (negative effective value)
/// and oracle-protected UTXOs. Oracle errors are fail-safe: the UTXO is kept
/// as unprotected and the error logged.
pub(crate) fn eligible_utxos(
    utxos: &[Utxo],
    options: &SelectionOptions,
) -> Result<Vec<Utxo>, SelectionFailure> {
    if utxos.is_empty() {
        return Err(SelectionFailure::no_utxos(NoUtxosCause::Empty));
    }

    let confirmed: Vec<&Utxo> = match options.min_confirmations {
        Some(min) => utxos
            .iter()
            .filter(|utxo| utxo.confirmations.unwrap_or(0) >= min)
            .collect(),
        None => utxos.iter().collect(),
    };
    if confirmed.is_empty() {
        return Err(SelectionFailure::no_utxos(NoUtxosCause::LowConfirmations));
    }

    let economical: Vec<&Utxo> = confirmed
        .iter()
        .copied()
        .filter(|utxo| utxo.effective_value(options.fee_rate) > 0)
        .collect();
    if economical.is_empty() {
        return Err(SelectionFailure::no_utxos(NoUtxosCause::AllDust));
    }

    let eligible: Vec<Utxo> = match &options.oracle {
        Some(oracle) => economical
            .iter()
            .copied()
            .filter(|utxo| !is_protected_fail_safe(oracle, utxo))
            .cloned()
            .collect(),
        None => economical.into_iter().cloned().collect(),
    };
    if eligible.is_empty() {
        return Err(SelectionFailure::no_utxos(NoUtxosCause::AllProtected));
    }

    Ok(eligible)
}

fn is_protected_fail_safe(oracle: &Arc<dyn crate::protection::ProtectionOracle>, utxo: &Utxo) -> bool {
    match oracle.is_protected(utxo) {
        Ok(protected) => protected,
        Err(err) => {
            tracing::warn!(outpoint = %utxo.outpoint(), %err, "oracle failed, treating UTXO as unprotected");
            false
        }
    }
}

/// Fee for `inputs` plus `n_outputs` assumed-P2WPKH outputs.
pub(crate) fn selection_fee(inputs: &[Utxo], n_outputs: usize, fee_rate: u64) -> u64 {
    let input_kinds: Vec<InputKind> = inputs.iter().map(Utxo::input_kind).collect();
    let output_kinds = vec![OutputKind::P2wpkh; n_outputs];
    fee_for(&input_kinds, &output_kinds, fee_rate)
}

/// The change dust threshold in effect for `options`.
pub(crate) fn change_dust(options: &SelectionOptions) -> u64 {
    options
        .dust_threshold
        .unwrap_or_else(|| dust_threshold(OutputKind::P2wpkh, options.fee_rate))
}

/// Finish a selection: decide change versus absorption and fill in the
/// result invariants.
///
/// `total = target + change + fee` holds exactly; a remainder below the
/// change dust threshold is absorbed into fee, which keeps the effective
/// rate at or above the requested one.
pub(crate) fn settle(
    inputs: Vec<Utxo>,
    options: &SelectionOptions,
) -> Result<Selection, SelectionFailure> {
    if let Some(max) = options.max_inputs {
        if inputs.len() as u32 > max {
            return Err(SelectionFailure::exceeds_max_inputs(max));
        }
    }

    let total_value: u64 = inputs.iter().map(|utxo| utxo.value).sum();
    let target = options.target_value;
    let fee_rate = options.fee_rate;
    let dust = change_dust(options);

    let fee_no_change = selection_fee(&inputs, 1, fee_rate);
    if total_value < target + fee_no_change {
        return Err(SelectionFailure::insufficient_funds(
            total_value,
            target + fee_no_change,
        ));
    }

    let fee_with_change = selection_fee(&inputs, 2, fee_rate);
    let remainder = total_value - target;

    let (change, fee, output_count) = if remainder >= fee_with_change + dust {
        (remainder - fee_with_change, fee_with_change, 2)
    } else {
        (0, remainder, 1)
    };

    let input_kinds: Vec<InputKind> = inputs.iter().map(Utxo::input_kind).collect();
    let output_kinds = vec![OutputKind::P2wpkh; output_count as usize];
    let estimated_vsize = tx_vsize(&input_kinds, &output_kinds);
    let effective_fee_rate = fee as f64 / estimated_vsize as f64;
    let waste = waste::waste_metric(&inputs, change, dust, fee_rate, options.long_term_rate());

    Ok(Selection {
        input_count: inputs.len() as u32,
        inputs,
        total_value,
        change,
        fee,
        output_count,
        estimated_vsize,
        effective_fee_rate,
        waste: Some(waste),
    })
}
