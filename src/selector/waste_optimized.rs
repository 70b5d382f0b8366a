//! Meta-selection: run a configurable multiset of strategies and keep the
//! success with the lowest weighted waste.
//!
//! Children run sequentially, each under a wall-clock budget enforced
//! cooperatively through a deadline token; a child that overruns is recorded
//! as a timeout and its result discarded. Per-strategy timings and usage
//! statistics accumulate across calls.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{FailureReason, SelectionFailure};
use crate::selector::{
    selection_fee, validate_options, AccumulativeSelector, BlackjackSelector,
    BranchAndBoundSelector, KnapsackSelector, SingleRandomDrawSelector, UtxoSelector,
};
use crate::size::{InputKind, OutputKind};
use crate::types::{Selection, SelectionOptions, Utxo};

/// Weights of the waste components used to rank successes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WasteWeights {
    /// Weight of the cost of creating and later respending change.
    pub change_cost: f64,
    /// Weight of fee paid above the pure rate (absorbed excess).
    pub excess: f64,
    /// Weight of the input spend cost at the current rate.
    pub input_cost: f64,
}

impl Default for WasteWeights {
    fn default() -> Self {
        Self {
            change_cost: 1.0,
            excess: 1.0,
            input_cost: 1.0,
        }
    }
}

/// Accumulated per-strategy usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStats {
    /// Times the strategy was run.
    pub attempts: u64,
    /// Times it produced a selection.
    pub successes: u64,
    /// Times it failed.
    pub failures: u64,
    /// Times it overran its budget or was cancelled.
    pub timeouts: u64,
    /// Times its selection won the ranking.
    pub wins: u64,
    /// Wall-clock spent inside the strategy.
    pub total_elapsed: Duration,
}

/// Meta-selector ranking child strategies by weighted waste.
#[derive(Debug)]
pub struct WasteOptimizedSelector {
    strategies: Vec<Box<dyn UtxoSelector>>,
    /// Ranking weights.
    pub weights: WasteWeights,
    /// Wall-clock budget per child strategy.
    pub strategy_timeout: Duration,
    stats: Mutex<BTreeMap<&'static str, StrategyStats>>,
}

impl Default for WasteOptimizedSelector {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BranchAndBoundSelector),
            Box::new(BlackjackSelector::default()),
            Box::new(KnapsackSelector::default()),
            Box::new(SingleRandomDrawSelector::default()),
            Box::new(AccumulativeSelector::default()),
        ])
    }
}

impl WasteOptimizedSelector {
    /// Meta-selector over an explicit strategy multiset.
    pub fn new(strategies: Vec<Box<dyn UtxoSelector>>) -> Self {
        Self {
            strategies,
            weights: WasteWeights::default(),
            strategy_timeout: Duration::from_secs(5),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot of the accumulated statistics.
    pub fn stats(&self) -> BTreeMap<&'static str, StrategyStats> {
        self.stats.lock().expect("stats lock").clone()
    }

    /// Weighted waste of a successful selection; lower wins.
    fn score(&self, selection: &Selection, options: &SelectionOptions) -> f64 {
        let rate = options.fee_rate;
        let long_term = options.long_term_rate();

        let change_cost = if selection.change > 0 {
            (OutputKind::P2wpkh.bytes() * rate + InputKind::P2wpkh.vbytes() * long_term) as f64
        } else {
            0.0
        };
        let fee_floor = selection_fee(
            &selection.inputs,
            selection.output_count as usize,
            rate,
        );
        let excess = selection.fee.saturating_sub(fee_floor) as f64;
        let input_cost: f64 = selection
            .inputs
            .iter()
            .map(|utxo: &Utxo| (utxo.input_kind().vbytes() * rate) as f64)
            .sum();

        self.weights.change_cost * change_cost
            + self.weights.excess * excess
            + self.weights.input_cost * input_cost
    }

    fn record(&self, name: &'static str, update: impl FnOnce(&mut StrategyStats)) {
        let mut stats = self.stats.lock().expect("stats lock");
        update(stats.entry(name).or_default());
    }
}

impl UtxoSelector for WasteOptimizedSelector {
    fn name(&self) -> &'static str {
        "waste-optimized"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;

        let mut best: Option<(&'static str, Selection, f64)> = None;
        let mut failures: BTreeMap<&'static str, SelectionFailure> = BTreeMap::new();

        for strategy in &self.strategies {
            if options.is_cancelled() {
                return Err(SelectionFailure::timeout(self.name(), true));
            }
            let name = strategy.name();

            let deadline = Instant::now() + self.strategy_timeout;
            let mut child_options = options.clone();
            let base = options.cancel.clone().unwrap_or_default();
            child_options.cancel = Some(base.with_deadline(deadline));

            let started = Instant::now();
            let outcome = strategy.select(utxos, &child_options);
            let elapsed = started.elapsed();
            let overran = elapsed > self.strategy_timeout;

            self.record(name, |stats| {
                stats.attempts += 1;
                stats.total_elapsed += elapsed;
            });

            let outcome = if overran {
                tracing::warn!(strategy = name, ?elapsed, "strategy overran its budget");
                Err(SelectionFailure::timeout(name, false))
            } else {
                outcome
            };

            match outcome {
                Ok(selection) => {
                    self.record(name, |stats| stats.successes += 1);
                    let score = self.score(&selection, options);
                    tracing::debug!(strategy = name, score, "strategy succeeded");
                    if best.as_ref().is_none_or(|(_, _, best_score)| score < *best_score) {
                        best = Some((name, selection, score));
                    }
                }
                Err(failure) => {
                    self.record(name, |stats| {
                        if failure.reason == FailureReason::Timeout {
                            stats.timeouts += 1;
                        } else {
                            stats.failures += 1;
                        }
                    });
                    failures.insert(name, failure);
                }
            }
        }

        match best {
            Some((winner, selection, _)) => {
                self.record(winner, |stats| stats.wins += 1);
                Ok(selection)
            }
            None => {
                // All children failed: propagate a shared reason, otherwise
                // wrap the per-strategy reasons up as diagnostics.
                let mut first_failure: Option<SelectionFailure> = None;
                let mut shared_reason = true;
                for child in failures.values() {
                    match &first_failure {
                        None => first_failure = Some(child.clone()),
                        Some(first) if first.reason == child.reason => {}
                        Some(_) => {
                            shared_reason = false;
                            break;
                        }
                    }
                }
                if shared_reason {
                    if let Some(failure) = first_failure {
                        return Err(failure);
                    }
                }

                let mut failure = SelectionFailure::new(
                    FailureReason::SelectionFailed,
                    "every strategy failed",
                );
                for (name, child) in failures {
                    failure = failure.with_detail(name, child.reason);
                }
                Err(failure)
            }
        }
    }
}
