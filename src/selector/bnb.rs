//! Branch-and-Bound selection, adapted from the Bitcoin Core search and
//! Erhardt's coin-selection thesis.
//!
//! Two passes over the effective-value decision tree: first for changeless
//! solutions (excess at or below the change dust threshold), then for
//! with-change solutions, both ranked by waste. Changeless hits prefer fewer
//! inputs, ties broken by waste. On total failure the accumulative
//! largest-first selector takes over.

use crate::constants::{BNB_MAX_DEPTH, BNB_TOTAL_TRIES};
use crate::error::SelectionFailure;
use crate::selector::accumulative::{accumulate_sorted, sort_for, SortOrder};
use crate::selector::waste::waste_units;
use crate::selector::{eligible_utxos, settle, validate_options, change_dust, UtxoSelector};
use crate::size::OutputKind;
use crate::types::{Selection, SelectionOptions, Utxo};

/// Branch-and-Bound with accumulative fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBoundSelector;

/// One admissible subset found by a search pass.
struct Candidate {
    picked: Vec<usize>,
    waste: i64,
}

struct Search<'a> {
    utxos: &'a [Utxo],
    eff: &'a [i64],
    suffix: &'a [i64],
    required: i64,
    /// Upper pruning bound: required + cost of creating and respending change.
    upper: i64,
    dust: u64,
    rate: u64,
    long_term: u64,
    max_inputs: usize,
    nodes: usize,
    changeless: bool,
    best: Option<Candidate>,
    cancelled: bool,
}

impl Search<'_> {
    fn run(&mut self, options: &SelectionOptions) {
        let mut picked = Vec::with_capacity(BNB_MAX_DEPTH);
        self.descend(0, 0, 0, &mut picked, options);
    }

    fn descend(
        &mut self,
        index: usize,
        sum_eff: i64,
        input_vbytes: u64,
        picked: &mut Vec<usize>,
        options: &SelectionOptions,
    ) {
        self.nodes += 1;
        if self.nodes > BNB_TOTAL_TRIES || self.cancelled {
            return;
        }
        if options.is_cancelled() {
            self.cancelled = true;
            return;
        }

        // Out of range: nothing below can recover.
        if sum_eff > self.upper {
            return;
        }

        if sum_eff >= self.required {
            self.consider(sum_eff, input_vbytes, picked);
            // Anything deeper only adds value on top of a covering set.
            return;
        }

        if index >= self.utxos.len() || picked.len() >= self.max_inputs {
            return;
        }
        // Even taking everything that remains cannot reach the target.
        if sum_eff + self.suffix[index] < self.required {
            return;
        }

        // Inclusion branch first (largest-first exploration).
        picked.push(index);
        self.descend(
            index + 1,
            sum_eff + self.eff[index],
            input_vbytes + self.utxos[index].input_kind().vbytes(),
            picked,
            options,
        );
        picked.pop();

        // Omission branch.
        self.descend(index + 1, sum_eff, input_vbytes, picked, options);
    }

    fn consider(&mut self, sum_eff: i64, input_vbytes: u64, picked: &[usize]) {
        let excess = (sum_eff - self.required) as u64;
        if self.changeless {
            if excess > self.dust {
                return;
            }
            let waste = waste_units(input_vbytes, excess, self.dust, self.rate, self.long_term);
            let better = match &self.best {
                None => true,
                Some(best) => {
                    picked.len() < best.picked.len()
                        || (picked.len() == best.picked.len() && waste < best.waste)
                }
            };
            if better {
                self.best = Some(Candidate {
                    picked: picked.to_vec(),
                    waste,
                });
            }
        } else {
            let change_fee = OutputKind::P2wpkh.bytes() * self.rate;
            let change = excess.saturating_sub(change_fee);
            if change < self.dust {
                return;
            }
            let waste = waste_units(input_vbytes, change, self.dust, self.rate, self.long_term);
            if self.best.as_ref().is_none_or(|best| waste < best.waste) {
                self.best = Some(Candidate {
                    picked: picked.to_vec(),
                    waste,
                });
            }
        }
    }
}

impl UtxoSelector for BranchAndBoundSelector {
    fn name(&self) -> &'static str {
        "branch-and-bound"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;

        let rate = options.fee_rate;
        let long_term = options.long_term_rate();
        let dust = change_dust(options);

        // Effective-value model: each input pays for itself, the skeleton
        // (overhead plus payment output) is folded into the required sum.
        let mut pool = sort_for(SortOrder::LargestFirst, eligible.clone());
        pool.sort_by(|a, b| b.effective_value(rate).cmp(&a.effective_value(rate)));
        pool.truncate(BNB_MAX_DEPTH);

        let eff: Vec<i64> = pool.iter().map(|utxo| utxo.effective_value(rate)).collect();
        let mut suffix: Vec<i64> = vec![0; pool.len()];
        let mut running = 0i64;
        for i in (0..pool.len()).rev() {
            running += eff[i];
            suffix[i] = running;
        }

        let skeleton = crate::size::tx_vsize(&[], &[OutputKind::P2wpkh]) * rate;
        let required = (options.target_value + skeleton) as i64;
        let cost_of_change =
            (OutputKind::P2wpkh.bytes() + crate::size::InputKind::P2wpkh.vbytes()) * rate;
        let max_inputs = options
            .max_inputs
            .map_or(BNB_MAX_DEPTH, |max| (max as usize).min(BNB_MAX_DEPTH));

        let mut nodes_used = 0;
        for changeless in [true, false] {
            let upper = if changeless {
                required + cost_of_change as i64
            } else {
                // With-change pass admits enough excess to fund change.
                required + (cost_of_change + dust) as i64 * 4
            };
            let mut search = Search {
                utxos: &pool,
                eff: &eff,
                suffix: &suffix,
                required,
                upper,
                dust,
                rate,
                long_term,
                max_inputs,
                nodes: nodes_used,
                changeless,
                best: None,
                cancelled: false,
            };
            search.run(options);
            if search.cancelled {
                return Err(SelectionFailure::timeout(self.name(), true));
            }
            nodes_used = search.nodes;

            if let Some(candidate) = search.best {
                let selected: Vec<Utxo> = candidate
                    .picked
                    .iter()
                    .map(|&index| pool[index].clone())
                    .collect();
                return settle(selected, options);
            }
        }

        tracing::debug!("branch-and-bound exhausted, falling back to accumulative");
        let fallback = accumulate_sorted(sort_for(SortOrder::LargestFirst, eligible), options)?;
        settle(fallback, options)
    }
}
