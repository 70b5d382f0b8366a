//! Tax-optimized selection: cost-basis-aware pre-sorts over externally
//! supplied acquisition metadata, with realized-gain annotation.

use std::collections::BTreeMap;

use bitcoin::OutPoint;

use crate::error::SelectionFailure;
use crate::selector::accumulative::accumulate_sorted;
use crate::selector::{eligible_utxos, settle, validate_options, UtxoSelector};
use crate::types::{Selection, SelectionOptions, Utxo};

const SECONDS_PER_DAY: u64 = 86_400;

/// Acquisition metadata of one UTXO.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBasis {
    /// Acquisition time, unix seconds.
    pub acquired_unix: u64,
    /// Acquisition price in USD per BTC.
    pub unit_price_usd: f64,
}

/// External cost-basis metadata, keyed by outpoint.
pub type CostBasisBook = BTreeMap<OutPoint, CostBasis>;

/// Lot-ordering strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaxStrategy {
    /// Oldest lots first.
    #[default]
    Fifo,
    /// Newest lots first.
    Lifo,
    /// Highest cost basis first (minimizes gains).
    Hifo,
    /// Lowest cost basis first (harvests gains).
    Lofo,
    /// Exactly these lots, in this order.
    SpecificId(Vec<OutPoint>),
}

/// One input's realized gain.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedGain {
    /// The spent lot.
    pub outpoint: OutPoint,
    /// Lot value in sats.
    pub value: u64,
    /// Days held at disposal.
    pub holding_days: u64,
    /// Whether the holding period crossed the long-term threshold.
    pub long_term: bool,
    /// Gain in USD at the provided spot price.
    pub gain_usd: f64,
}

/// Realized gains of a selection, split by holding period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxReport {
    /// Per-input gains, in selection order. Lots without metadata are absent.
    pub gains: Vec<RealizedGain>,
    /// Total short-term gain in USD.
    pub short_term_usd: f64,
    /// Total long-term gain in USD.
    pub long_term_usd: f64,
}

/// Cost-basis-aware accumulation.
#[derive(Debug, Clone)]
pub struct TaxOptimizedSelector {
    /// Lot ordering.
    pub strategy: TaxStrategy,
    /// Acquisition metadata per outpoint.
    pub book: CostBasisBook,
    /// Holding period separating short- from long-term, in days.
    pub long_term_threshold_days: u64,
}

impl Default for TaxOptimizedSelector {
    fn default() -> Self {
        Self {
            strategy: TaxStrategy::Fifo,
            book: CostBasisBook::new(),
            long_term_threshold_days: 365,
        }
    }
}

impl TaxOptimizedSelector {
    /// Selector over `book` with the given ordering.
    pub fn new(strategy: TaxStrategy, book: CostBasisBook) -> Self {
        Self {
            strategy,
            book,
            ..Self::default()
        }
    }

    fn ordered(&self, eligible: Vec<Utxo>) -> Vec<Utxo> {
        match &self.strategy {
            TaxStrategy::SpecificId(lots) => lots
                .iter()
                .filter_map(|outpoint| {
                    eligible.iter().find(|utxo| utxo.outpoint() == *outpoint).cloned()
                })
                .collect(),
            sort => {
                let mut pool = eligible;
                // Lots without metadata sort last under every ordering.
                match sort {
                    TaxStrategy::Fifo => pool.sort_by_key(|utxo| {
                        self.basis_of(utxo).map_or(u64::MAX, |basis| basis.acquired_unix)
                    }),
                    TaxStrategy::Lifo => pool.sort_by_key(|utxo| {
                        std::cmp::Reverse(self.basis_of(utxo).map_or(0, |basis| basis.acquired_unix))
                    }),
                    TaxStrategy::Hifo => pool.sort_by(|a, b| {
                        price_key(self.basis_of(b)).total_cmp(&price_key(self.basis_of(a)))
                    }),
                    TaxStrategy::Lofo => pool.sort_by(|a, b| {
                        price_key(self.basis_of(a)).total_cmp(&price_key(self.basis_of(b)))
                    }),
                    TaxStrategy::SpecificId(_) => unreachable!("handled above"),
                }
                pool
            }
        }
    }

    fn basis_of(&self, utxo: &Utxo) -> Option<CostBasis> {
        self.book.get(&utxo.outpoint()).copied()
    }

    /// Annotate a finished selection with realized gains at `spot_price_usd`,
    /// as of `as_of_unix`.
    pub fn report(&self, selection: &Selection, spot_price_usd: f64, as_of_unix: u64) -> TaxReport {
        let mut report = TaxReport::default();
        for input in &selection.inputs {
            let Some(basis) = self.basis_of(input) else {
                continue;
            };
            let holding_days = as_of_unix.saturating_sub(basis.acquired_unix) / SECONDS_PER_DAY;
            let long_term = holding_days >= self.long_term_threshold_days;
            let btc = input.value as f64 / 100_000_000.0;
            let gain_usd = (spot_price_usd - basis.unit_price_usd) * btc;
            if long_term {
                report.long_term_usd += gain_usd;
            } else {
                report.short_term_usd += gain_usd;
            }
            report.gains.push(RealizedGain {
                outpoint: input.outpoint(),
                value: input.value,
                holding_days,
                long_term,
                gain_usd,
            });
        }
        report
    }

    /// Select and annotate in one pass.
    pub fn select_with_report(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
        spot_price_usd: f64,
        as_of_unix: u64,
    ) -> Result<(Selection, TaxReport), SelectionFailure> {
        let selection = self.select(utxos, options)?;
        let report = self.report(&selection, spot_price_usd, as_of_unix);
        Ok((selection, report))
    }
}

fn price_key(basis: Option<CostBasis>) -> f64 {
    basis.map_or(f64::NEG_INFINITY, |basis| basis.unit_price_usd)
}

impl UtxoSelector for TaxOptimizedSelector {
    fn name(&self) -> &'static str {
        "tax-optimized"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        validate_options(options)?;
        let eligible = eligible_utxos(utxos, options)?;
        let ordered = self.ordered(eligible);
        if ordered.is_empty() {
            return Err(SelectionFailure::no_solution(
                self.name(),
                "no listed lot is spendable",
            ));
        }
        let selected = accumulate_sorted(ordered, options)?;
        settle(selected, options)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::selector::testutil::utxo;

    const DAY: u64 = 86_400;
    const NOW: u64 = 1_700_000_000;

    fn book_for(pool: &[Utxo], entries: &[(u64, f64)]) -> CostBasisBook {
        pool.iter()
            .zip(entries)
            .map(|(utxo, &(age_days, price))| {
                (
                    utxo.outpoint(),
                    CostBasis {
                        acquired_unix: NOW - age_days * DAY,
                        unit_price_usd: price,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn fifo_spends_the_oldest_lot() {
        let pool = vec![utxo(80_000, 1), utxo(80_000, 2), utxo(80_000, 3)];
        let book = book_for(&pool, &[(30, 40_000.0), (900, 20_000.0), (400, 30_000.0)]);
        let selector = TaxOptimizedSelector::new(TaxStrategy::Fifo, book);

        let selection = selector.select(&pool, &SelectionOptions::new(50_000, 2)).unwrap();
        assert_eq!(selection.inputs[0].outpoint(), pool[1].outpoint());
    }

    #[test]
    fn hifo_minimizes_gains() {
        let pool = vec![utxo(80_000, 1), utxo(80_000, 2)];
        let book = book_for(&pool, &[(400, 20_000.0), (400, 60_000.0)]);
        let selector = TaxOptimizedSelector::new(TaxStrategy::Hifo, book);

        let (selection, report) = selector
            .select_with_report(&pool, &SelectionOptions::new(50_000, 2), 65_000.0, NOW)
            .unwrap();
        assert_eq!(selection.inputs[0].outpoint(), pool[1].outpoint());
        // 80k sats at a 5k USD/BTC gain.
        let expected = 5_000.0 * 0.0008;
        assert!((report.long_term_usd - expected).abs() < 1e-9);
        assert_eq!(report.short_term_usd, 0.0);
    }

    #[test]
    fn holding_period_classifies_gains() {
        let pool = vec![utxo(100_000, 1), utxo(100_000, 2)];
        let book = book_for(&pool, &[(100, 30_000.0), (800, 30_000.0)]);
        let selector = TaxOptimizedSelector::new(TaxStrategy::Lofo, book);
        let mut options = SelectionOptions::new(150_000, 1);
        options.rng_seed = None;

        let (_, report) = selector
            .select_with_report(&pool, &options, 50_000.0, NOW)
            .unwrap();
        assert_eq!(report.gains.len(), 2);
        assert_eq!(report.gains.iter().filter(|gain| gain.long_term).count(), 1);
        assert_eq!(report.gains.iter().filter(|gain| !gain.long_term).count(), 1);
    }

    #[test]
    fn specific_id_spends_only_listed_lots() {
        let pool = vec![utxo(90_000, 1), utxo(90_000, 2), utxo(90_000, 3)];
        let strategy = TaxStrategy::SpecificId(vec![pool[2].outpoint(), pool[0].outpoint()]);
        let selector = TaxOptimizedSelector::new(strategy, CostBasisBook::new());

        let selection = selector.select(&pool, &SelectionOptions::new(120_000, 1)).unwrap();
        assert_eq!(selection.inputs[0].outpoint(), pool[2].outpoint());
        assert_eq!(selection.inputs[1].outpoint(), pool[0].outpoint());
    }
}
