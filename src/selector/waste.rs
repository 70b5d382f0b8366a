//! The Murch waste metric, kept as a pure function so its properties can be
//! asserted without constructing a selector.

use crate::size::{InputKind, OutputKind};
use crate::types::Utxo;

/// Waste of a candidate selection, in sats. Lower is better.
///
/// `sum(input_size) * (rate - long_term)` prices spending now versus later;
/// when change is created the metric adds the cost of the change output now
/// plus respending it later; excess below the dust threshold that cannot
/// become change is counted sat for sat.
pub fn waste_units(
    input_vbytes: u64,
    change: u64,
    dust: u64,
    rate: u64,
    long_term: u64,
) -> i64 {
    let timing = input_vbytes as i64 * (rate as i64 - long_term as i64);
    let residue = if change >= dust && change > 0 {
        (OutputKind::P2wpkh.bytes() * rate + InputKind::P2wpkh.vbytes() * long_term) as i64
    } else {
        // 0 <= change < dust: unspendable residue, counted directly.
        change as i64
    };
    timing + residue
}

/// [`waste_units`] priced from a concrete input set.
pub fn waste_metric(inputs: &[Utxo], change: u64, dust: u64, rate: u64, long_term: u64) -> i64 {
    let input_vbytes: u64 = inputs.iter().map(|utxo| utxo.input_kind().vbytes()).sum();
    waste_units(input_vbytes, change, dust, rate, long_term)
}

#[cfg(test)]
mod test {
    use super::*;

    const INPUT_VBYTES: u64 = 48; // one P2WPKH input

    #[test]
    fn changeless_at_long_term_rate_is_free() {
        assert_eq!(waste_units(INPUT_VBYTES, 0, 294, 10, 10), 0);
    }

    #[test]
    fn high_current_rate_penalizes_extra_inputs() {
        let one = waste_units(INPUT_VBYTES, 0, 294, 30, 10);
        let three = waste_units(3 * INPUT_VBYTES, 0, 294, 30, 10);
        assert!(three > one);
    }

    #[test]
    fn low_current_rate_rewards_consolidation() {
        // Spending now is cheaper than spending later: negative timing term.
        let one = waste_units(INPUT_VBYTES, 0, 294, 2, 20);
        let three = waste_units(3 * INPUT_VBYTES, 0, 294, 2, 20);
        assert!(one < 0);
        assert!(three < one);
    }

    #[test]
    fn change_costs_more_than_no_change_at_equal_rates() {
        let changeless = waste_units(INPUT_VBYTES, 0, 294, 10, 10);
        let with_change = waste_units(INPUT_VBYTES, 5_000, 294, 10, 10);
        assert!(with_change > changeless);
    }

    #[test]
    fn dusty_excess_counts_sat_for_sat() {
        let base = waste_units(INPUT_VBYTES, 0, 294, 10, 10);
        let dusty = waste_units(INPUT_VBYTES, 150, 294, 10, 10);
        assert_eq!(dusty - base, 150);
    }
}
