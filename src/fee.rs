//! Fee-rate normalization, fee computation and dynamic dust thresholds.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DUST_P2PKH, DUST_P2SH, DUST_P2TR, DUST_P2WPKH, DUST_P2WSH, MAX_FEE_RATE, MIN_FEE_RATE,
    STAMP_DUST,
};
use crate::size::{tx_vsize, InputKind, OutputKind};

/// Where a raw fee-rate figure came from. Sources disagree on units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRateSource {
    /// ElectrumX `estimatefee`-style replies, quoted in sat/kB.
    ElectrumX,
    /// Block-explorer and mempool-style APIs, already in sat/vB.
    Explorer,
}

/// A fee rate normalized to whole sat/vB, with a confidence weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFeeRate {
    /// Rate in sat/vB after unit conversion and clamping.
    pub sat_per_vb: u64,
    /// 1.0 inside the ordinary band, attenuated outside it.
    pub confidence: f32,
    /// Whether the raw figure fell outside the acceptable range.
    pub clamped: bool,
}

/// Normalize a raw fee-rate figure to sat/vB.
///
/// ElectrumX quotes sat/kB and is divided by 1000; explorer responses pass
/// through. Rates below 1 or above 1000 sat/vB are clamped. Confidence is
/// attenuated outside the [5, 100] band and further when clamping fired.
pub fn normalize_fee_rate(raw: f64, source: FeeRateSource) -> NormalizedFeeRate {
    let sat_per_vb = match source {
        FeeRateSource::ElectrumX => raw / 1000.0,
        FeeRateSource::Explorer => raw,
    };

    let clamped = !(MIN_FEE_RATE as f64..=MAX_FEE_RATE as f64).contains(&sat_per_vb);
    let rate = sat_per_vb
        .round()
        .clamp(MIN_FEE_RATE as f64, MAX_FEE_RATE as f64) as u64;

    let confidence = if clamped {
        0.25
    } else if (5..=100).contains(&rate) {
        1.0
    } else {
        0.5
    };

    NormalizedFeeRate {
        sat_per_vb: rate,
        confidence,
        clamped,
    }
}

/// Fee for the given input/output mix at `fee_rate` sat/vB.
pub fn fee_for(inputs: &[InputKind], outputs: &[OutputKind], fee_rate: u64) -> u64 {
    tx_vsize(inputs, outputs) * fee_rate
}

/// Network dust floor of an output type at the 1 sat/vB anchor.
pub fn dust_floor(kind: OutputKind) -> u64 {
    match kind {
        OutputKind::P2pkh => DUST_P2PKH,
        OutputKind::P2sh => DUST_P2SH,
        OutputKind::P2wpkh => DUST_P2WPKH,
        OutputKind::P2wsh => DUST_P2WSH,
        OutputKind::P2tr => DUST_P2TR,
        OutputKind::OpReturn { .. } => 0,
    }
}

/// Dynamic dust threshold of an output type at `fee_rate` sat/vB (mainnet).
///
/// An output is dust when it costs more to create and later spend than it is
/// worth: ceil((input_size + output_size) * rate), clamped below by the
/// per-type network floor. OP_RETURN is unspendable, so its input size is
/// zero.
pub fn dust_threshold(kind: OutputKind, fee_rate: u64) -> u64 {
    let input_vbytes = kind.spending_input().map_or(0, |input| input.vbytes());
    let computed = (input_vbytes + kind.bytes()) * fee_rate;
    computed.max(dust_floor(kind))
}

/// Dust threshold honoring the network: regtest imposes none.
pub fn dust_threshold_for(network: Network, kind: OutputKind, fee_rate: u64) -> u64 {
    if network == Network::Regtest {
        return 0;
    }
    dust_threshold(kind, fee_rate)
}

/// Cost breakdown of the SRC-20 data leg of a transaction.
///
/// Each chunk locks the P2WSH dust value and pays its own fee share; services
/// that charge a premium scale the data share of the fee by a multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Src20FeeDetails {
    /// Number of P2WSH data chunks.
    pub chunk_count: usize,
    /// Sats locked into chunk outputs.
    pub chunk_dust_total: u64,
    /// Fee share of the chunk outputs at the requested rate.
    pub data_fee: u64,
    /// Multiplier applied to the data fee share.
    pub premium_multiplier: f64,
    /// `chunk_dust_total` plus the scaled data fee.
    pub total: u64,
}

/// Price the data leg of an SRC-20 transaction.
pub fn src20_fee_details(chunk_count: usize, fee_rate: u64, premium_multiplier: f64) -> Src20FeeDetails {
    let chunk_dust_total = STAMP_DUST * chunk_count as u64;
    let data_fee = OutputKind::P2wsh.bytes() * chunk_count as u64 * fee_rate;
    let scaled = (data_fee as f64 * premium_multiplier).ceil() as u64;
    Src20FeeDetails {
        chunk_count,
        chunk_dust_total,
        data_fee,
        premium_multiplier,
        total: chunk_dust_total + scaled,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn electrumx_rates_are_divided_down() {
        let rate = normalize_fee_rate(25_000.0, FeeRateSource::ElectrumX);
        assert_eq!(rate.sat_per_vb, 25);
        assert_eq!(rate.confidence, 1.0);
        assert!(!rate.clamped);
    }

    #[test]
    fn explorer_rates_pass_through() {
        let rate = normalize_fee_rate(12.0, FeeRateSource::Explorer);
        assert_eq!(rate.sat_per_vb, 12);
        assert_eq!(rate.confidence, 1.0);
    }

    #[test]
    fn out_of_range_rates_clamp_with_low_confidence() {
        let low = normalize_fee_rate(0.2, FeeRateSource::Explorer);
        assert_eq!(low.sat_per_vb, 1);
        assert!(low.clamped);
        assert_eq!(low.confidence, 0.25);

        let high = normalize_fee_rate(5_000.0, FeeRateSource::Explorer);
        assert_eq!(high.sat_per_vb, 1000);
        assert!(high.clamped);
    }

    #[test]
    fn band_edges_attenuate_confidence() {
        assert_eq!(normalize_fee_rate(2.0, FeeRateSource::Explorer).confidence, 0.5);
        assert_eq!(normalize_fee_rate(400.0, FeeRateSource::Explorer).confidence, 0.5);
    }

    #[test]
    fn dust_at_one_sat_per_vb_is_the_canonical_table() {
        assert_eq!(dust_threshold(OutputKind::P2pkh, 1), 546);
        assert_eq!(dust_threshold(OutputKind::P2wpkh, 1), 294);
        assert_eq!(dust_threshold(OutputKind::P2sh, 1), 540);
        assert_eq!(dust_threshold(OutputKind::P2wsh, 1), 330);
        assert_eq!(dust_threshold(OutputKind::P2tr, 1), 330);
    }

    #[test]
    fn dust_scales_with_long_term_rate() {
        let at_one = dust_threshold(OutputKind::P2wpkh, 1);
        let at_twenty = dust_threshold(OutputKind::P2wpkh, 20);
        assert!(at_twenty > at_one);
        // input 48 vB (41 + ceil(27 / 4)) + output 31 vB
        assert_eq!(at_twenty, (48 + 31) * 20);
    }

    #[test]
    fn regtest_has_no_dust() {
        assert_eq!(dust_threshold_for(Network::Regtest, OutputKind::P2wpkh, 50), 0);
        assert_eq!(
            dust_threshold_for(Network::Bitcoin, OutputKind::P2wpkh, 1),
            294
        );
    }

    #[test]
    fn src20_premium_scales_only_the_fee_share() {
        let flat = src20_fee_details(4, 10, 1.0);
        let premium = src20_fee_details(4, 10, 1.5);
        assert_eq!(flat.chunk_dust_total, premium.chunk_dust_total);
        assert_eq!(flat.chunk_dust_total, 4 * 330);
        assert!(premium.total > flat.total);
        assert_eq!(flat.total, flat.chunk_dust_total + flat.data_fee);
    }
}
