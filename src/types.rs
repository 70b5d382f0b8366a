//! Shared data model: wallet UTXOs, selection options and results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_LONG_TERM_FEE_RATE;
use crate::protection::ProtectionOracle;
use crate::size::InputKind;

/// A spendable transaction output as observed from the wallet view.
///
/// Immutable once observed; identity is `(txid, vout)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction id.
    pub txid: Txid,
    /// Output index within the funding transaction.
    pub vout: u32,
    /// Value in sats.
    pub value: u64,
    /// Locking script.
    pub script_pubkey: ScriptBuf,
    /// Confirmation count, if known.
    pub confirmations: Option<u32>,
    /// Owning address, if known.
    pub address: Option<String>,
}

impl Utxo {
    /// Identity of this UTXO.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    /// The input kind spending this UTXO would contribute.
    pub fn input_kind(&self) -> InputKind {
        InputKind::from_script_pubkey(&self.script_pubkey)
    }

    /// Fee cost of spending this UTXO at `fee_rate` sat/vB.
    pub fn spend_fee(&self, fee_rate: u64) -> u64 {
        self.input_kind().vbytes() * fee_rate
    }

    /// Value minus the fee cost of spending it; negative when uneconomical.
    pub fn effective_value(&self, fee_rate: u64) -> i64 {
        self.value as i64 - self.spend_fee(fee_rate) as i64
    }
}

/// Cooperative cancellation handle.
///
/// Selection loops poll it at iteration boundaries; the builder polls it at
/// every suspension point. A deadline makes the token double as a wall-clock
/// budget.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// A token that only fires when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token sharing this one's flag that additionally fires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Options governing one selection attempt.
#[derive(Debug, Clone)]
pub struct SelectionOptions {
    /// Sats the selected inputs must cover before fees.
    pub target_value: u64,
    /// Current fee rate in sat/vB.
    pub fee_rate: u64,
    /// Cap on the number of inputs, if any.
    pub max_inputs: Option<u32>,
    /// Minimum confirmations an eligible UTXO must have.
    pub min_confirmations: Option<u32>,
    /// Override for the change dust threshold, in sats.
    pub dust_threshold: Option<u64>,
    /// Long-term fee rate for waste and consolidation decisions, in sat/vB.
    pub long_term_fee_rate: Option<u64>,
    /// Protection oracle consulted during eligibility filtering.
    pub oracle: Option<Arc<dyn ProtectionOracle>>,
    /// Prefer sweeping many small inputs over a minimal selection.
    pub consolidate: bool,
    /// Seed for the stochastic selectors; entropy when absent.
    pub rng_seed: Option<u64>,
    /// Cooperative cancellation handle.
    pub cancel: Option<CancellationToken>,
}

impl SelectionOptions {
    /// Options with the two mandatory knobs; everything else defaulted.
    pub fn new(target_value: u64, fee_rate: u64) -> Self {
        Self {
            target_value,
            fee_rate,
            max_inputs: None,
            min_confirmations: None,
            dust_threshold: None,
            long_term_fee_rate: None,
            oracle: None,
            consolidate: false,
            rng_seed: None,
            cancel: None,
        }
    }

    /// The long-term fee rate, falling back to the crate default.
    pub fn long_term_rate(&self) -> u64 {
        self.long_term_fee_rate.unwrap_or(DEFAULT_LONG_TERM_FEE_RATE)
    }

    /// Whether the caller cancelled this attempt.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Success variant of a selection attempt.
///
/// Invariant: `total_value = target_value + change + fee` exactly, and
/// `change` is zero or at least the change dust threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Inputs to spend, in selection order.
    pub inputs: Vec<Utxo>,
    /// Sum of input values in sats.
    pub total_value: u64,
    /// Change value in sats; zero when absorbed into fee.
    pub change: u64,
    /// Fee in sats.
    pub fee: u64,
    /// Number of inputs.
    pub input_count: u32,
    /// Number of outputs the fee model assumed (payment plus optional change).
    pub output_count: u32,
    /// Estimated virtual size in vbytes.
    pub estimated_vsize: u64,
    /// `fee / estimated_vsize`; never below the requested rate.
    pub effective_fee_rate: f64,
    /// Murch waste metric of this selection, when computed.
    pub waste: Option<i64>,
}

impl Selection {
    /// Identities of the selected inputs.
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(Utxo::outpoint).collect()
    }
}

/// Fee-rate tiers as reported by the external provider, in sat/vB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    /// Economy tier.
    pub low: u64,
    /// Default tier.
    pub medium: u64,
    /// Next-block tier.
    pub high: u64,
    /// Priority tier.
    pub urgent: u64,
}

/// An unsigned transaction plus the bookkeeping the signer does not need.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    /// Inputs being spent.
    pub inputs: Vec<Utxo>,
    /// Ordered outputs; ordering is a protocol invariant.
    pub outputs: Vec<bitcoin::TxOut>,
    /// Fee in sats.
    pub fee: u64,
    /// Index of the change output, always last when present.
    pub change_index: Option<usize>,
}

impl TransactionDraft {
    /// Assemble the unsigned transaction (version 2, locktime 0).
    pub fn unsigned_tx(&self) -> bitcoin::Transaction {
        bitcoin::Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|utxo| bitcoin::TxIn {
                    previous_output: utxo.outpoint(),
                    ..Default::default()
                })
                .collect(),
            output: self.outputs.clone(),
        }
    }
}
