//! Error taxonomies.
//!
//! Selector failures carry the `{reason, message, details}` shape consumed by
//! external tooling; the remaining enums are ordinary library errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Why a selection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// A selector precondition was violated.
    InvalidOptions,
    /// The UTXO set was empty after confirmation and protection filtering.
    NoUtxosAvailable,
    /// The eligible balance cannot cover the target plus a minimal fee.
    InsufficientFunds,
    /// The target is reachable, but only with more inputs than allowed.
    ExceedsMaxInputs,
    /// Every feasible selection would produce unabsorbable dust change.
    DustOutput,
    /// The protection-aware path found no unprotected solution.
    ProtectedUtxos,
    /// Algorithm-specific exhaustion without a solution.
    NoSolutionFound,
    /// Generic selection failure with diagnostics in the details map.
    SelectionFailed,
    /// A strategy exceeded its wall-clock budget or was cancelled.
    Timeout,
    /// The optimizer subsystem surrendered.
    OptimizationFailed,
}

impl core::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FailureReason::InvalidOptions => "InvalidOptions",
            FailureReason::NoUtxosAvailable => "NoUTXOsAvailable",
            FailureReason::InsufficientFunds => "InsufficientFunds",
            FailureReason::ExceedsMaxInputs => "ExceedsMaxInputs",
            FailureReason::DustOutput => "DustOutput",
            FailureReason::ProtectedUtxos => "ProtectedUTXOs",
            FailureReason::NoSolutionFound => "NoSolutionFound",
            FailureReason::SelectionFailed => "SelectionFailed",
            FailureReason::Timeout => "Timeout",
            FailureReason::OptimizationFailed => "OptimizationFailed",
        };
        f.write_str(s)
    }
}

/// Sub-cause of [`FailureReason::NoUtxosAvailable`], reported for operator
/// feedback in `details["cause"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoUtxosCause {
    /// The wallet view held no UTXOs at all.
    Empty,
    /// Everything was flagged by the protection oracle.
    AllProtected,
    /// Everything fell below the dust threshold.
    AllDust,
    /// Nothing met the confirmation requirement.
    LowConfirmations,
}

impl NoUtxosCause {
    fn as_str(self) -> &'static str {
        match self {
            NoUtxosCause::Empty => "Empty",
            NoUtxosCause::AllProtected => "AllProtected",
            NoUtxosCause::AllDust => "AllDust",
            NoUtxosCause::LowConfirmations => "LowConfirmations",
        }
    }
}

/// Failure variant of a selection attempt.
///
/// The shape is serde-stable: `reason` is one of the enumerated kinds,
/// `message` is human-readable, `details` carries structured diagnostics as
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{reason}: {message}")]
pub struct SelectionFailure {
    /// Enumerated failure kind.
    pub reason: FailureReason,
    /// Human-readable description.
    pub message: String,
    /// Structured diagnostics.
    pub details: BTreeMap<String, String>,
}

impl SelectionFailure {
    /// Build a failure with an empty details map.
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach one detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Violated selector precondition.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(FailureReason::InvalidOptions, message)
    }

    /// Empty eligible set, with the filtering sub-cause.
    pub fn no_utxos(cause: NoUtxosCause) -> Self {
        Self::new(
            FailureReason::NoUtxosAvailable,
            "no spendable UTXOs after filtering",
        )
        .with_detail("cause", cause.as_str())
    }

    /// Eligible balance cannot cover target plus minimal fee.
    pub fn insufficient_funds(available: u64, required: u64) -> Self {
        Self::new(
            FailureReason::InsufficientFunds,
            format!("{available} sat available of {required} sat required"),
        )
        .with_detail("available", available)
        .with_detail("required", required)
    }

    /// Target reachable only by exceeding the input cap.
    pub fn exceeds_max_inputs(max_inputs: u32) -> Self {
        Self::new(
            FailureReason::ExceedsMaxInputs,
            format!("target requires more than {max_inputs} inputs"),
        )
        .with_detail("max_inputs", max_inputs)
    }

    /// Algorithm-specific exhaustion.
    pub fn no_solution(algorithm: &str, message: impl Into<String>) -> Self {
        Self::new(FailureReason::NoSolutionFound, message).with_detail("algorithm", algorithm)
    }

    /// Wall-clock budget exceeded or cooperative cancellation observed.
    pub fn timeout(algorithm: &str, cancelled: bool) -> Self {
        Self::new(
            FailureReason::Timeout,
            format!("{algorithm} abandoned before completion"),
        )
        .with_detail("algorithm", algorithm)
        .with_detail("cancelled", cancelled)
    }

    /// The available balance recorded in the details map, if any.
    pub fn available(&self) -> Option<u64> {
        self.details.get("available")?.parse().ok()
    }

    /// The required balance recorded in the details map, if any.
    pub fn required(&self) -> Option<u64> {
        self.details.get("required")?.parse().ok()
    }
}

/// Occurs when encoding a payload fails. Encoding errors are fatal for a build.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Issuance description over the compact-form cap.
    #[error("description is {len} bytes, cap is {max}")]
    DescriptionTooLong {
        /// Actual byte length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// OP_RETURN data over the standardness cap.
    #[error("OP_RETURN payload is {len} bytes, cap is {max}")]
    OpReturnTooLarge {
        /// Actual byte length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// SRC-20 ticker outside 1..=5 characters.
    #[error("invalid ticker {0:?}")]
    InvalidTick(String),
    /// SRC-20 amount field not a positive decimal string.
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),
    /// Decoded blob does not start with `stamp:`.
    #[error("payload does not begin with the stamp prefix")]
    MissingStampPrefix,
    /// Blob is neither JSON, zlib-compressed JSON nor msgpack.
    #[error("payload is not JSON, zlib or msgpack")]
    UndecodablePayload,
    /// Counterparty message shorter than its fixed header.
    #[error("counterparty message truncated at {0} bytes")]
    TruncatedMessage(usize),
    /// Missing `CNTRPRTY` magic after deobfuscation.
    #[error("counterparty magic not found")]
    BadMagic,
    /// Message type other than the LR issuance this crate anchors stamps with.
    #[error("unsupported counterparty message type {0}")]
    UnsupportedMessageType(u8),
    /// JSON (de)serialization failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// zlib stream failure.
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),
    /// An empty payload has no encoding.
    #[error("empty payload")]
    EmptyPayload,
}

/// Occurs when the protection oracle cannot answer.
///
/// Inside selection these are treated as fail-safe-unprotected and logged;
/// they never abort a selection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    /// Oracle endpoint unreachable.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// Oracle answered with garbage.
    #[error("oracle returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Occurs when the external UTXO/fee provider fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure.
    #[error("transport: {0}")]
    Transport(String),
    /// Remote endpoint returned an error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// Server error code.
        code: i64,
        /// Server error message.
        message: String,
    },
    /// Response did not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Occurs when a build fails end to end.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Selector failure, surfaced unchanged.
    #[error("selection failed: {0}")]
    Selection(#[from] SelectionFailure),
    /// The wallet cannot fund the request.
    #[error("insufficient funds: {available} sat available of {required} sat required")]
    InsufficientFunds {
        /// Balance the wallet exposes.
        available: u64,
        /// Balance the request needs.
        required: u64,
    },
    /// Payload encoding failure, fatal for the build.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Provider failure, surfaced unchanged.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// PSBT construction failure.
    #[error("psbt: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),
    /// The caller's cancellation token fired at a suspension point.
    #[error("build cancelled while {stage}")]
    Cancelled {
        /// Builder stage that observed the cancellation.
        stage: &'static str,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failure_shape_is_serde_stable() {
        let failure = SelectionFailure::insufficient_funds(1000, 2500);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["reason"], "InsufficientFunds");
        assert_eq!(json["details"]["available"], "1000");
        assert_eq!(json["details"]["required"], "2500");

        let back: SelectionFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
        assert_eq!(back.available(), Some(1000));
        assert_eq!(back.required(), Some(2500));
    }

    #[test]
    fn no_utxos_carries_cause() {
        let failure = SelectionFailure::no_utxos(NoUtxosCause::AllProtected);
        assert_eq!(failure.reason, FailureReason::NoUtxosAvailable);
        assert_eq!(failure.details.get("cause").map(String::as_str), Some("AllProtected"));
    }
}
