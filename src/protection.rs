//! Protection oracle seam: keeps ordinals, inscriptions and other flagged
//! UTXOs out of selection.
//!
//! Oracle failures are fail-safe-unprotected inside the hot path: the UTXO
//! stays spendable and the failure is logged, never aborting a selection.
//! Async oracle implementations are expected to warm the TTL cache before
//! selection runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bitcoin::OutPoint;

use crate::error::{FailureReason, OracleError, SelectionFailure};
use crate::selector::UtxoSelector;
use crate::types::{Selection, SelectionOptions, Utxo};

/// Answers whether a UTXO carries an asset that must not be spent as fuel.
pub trait ProtectionOracle: std::fmt::Debug + Send + Sync {
    /// Whether `utxo` is protected.
    fn is_protected(&self, utxo: &Utxo) -> Result<bool, OracleError>;

    /// Asset metadata for `utxo`, when the oracle knows any.
    fn asset_data(&self, utxo: &Utxo) -> Result<Option<AssetData>, OracleError> {
        let _ = utxo;
        Ok(None)
    }
}

/// What an oracle knows about a protected UTXO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    /// Protocol the asset belongs to (ordinals, stamps, counterparty, ...).
    pub protocol: String,
    /// Protocol-specific identifier.
    pub asset_id: String,
}

/// A TTL cache over a slow oracle, safe under concurrent read/insert.
#[derive(Debug)]
pub struct CachedOracle<O> {
    inner: O,
    ttl: Duration,
    cache: Mutex<HashMap<OutPoint, (bool, Instant)>>,
}

impl<O: ProtectionOracle> CachedOracle<O> {
    /// Default cache lifetime.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Wrap `inner` with the default 5-minute TTL.
    pub fn new(inner: O) -> Self {
        Self::with_ttl(inner, Self::DEFAULT_TTL)
    }

    /// Wrap `inner` with an explicit TTL.
    pub fn with_ttl(inner: O, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-resolve a batch of UTXOs so the selection hot path never waits on
    /// the oracle.
    pub fn warm(&self, utxos: &[Utxo]) {
        for utxo in utxos {
            let _ = self.is_protected(utxo);
        }
    }

    /// Drop every cached verdict.
    pub fn invalidate(&self) {
        self.cache.lock().expect("cache lock").clear();
    }
}

impl<O: ProtectionOracle> ProtectionOracle for CachedOracle<O> {
    fn is_protected(&self, utxo: &Utxo) -> Result<bool, OracleError> {
        let outpoint = utxo.outpoint();
        {
            let cache = self.cache.lock().expect("cache lock");
            if let Some((verdict, cached_at)) = cache.get(&outpoint) {
                if cached_at.elapsed() < self.ttl {
                    return Ok(*verdict);
                }
            }
        }

        let verdict = self.inner.is_protected(utxo)?;
        self.cache
            .lock()
            .expect("cache lock")
            .insert(outpoint, (verdict, Instant::now()));
        Ok(verdict)
    }

    fn asset_data(&self, utxo: &Utxo) -> Result<Option<AssetData>, OracleError> {
        self.inner.asset_data(utxo)
    }
}

/// A selector wrapper that reports protection-specific failures.
///
/// The inner selector already filters protected UTXOs through the oracle in
/// the options; this wrapper additionally distinguishes "the wallet could
/// have funded this, but its unprotected part cannot" from a plain
/// insufficiency.
#[derive(Debug)]
pub struct ProtectedSelector<S> {
    inner: S,
}

impl<S: UtxoSelector> ProtectedSelector<S> {
    /// Wrap a selector.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: UtxoSelector> UtxoSelector for ProtectedSelector<S> {
    fn name(&self) -> &'static str {
        "protected"
    }

    fn select(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
    ) -> Result<Selection, SelectionFailure> {
        let result = self.inner.select(utxos, options);
        let Err(failure) = &result else {
            return result;
        };
        if failure.reason != FailureReason::InsufficientFunds || options.oracle.is_none() {
            return result;
        }

        // Would the unfiltered wallet have funded it? If so, protection is
        // what starved the selection.
        let mut unprotected_options = options.clone();
        unprotected_options.oracle = None;
        if self.inner.select(utxos, &unprotected_options).is_ok() {
            let mut protected_failure = SelectionFailure::new(
                FailureReason::ProtectedUtxos,
                "only protected UTXOs could fund this target",
            );
            for (key, value) in &failure.details {
                protected_failure = protected_failure.with_detail(key.clone(), value);
            }
            return Err(protected_failure);
        }
        result
    }
}
