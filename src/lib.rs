//! `stamp_tx`
//!
//! Bitcoin Stamps and SRC-20 transaction building: UTXO selection, payload
//! encoding, witness-aware fee arithmetic and PSBT emission. Signing,
//! broadcasting and index resolution stay with the caller, behind the
//! [`provider::UtxoProvider`] and [`protection::ProtectionOracle`] seams.

#![warn(missing_docs)]

pub mod builder;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod fee;
pub mod optimizer;
pub mod protection;
pub mod provider;
pub mod selector;
pub mod size;
pub mod types;

pub use builder::{
    BuildStage, BuiltTransaction, Src20Request, StageRecord, StampIssuanceRequest, TxBuilder,
};
pub use encoder::counterparty::CounterpartyIssuance;
pub use encoder::src20::{Src20EncodeOptions, Src20Payload};
pub use error::{
    BuildError, EncodeError, FailureReason, OracleError, ProviderError, SelectionFailure,
};
pub use protection::{AssetData, CachedOracle, ProtectedSelector, ProtectionOracle};
pub use provider::UtxoProvider;
pub use selector::{selector_for, SelectorKind, UtxoSelector};
pub use types::{
    CancellationToken, FeeRates, Selection, SelectionOptions, TransactionDraft, Utxo,
};
