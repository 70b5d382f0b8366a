//! The external UTXO/fee/broadcast provider seam.
//!
//! Implementations may pool several ElectrumX-style endpoints and
//! health-check them; the core treats the pool as one provider. The core
//! never calls [`broadcast`](UtxoProvider::broadcast) itself; signing and
//! broadcasting belong to the caller.

use bitcoin::Txid;

use crate::error::ProviderError;
use crate::types::{FeeRates, Utxo};

/// Wallet-view and network access used by the builder.
pub trait UtxoProvider {
    /// Spendable UTXOs of `address`.
    fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Current fee-rate tiers in sat/vB.
    fn get_fee_rates(&self) -> Result<FeeRates, ProviderError>;

    /// Submit a signed transaction; returns its txid.
    fn broadcast(&self, tx_hex: &str) -> Result<Txid, ProviderError>;

    /// Current chain tip height.
    fn get_block_height(&self) -> Result<u32, ProviderError>;
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::str::FromStr;

    use super::*;

    /// A provider serving a fixed wallet view.
    #[derive(Debug, Clone, Default)]
    pub struct StaticProvider {
        pub utxos: Vec<Utxo>,
        pub fee_rates: Option<FeeRates>,
    }

    impl UtxoProvider for StaticProvider {
        fn get_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
            Ok(self.utxos.clone())
        }

        fn get_fee_rates(&self) -> Result<FeeRates, ProviderError> {
            self.fee_rates.ok_or_else(|| {
                ProviderError::InvalidResponse("fee rates not configured".into())
            })
        }

        fn broadcast(&self, _tx_hex: &str) -> Result<Txid, ProviderError> {
            Txid::from_str("0000000000000000000000000000000000000000000000000000000000000000")
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        }

        fn get_block_height(&self) -> Result<u32, ProviderError> {
            Ok(840_000)
        }
    }
}
