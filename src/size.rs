//! Virtual-size and weight arithmetic from input/output type mixes.
//!
//! Sizes are computed from descriptors rather than from assembled
//! transactions, so fee estimation never needs signatures. Base bytes count
//! four weight units each, witness bytes one; the segwit marker and flag add
//! two weight units iff any input contributes a witness (BIP-141).

use bitcoin::Script;

/// Witness-script length assumed when classifying a spendable P2WSH output
/// without knowing its script (single-key script, 34 bytes).
pub const DEFAULT_WITNESS_SCRIPT_LEN: usize = 34;

/// Spend-side descriptor of a transaction input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Legacy pay-to-pubkey-hash.
    P2pkh,
    /// Legacy pay-to-script-hash.
    P2sh,
    /// Native segwit single-sig.
    P2wpkh,
    /// Native segwit script-hash; the witness carries the script itself.
    P2wsh {
        /// Length of the revealed witness script in bytes.
        witness_script_len: usize,
    },
    /// Taproot key-path spend.
    P2tr,
}

impl InputKind {
    /// Non-witness bytes this input contributes (outpoint, script_sig, sequence).
    pub fn base_bytes(&self) -> u64 {
        match self {
            InputKind::P2pkh => 148,
            InputKind::P2sh => 91,
            InputKind::P2wpkh => 41,
            InputKind::P2wsh { .. } => 41,
            InputKind::P2tr => 57,
        }
    }

    /// Witness bytes this input contributes.
    pub fn witness_bytes(&self) -> u64 {
        match self {
            InputKind::P2pkh | InputKind::P2sh => 0,
            InputKind::P2wpkh => 27,
            InputKind::P2wsh { witness_script_len } => 1 + *witness_script_len as u64 + 64,
            InputKind::P2tr => 16,
        }
    }

    /// Whether spending this input requires a witness.
    pub fn has_witness(&self) -> bool {
        self.witness_bytes() > 0
    }

    /// Virtual bytes this input contributes, witness discount applied.
    pub fn vbytes(&self) -> u64 {
        self.base_bytes() + self.witness_bytes().div_ceil(4)
    }

    /// Classify the input that would spend `script_pubkey`.
    ///
    /// Nonstandard scripts fall back to the legacy (largest) input size so
    /// fee estimates stay conservative.
    pub fn from_script_pubkey(script_pubkey: &Script) -> Self {
        if script_pubkey.is_p2wpkh() {
            InputKind::P2wpkh
        } else if script_pubkey.is_p2wsh() {
            InputKind::P2wsh {
                witness_script_len: DEFAULT_WITNESS_SCRIPT_LEN,
            }
        } else if script_pubkey.is_p2tr() {
            InputKind::P2tr
        } else if script_pubkey.is_p2sh() {
            InputKind::P2sh
        } else {
            InputKind::P2pkh
        }
    }
}

/// Descriptor of a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Legacy pay-to-pubkey-hash.
    P2pkh,
    /// Legacy pay-to-script-hash.
    P2sh,
    /// Native segwit single-sig.
    P2wpkh,
    /// Native segwit script-hash (the stamp data-commitment shape).
    P2wsh,
    /// Taproot.
    P2tr,
    /// Unspendable data carrier.
    OpReturn {
        /// Pushed data bytes, excluding opcodes.
        data_len: usize,
    },
}

impl OutputKind {
    /// On-chain bytes of this output (value, script length prefix, script).
    pub fn bytes(&self) -> u64 {
        match self {
            OutputKind::P2pkh => 34,
            OutputKind::P2sh => 32,
            OutputKind::P2wpkh => 31,
            OutputKind::P2wsh => 43,
            OutputKind::P2tr => 43,
            OutputKind::OpReturn { data_len } => {
                8 + 1 + op_return_script_len(*data_len) as u64
            }
        }
    }

    /// The input kind that would spend this output, or `None` for OP_RETURN.
    pub fn spending_input(&self) -> Option<InputKind> {
        match self {
            OutputKind::P2pkh => Some(InputKind::P2pkh),
            OutputKind::P2sh => Some(InputKind::P2sh),
            OutputKind::P2wpkh => Some(InputKind::P2wpkh),
            OutputKind::P2wsh => Some(InputKind::P2wsh {
                witness_script_len: DEFAULT_WITNESS_SCRIPT_LEN,
            }),
            OutputKind::P2tr => Some(InputKind::P2tr),
            OutputKind::OpReturn { .. } => None,
        }
    }
}

/// Script length of an OP_RETURN carrying `data_len` pushed bytes.
pub fn op_return_script_len(data_len: usize) -> usize {
    let push_overhead = if data_len <= 75 {
        1
    } else if data_len <= 255 {
        2
    } else {
        3
    };
    1 + push_overhead + data_len
}

/// Compact-size encoding length of `n`.
pub fn varint_len(n: usize) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Total transaction weight for the given input/output mix.
pub fn tx_weight(inputs: &[InputKind], outputs: &[OutputKind]) -> u64 {
    let base: u64 = 8 // version + locktime
        + varint_len(inputs.len())
        + varint_len(outputs.len())
        + inputs.iter().map(InputKind::base_bytes).sum::<u64>()
        + outputs.iter().map(OutputKind::bytes).sum::<u64>();
    let witness: u64 = inputs.iter().map(InputKind::witness_bytes).sum();

    let mut weight = base * 4;
    if witness > 0 {
        // segwit marker + flag
        weight += witness + 2;
    }
    weight
}

/// Virtual size: ceil(weight / 4).
pub fn tx_vsize(inputs: &[InputKind], outputs: &[OutputKind]) -> u64 {
    tx_weight(inputs, outputs).div_ceil(4)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legacy_tx_has_no_witness_discount() {
        let vsize = tx_vsize(&[InputKind::P2pkh], &[OutputKind::P2pkh]);
        // 8 + 1 + 1 + 148 + 34 bytes, weight = bytes * 4
        assert_eq!(vsize, 192);
    }

    #[test]
    fn segwit_tx_counts_marker_and_flag_once() {
        let vsize = tx_vsize(
            &[InputKind::P2wpkh],
            &[OutputKind::P2wpkh, OutputKind::P2wpkh],
        );
        // base = 8 + 1 + 1 + 41 + 62 = 113, witness = 27 + 2
        assert_eq!(vsize, (113 * 4 + 29 + 3) / 4);
    }

    #[test]
    fn p2wsh_witness_scales_with_script_len() {
        let small = InputKind::P2wsh {
            witness_script_len: 34,
        };
        let large = InputKind::P2wsh {
            witness_script_len: 105,
        };
        assert_eq!(small.witness_bytes(), 99);
        assert_eq!(large.witness_bytes(), 170);
        assert!(large.vbytes() > small.vbytes());
    }

    #[test]
    fn op_return_output_counts_push_overhead() {
        assert_eq!(OutputKind::OpReturn { data_len: 26 }.bytes(), 8 + 1 + 1 + 1 + 26);
        assert_eq!(OutputKind::OpReturn { data_len: 78 }.bytes(), 8 + 1 + 1 + 2 + 78);
    }

    #[test]
    fn classify_from_script_pubkey() {
        use bitcoin::hashes::Hash;
        let wpkh = bitcoin::ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::from_byte_array([7; 20]));
        assert_eq!(InputKind::from_script_pubkey(&wpkh), InputKind::P2wpkh);

        let wsh = bitcoin::ScriptBuf::new_p2wsh(&bitcoin::WScriptHash::from_byte_array([7; 32]));
        assert!(matches!(
            InputKind::from_script_pubkey(&wsh),
            InputKind::P2wsh { .. }
        ));
    }
}
