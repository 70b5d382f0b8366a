//! Counterparty LR-compact issuance (type 22) serialization and obfuscation.
//!
//! A stamp anchors its image with a single OP_RETURN output carrying the
//! RC4-obfuscated `CNTRPRTY`-prefixed issuance message. The RC4 key is the
//! first input's txid bytes in wire order, and the keystream restarts per
//! transaction.

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::{ScriptBuf, Txid};

use crate::constants::{CNTRPRTY_MAGIC, LR_ISSUANCE_TYPE, MAX_DESCRIPTION_LEN, MAX_OP_RETURN_LEN};
use crate::encoder::Rc4;
use crate::error::EncodeError;

/// An asset issuance in the compact form Bitcoin Stamps anchor with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartyIssuance {
    /// Numeric asset id.
    pub asset_id: u64,
    /// Quantity issued.
    pub quantity: u64,
    /// Whether the asset is divisible.
    pub divisible: bool,
    /// Whether further issuance is locked.
    pub lock: bool,
    /// UTF-8 description, at most [`MAX_DESCRIPTION_LEN`] bytes.
    pub description: String,
}

impl CounterpartyIssuance {
    const FIXED_LEN: usize = 1 + 8 + 8 + 1;

    /// Serialize to the LR-compact form: type byte, big-endian asset id and
    /// quantity, flags byte (bit 0 divisible, bit 1 lock), then the raw
    /// description with no length prefix and no trailing NUL.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let description = self.description.as_bytes();
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EncodeError::DescriptionTooLong {
                len: description.len(),
                max: MAX_DESCRIPTION_LEN,
            });
        }

        let mut out = Vec::with_capacity(Self::FIXED_LEN + description.len());
        out.push(LR_ISSUANCE_TYPE);
        out.extend_from_slice(&self.asset_id.to_be_bytes());
        out.extend_from_slice(&self.quantity.to_be_bytes());

        let mut flags = 0u8;
        if self.divisible {
            flags |= 0x01;
        }
        if self.lock {
            flags |= 0x02;
        }
        out.push(flags);
        out.extend_from_slice(description);
        Ok(out)
    }

    /// Parse the LR-compact form back into an issuance.
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodeError> {
        if bytes.len() < Self::FIXED_LEN {
            return Err(EncodeError::TruncatedMessage(bytes.len()));
        }
        if bytes[0] != LR_ISSUANCE_TYPE {
            return Err(EncodeError::UnsupportedMessageType(bytes[0]));
        }

        let asset_id = u64::from_be_bytes(bytes[1..9].try_into().expect("8 bytes"));
        let quantity = u64::from_be_bytes(bytes[9..17].try_into().expect("8 bytes"));
        let flags = bytes[17];
        let description = String::from_utf8_lossy(&bytes[Self::FIXED_LEN..]).into_owned();

        Ok(Self {
            asset_id,
            quantity,
            divisible: flags & 0x01 != 0,
            lock: flags & 0x02 != 0,
            description,
        })
    }
}

/// RC4 key for a transaction: the first input's txid bytes in wire order.
pub fn rc4_key(first_input_txid: &Txid) -> [u8; 32] {
    first_input_txid.to_byte_array()
}

/// Obfuscated `CNTRPRTY` block for the OP_RETURN output.
pub fn obfuscated_payload(
    issuance: &CounterpartyIssuance,
    first_input_txid: &Txid,
) -> Result<Vec<u8>, EncodeError> {
    let mut data = Vec::with_capacity(CNTRPRTY_MAGIC.len() + CounterpartyIssuance::FIXED_LEN);
    data.extend_from_slice(CNTRPRTY_MAGIC);
    data.extend_from_slice(&issuance.encode()?);
    if data.len() > MAX_OP_RETURN_LEN {
        return Err(EncodeError::OpReturnTooLarge {
            len: data.len(),
            max: MAX_OP_RETURN_LEN,
        });
    }
    Rc4::new(&rc4_key(first_input_txid)).apply(&mut data);
    Ok(data)
}

/// The OP_RETURN script anchoring a stamp issuance.
pub fn op_return_script(
    issuance: &CounterpartyIssuance,
    first_input_txid: &Txid,
) -> Result<ScriptBuf, EncodeError> {
    let payload = obfuscated_payload(issuance, first_input_txid)?;
    let push = PushBytesBuf::try_from(payload).expect("payload under push cap");
    Ok(ScriptBuf::new_op_return(push))
}

/// Recover the issuance from an OP_RETURN script: deobfuscate, verify the
/// magic, parse the compact form.
pub fn decode_op_return(
    script: &bitcoin::Script,
    first_input_txid: &Txid,
) -> Result<CounterpartyIssuance, EncodeError> {
    let mut instructions = script.instructions();
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_RETURN => {}
        _ => return Err(EncodeError::BadMagic),
    }
    let data = match instructions.next() {
        Some(Ok(Instruction::PushBytes(push))) => push.as_bytes().to_vec(),
        _ => return Err(EncodeError::TruncatedMessage(0)),
    };

    let plain = Rc4::keystream(&rc4_key(first_input_txid), &data);
    let body = plain
        .strip_prefix(CNTRPRTY_MAGIC.as_slice())
        .ok_or(EncodeError::BadMagic)?;
    CounterpartyIssuance::decode(body)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn txid() -> Txid {
        Txid::from_str("8a6be5b739b8fd883102bdd22a9e4e7a837c64f5e7a3a0d8a7e0dbd0d5e5c9a1").unwrap()
    }

    #[test]
    fn lr_issuance_compact_bytes() {
        let issuance = CounterpartyIssuance {
            asset_id: 95428956661682177,
            quantity: 1000,
            divisible: false,
            lock: true,
            description: "Test".into(),
        };
        let bytes = issuance.encode().unwrap();
        assert_eq!(
            hex::encode(&bytes),
            "1601532b2e2d9cf0c100000000000003e80254657374"
        );
        assert_eq!(CounterpartyIssuance::decode(&bytes).unwrap(), issuance);
    }

    #[test]
    fn flags_byte_packs_divisible_and_lock() {
        let both = CounterpartyIssuance {
            asset_id: 1,
            quantity: 1,
            divisible: true,
            lock: true,
            description: String::new(),
        };
        let bytes = both.encode().unwrap();
        assert_eq!(bytes[17], 0x03);
        assert_eq!(bytes.len(), 18);
    }

    #[test]
    fn description_cap_is_enforced() {
        let issuance = CounterpartyIssuance {
            asset_id: 1,
            quantity: 1,
            divisible: false,
            lock: false,
            description: "x".repeat(MAX_DESCRIPTION_LEN + 1),
        };
        assert!(matches!(
            issuance.encode(),
            Err(EncodeError::DescriptionTooLong { .. })
        ));
    }

    #[test]
    fn op_return_round_trip() {
        let issuance = CounterpartyIssuance {
            asset_id: 95428956661682177,
            quantity: 1000,
            divisible: false,
            lock: true,
            description: "Test".into(),
        };
        let script = op_return_script(&issuance, &txid()).unwrap();
        assert!(script.is_op_return());

        let decoded = decode_op_return(&script, &txid()).unwrap();
        assert_eq!(decoded, issuance);
    }

    #[test]
    fn obfuscation_hides_the_magic() {
        let issuance = CounterpartyIssuance {
            asset_id: 7,
            quantity: 21,
            divisible: true,
            lock: false,
            description: "hidden".into(),
        };
        let payload = obfuscated_payload(&issuance, &txid()).unwrap();
        assert!(!payload.windows(CNTRPRTY_MAGIC.len()).any(|w| w == CNTRPRTY_MAGIC));
    }

    #[test]
    fn wrong_key_fails_the_magic_check() {
        let issuance = CounterpartyIssuance {
            asset_id: 7,
            quantity: 21,
            divisible: false,
            lock: false,
            description: "k".into(),
        };
        let script = op_return_script(&issuance, &txid()).unwrap();
        let other =
            Txid::from_str("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();
        assert!(matches!(
            decode_op_return(&script, &other),
            Err(EncodeError::BadMagic)
        ));
    }
}
