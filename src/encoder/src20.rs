//! SRC-20 payload shaping: canonical JSON, optional zlib/msgpack legs,
//! `stamp:` framing and P2WSH chunking.
//!
//! An SRC-20 transaction carries its payload solely across P2WSH outputs and
//! has no OP_RETURN; that absence is how decoders tell SRC-20 apart from
//! stamps.

use std::io::{Read, Write};

use bitcoin::TxOut;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{P2WSH_CHUNK_LEN, SRC20_COMPRESSION_THRESHOLD, STAMP_PREFIX};
use crate::encoder::p2wsh;
use crate::error::EncodeError;

/// Decimal places assumed when a DEPLOY omits `dec`.
const DEFAULT_DECIMALS: u8 = 18;

/// An SRC-20 token operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Src20Payload {
    /// Deploy a new token.
    Deploy {
        /// Ticker, 1 to 5 characters.
        tick: String,
        /// Maximum supply, decimal string.
        max: String,
        /// Per-mint limit, decimal string.
        lim: String,
        /// Decimal places.
        dec: u8,
    },
    /// Mint against a deployed token.
    Mint {
        /// Ticker.
        tick: String,
        /// Amount, decimal string.
        amt: String,
    },
    /// Transfer a balance.
    Transfer {
        /// Ticker.
        tick: String,
        /// Amount, decimal string.
        amt: String,
    },
}

// Canonical field order for the wire JSON; serde_json preserves struct order.
#[derive(Serialize, Deserialize)]
struct DeployJson {
    p: String,
    op: String,
    tick: String,
    max: String,
    lim: String,
    dec: u8,
}

#[derive(Serialize, Deserialize)]
struct TokenAmountJson {
    p: String,
    op: String,
    tick: String,
    amt: String,
}

impl Src20Payload {
    /// Operation name as it appears on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Src20Payload::Deploy { .. } => "DEPLOY",
            Src20Payload::Mint { .. } => "MINT",
            Src20Payload::Transfer { .. } => "TRANSFER",
        }
    }

    /// Ticker this operation touches.
    pub fn tick(&self) -> &str {
        match self {
            Src20Payload::Deploy { tick, .. }
            | Src20Payload::Mint { tick, .. }
            | Src20Payload::Transfer { tick, .. } => tick,
        }
    }

    fn validate(&self) -> Result<(), EncodeError> {
        let tick = self.tick();
        let char_count = tick.chars().count();
        if char_count == 0 || char_count > 5 || tick.chars().any(char::is_whitespace) {
            return Err(EncodeError::InvalidTick(tick.to_owned()));
        }
        match self {
            Src20Payload::Deploy { max, lim, .. } => {
                validate_amount(max)?;
                validate_amount(lim)?;
            }
            Src20Payload::Mint { amt, .. } | Src20Payload::Transfer { amt, .. } => {
                validate_amount(amt)?;
            }
        }
        Ok(())
    }

    /// Canonical UTF-8 JSON, field order `p, op, tick, ...`.
    pub fn canonical_json(&self) -> Result<String, EncodeError> {
        self.validate()?;
        let json = match self.clone() {
            Src20Payload::Deploy { tick, max, lim, dec } => serde_json::to_string(&DeployJson {
                p: "SRC-20".into(),
                op: "DEPLOY".into(),
                tick,
                max,
                lim,
                dec,
            })?,
            Src20Payload::Mint { tick, amt } => serde_json::to_string(&TokenAmountJson {
                p: "SRC-20".into(),
                op: "MINT".into(),
                tick,
                amt,
            })?,
            Src20Payload::Transfer { tick, amt } => serde_json::to_string(&TokenAmountJson {
                p: "SRC-20".into(),
                op: "TRANSFER".into(),
                tick,
                amt,
            })?,
        };
        Ok(json)
    }

    /// Interpret a decoded JSON document as an SRC-20 operation.
    pub fn from_value(value: &Value) -> Result<Self, EncodeError> {
        let object = value.as_object().ok_or(EncodeError::UndecodablePayload)?;
        let protocol = string_field(object, "p").ok_or(EncodeError::UndecodablePayload)?;
        if !protocol.eq_ignore_ascii_case("SRC-20") {
            return Err(EncodeError::UndecodablePayload);
        }
        let op = string_field(object, "op").ok_or(EncodeError::UndecodablePayload)?;
        let tick = string_field(object, "tick").ok_or(EncodeError::UndecodablePayload)?;

        let payload = match op.to_ascii_uppercase().as_str() {
            "DEPLOY" => Src20Payload::Deploy {
                tick,
                max: string_field(object, "max").ok_or(EncodeError::UndecodablePayload)?,
                lim: string_field(object, "lim").ok_or(EncodeError::UndecodablePayload)?,
                dec: object
                    .get("dec")
                    .and_then(decimals_field)
                    .unwrap_or(DEFAULT_DECIMALS),
            },
            "MINT" => Src20Payload::Mint {
                tick,
                amt: string_field(object, "amt").ok_or(EncodeError::UndecodablePayload)?,
            },
            "TRANSFER" => Src20Payload::Transfer {
                tick,
                amt: string_field(object, "amt").ok_or(EncodeError::UndecodablePayload)?,
            },
            _ => return Err(EncodeError::UndecodablePayload),
        };
        payload.validate()?;
        Ok(payload)
    }
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimals_field(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn validate_amount(amount: &str) -> Result<(), EncodeError> {
    let well_formed = !amount.is_empty()
        && amount.chars().all(|c| c.is_ascii_digit() || c == '.')
        && amount.chars().filter(|&c| c == '.').count() <= 1
        && amount.chars().any(|c| c.is_ascii_digit());
    let positive = amount.parse::<f64>().is_ok_and(|v| v > 0.0);
    if well_formed && positive {
        Ok(())
    } else {
        Err(EncodeError::InvalidAmount(amount.to_owned()))
    }
}

/// Knobs for the encoding pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Src20EncodeOptions {
    /// Compress even below the size threshold.
    pub force_compression: bool,
    /// Msgpack-encode the document before the optional zlib pass.
    pub use_msgpack: bool,
}

/// Result of shaping a payload for the wire.
#[derive(Debug, Clone)]
pub struct Src20Encoding {
    /// 32-byte chunks, in output order.
    pub chunks: Vec<[u8; P2WSH_CHUNK_LEN]>,
    /// The canonical JSON the chunks commit to.
    pub canonical_json: String,
    /// Whether the zlib leg was taken.
    pub compressed: bool,
    /// Whether the msgpack leg was taken.
    pub msgpack: bool,
    /// Framed byte length before chunk padding.
    pub framed_len: usize,
}

/// Shape a payload: canonicalize, optionally msgpack, compress when it pays,
/// frame with `stamp:` and chunk for P2WSH.
///
/// The compressed leg is only kept when it is strictly smaller than the
/// uncompressed framing.
pub fn encode(payload: &Src20Payload, options: Src20EncodeOptions) -> Result<Src20Encoding, EncodeError> {
    let canonical_json = payload.canonical_json()?;

    let body = if options.use_msgpack {
        let value: Value = serde_json::from_str(&canonical_json)?;
        rmp_serde::to_vec_named(&value).map_err(|_| EncodeError::UndecodablePayload)?
    } else {
        canonical_json.clone().into_bytes()
    };

    let mut compressed = false;
    let mut framed_body = body.clone();
    if options.force_compression || body.len() >= SRC20_COMPRESSION_THRESHOLD {
        let deflated = zlib_compress(&body)?;
        if deflated.len() < body.len() {
            framed_body = deflated;
            compressed = true;
        }
    }

    let mut framed = Vec::with_capacity(STAMP_PREFIX.len() + framed_body.len());
    framed.extend_from_slice(STAMP_PREFIX);
    framed.extend_from_slice(&framed_body);

    Ok(Src20Encoding {
        chunks: p2wsh::chunk_payload(&framed),
        canonical_json,
        compressed,
        msgpack: options.use_msgpack,
        framed_len: framed.len(),
    })
}

/// Whether an output list qualifies as SRC-20: at least one P2WSH output and
/// no OP_RETURN.
pub fn matches_transaction(outputs: &[TxOut]) -> bool {
    outputs.iter().any(|o| o.script_pubkey.is_p2wsh())
        && !outputs.iter().any(|o| o.script_pubkey.is_op_return())
}

/// Recover a payload from reassembled chunk data: strip the `stamp:` prefix,
/// then try direct JSON, zlib and msgpack in that order.
pub fn decode(framed: &[u8]) -> Result<Src20Payload, EncodeError> {
    let body = framed
        .strip_prefix(STAMP_PREFIX.as_slice())
        .ok_or(EncodeError::MissingStampPrefix)?;
    if body.is_empty() {
        return Err(EncodeError::EmptyPayload);
    }

    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return Src20Payload::from_value(&value);
    }
    if let Ok(inflated) = zlib_decompress(body) {
        if let Ok(value) = serde_json::from_slice::<Value>(&inflated) {
            return Src20Payload::from_value(&value);
        }
        if let Ok(value) = rmp_serde::from_slice::<Value>(&inflated) {
            return Src20Payload::from_value(&value);
        }
    }
    if let Ok(value) = rmp_serde::from_slice::<Value>(body) {
        return Src20Payload::from_value(&value);
    }
    Err(EncodeError::UndecodablePayload)
}

/// Recover a payload straight from a transaction's outputs.
pub fn decode_outputs(outputs: &[TxOut]) -> Result<Src20Payload, EncodeError> {
    if !matches_transaction(outputs) {
        return Err(EncodeError::MissingStampPrefix);
    }
    let framed = p2wsh::reassemble(&p2wsh::extract_chunks(outputs));
    decode(&framed)
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn deploy() -> Src20Payload {
        Src20Payload::Deploy {
            tick: "TEST".into(),
            max: "1000000".into(),
            lim: "1000".into(),
            dec: 0,
        }
    }

    #[test]
    fn canonical_json_field_order() {
        let json = deploy().canonical_json().unwrap();
        assert_eq!(
            json,
            r#"{"p":"SRC-20","op":"DEPLOY","tick":"TEST","max":"1000000","lim":"1000","dec":0}"#
        );
    }

    #[test]
    fn plain_round_trip() {
        let encoding = encode(&deploy(), Src20EncodeOptions::default()).unwrap();
        assert!(!encoding.compressed);
        assert!(encoding.chunks.len() >= 2);

        let framed = p2wsh::reassemble(&encoding.chunks);
        assert!(framed.starts_with(STAMP_PREFIX));
        assert_eq!(decode(&framed).unwrap(), deploy());
    }

    #[test]
    fn compressed_leg_round_trips_and_is_smaller() {
        // Repetitive payload well over the threshold compresses.
        let payload = Src20Payload::Transfer {
            tick: "AAAAA".into(),
            amt: "1".repeat(90),
        };
        let squeezed = encode(&payload, Src20EncodeOptions::default()).unwrap();
        // Over the size threshold, so the zlib leg engages without forcing.
        assert!(squeezed.compressed);
        let uncompressed_len = STAMP_PREFIX.len() + squeezed.canonical_json.len();
        assert!(squeezed.framed_len < uncompressed_len);

        let framed = p2wsh::reassemble(&squeezed.chunks);
        assert_eq!(decode(&framed).unwrap(), payload);
    }

    #[test]
    fn compression_is_kept_only_when_strictly_smaller() {
        let payload = Src20Payload::Mint {
            tick: "KVN".into(),
            amt: "42".into(),
        };
        let plain = encode(&payload, Src20EncodeOptions::default()).unwrap();
        let forced = encode(
            &payload,
            Src20EncodeOptions {
                force_compression: true,
                use_msgpack: false,
            },
        )
        .unwrap();
        if forced.compressed {
            assert!(forced.framed_len < plain.framed_len);
        } else {
            assert_eq!(forced.framed_len, plain.framed_len);
        }
        assert_eq!(decode(&p2wsh::reassemble(&forced.chunks)).unwrap(), payload);
    }

    #[test]
    fn msgpack_round_trip() {
        let payload = Src20Payload::Mint {
            tick: "KEVIN".into(),
            amt: "420".into(),
        };
        let encoding = encode(
            &payload,
            Src20EncodeOptions {
                force_compression: false,
                use_msgpack: true,
            },
        )
        .unwrap();
        assert!(encoding.msgpack);
        assert_eq!(decode(&p2wsh::reassemble(&encoding.chunks)).unwrap(), payload);
    }

    #[test]
    fn outputs_without_op_return_qualify() {
        let encoding = encode(&deploy(), Src20EncodeOptions::default()).unwrap();
        let outputs: Vec<TxOut> = encoding
            .chunks
            .iter()
            .map(|chunk| TxOut {
                value: bitcoin::Amount::from_sat(330),
                script_pubkey: p2wsh::witness_script(chunk),
            })
            .collect();
        assert!(matches_transaction(&outputs));
        assert_eq!(decode_outputs(&outputs).unwrap(), deploy());
    }

    #[test]
    fn op_return_disqualifies_src20() {
        let mut outputs = vec![TxOut {
            value: bitcoin::Amount::from_sat(330),
            script_pubkey: p2wsh::witness_script(&[0xaa; 32]),
        }];
        outputs.push(TxOut {
            value: bitcoin::Amount::from_sat(0),
            script_pubkey: bitcoin::ScriptBuf::new_op_return(
                bitcoin::script::PushBytesBuf::try_from(vec![1u8, 2, 3]).unwrap(),
            ),
        });
        assert!(!matches_transaction(&outputs));
    }

    #[test]
    fn validation_rejects_bad_fields() {
        let long_tick = Src20Payload::Mint {
            tick: "TOOLONG".into(),
            amt: "1".into(),
        };
        assert!(matches!(
            long_tick.canonical_json(),
            Err(EncodeError::InvalidTick(_))
        ));

        let zero_amt = Src20Payload::Transfer {
            tick: "OK".into(),
            amt: "0".into(),
        };
        assert!(matches!(
            zero_amt.canonical_json(),
            Err(EncodeError::InvalidAmount(_))
        ));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        assert!(matches!(
            decode(b"not-a-stamp"),
            Err(EncodeError::MissingStampPrefix)
        ));
    }
}
