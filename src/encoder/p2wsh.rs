//! Raw byte stream to and from P2WSH data-commitment outputs.
//!
//! Each 32-byte chunk of the payload becomes the witness program of one
//! output (`OP_0 PUSH_32 <chunk>`); the last chunk is zero-padded. Decoders
//! concatenate chunks in output order and strip the trailing zero bytes.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, ScriptBuf, TxOut, WScriptHash};

use crate::constants::P2WSH_CHUNK_LEN;

/// Split `data` into zero-padded 32-byte chunks.
pub fn chunk_payload(data: &[u8]) -> Vec<[u8; P2WSH_CHUNK_LEN]> {
    data.chunks(P2WSH_CHUNK_LEN)
        .map(|chunk| {
            let mut padded = [0u8; P2WSH_CHUNK_LEN];
            padded[..chunk.len()].copy_from_slice(chunk);
            padded
        })
        .collect()
}

/// The witness-program script committing to one chunk.
pub fn witness_script(chunk: &[u8; P2WSH_CHUNK_LEN]) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(*chunk))
}

/// Turn a payload into the ordered P2WSH output run, each valued at
/// `value_per_output` sats (the P2WSH dust threshold in practice).
pub fn chunk_outputs(data: &[u8], value_per_output: u64) -> Vec<TxOut> {
    chunk_payload(data)
        .iter()
        .map(|chunk| TxOut {
            value: Amount::from_sat(value_per_output),
            script_pubkey: witness_script(chunk),
        })
        .collect()
}

/// Pull the 32-byte witness programs out of a transaction's P2WSH outputs,
/// in output order. Non-P2WSH outputs are skipped.
pub fn extract_chunks(outputs: &[TxOut]) -> Vec<[u8; P2WSH_CHUNK_LEN]> {
    outputs
        .iter()
        .filter(|txout| txout.script_pubkey.is_p2wsh())
        .map(|txout| {
            let bytes = txout.script_pubkey.as_bytes();
            let mut chunk = [0u8; P2WSH_CHUNK_LEN];
            chunk.copy_from_slice(&bytes[2..2 + P2WSH_CHUNK_LEN]);
            chunk
        })
        .collect()
}

/// Concatenate chunks and strip the zero padding.
pub fn reassemble(chunks: &[[u8; P2WSH_CHUNK_LEN]]) -> Vec<u8> {
    let mut data: Vec<u8> = chunks.iter().flatten().copied().collect();
    while data.last() == Some(&0) {
        data.pop();
    }
    data
}
