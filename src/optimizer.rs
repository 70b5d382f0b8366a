//! Stamp payload optimization: pattern analysis, chunk deduplication
//! reporting, an RLE codec and chunking-strategy scoring.
//!
//! Results are cached process-wide, keyed by content hash, and the caches are
//! read-mostly maps behind a coarse lock. The optimizer never fails a build:
//! anything that goes wrong degrades to pass-through.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::constants::P2WSH_CHUNK_LEN;

/// Longest run one RLE control byte can carry.
const RLE_MAX_RUN: usize = 130;
/// Longest literal stretch one RLE control byte can carry.
const RLE_MAX_LITERAL: usize = 128;

/// Shape statistics of a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternAnalysis {
    /// Payload length in bytes.
    pub len: usize,
    /// Number of distinct byte values.
    pub distinct_bytes: usize,
    /// Bytes covered by runs of four or more equal bytes.
    pub run_bytes: usize,
    /// Most frequent byte value.
    pub dominant_byte: u8,
    /// Share of the payload the dominant byte covers.
    pub dominant_share: f64,
    /// 32-byte chunks that repeat an earlier chunk.
    pub repeated_chunks: usize,
}

/// Chunk-level deduplication report. Chunks must stay in output order on the
/// wire, so this is advisory: it measures redundancy, it does not rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupReport {
    /// Total 32-byte chunks.
    pub total_chunks: usize,
    /// Distinct chunks.
    pub unique_chunks: usize,
    /// Bytes a content-addressed store would save.
    pub savings_bytes: usize,
}

/// How a payload is shaped before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkStrategy {
    /// Bytes as given.
    Raw,
    /// zlib-deflated bytes.
    Zlib,
    /// Run-length encoded bytes. Scored, never emitted on the wire.
    Rle,
}

/// Advisory verification of an optimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Whether the optimized form round-trips to the original.
    pub is_valid: bool,
    /// Anything worth telling the operator.
    pub warnings: Vec<String>,
}

/// Outcome of optimizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedPayload {
    /// Strategy the payload should ship with.
    pub strategy: ChunkStrategy,
    /// Bytes to put on the wire.
    pub data: Vec<u8>,
    /// Original length in bytes.
    pub original_len: usize,
    /// P2WSH chunks the original would need.
    pub original_chunks: usize,
    /// P2WSH chunks the optimized form needs.
    pub optimized_chunks: usize,
    /// Round-trip verification verdict.
    pub verification: Verification,
    /// Per-strategy chunk counts considered during scoring.
    pub scores: Vec<(ChunkStrategy, usize)>,
}

/// Process-scoped optimizer with content-hash caches.
#[derive(Debug, Default)]
pub struct Optimizer {
    analysis_cache: Mutex<HashMap<[u8; 32], PatternAnalysis>>,
    optimize_cache: Mutex<HashMap<[u8; 32], OptimizedPayload>>,
}

fn content_hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn chunk_count(len: usize) -> usize {
    len.div_ceil(P2WSH_CHUNK_LEN)
}

/// Run-length encode `data` (PackBits-style control bytes).
pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut index = 0;
    while index < data.len() {
        // Measure the run starting here.
        let mut run = 1;
        while index + run < data.len() && data[index + run] == data[index] && run < RLE_MAX_RUN {
            run += 1;
        }
        if run >= 3 {
            out.push((run - 3 + 128) as u8);
            out.push(data[index]);
            index += run;
            continue;
        }

        // Collect literals until the next run of three or the cap.
        let start = index;
        index += 1;
        while index < data.len() && index - start < RLE_MAX_LITERAL {
            let run_ahead = index + 2 < data.len()
                && data[index] == data[index + 1]
                && data[index] == data[index + 2];
            if run_ahead {
                break;
            }
            index += 1;
        }
        let literals = &data[start..index];
        out.push((literals.len() - 1) as u8);
        out.extend_from_slice(literals);
    }
    out
}

/// Invert [`rle_encode`].
pub fn rle_decode(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut index = 0;
    while index < data.len() {
        let control = data[index];
        index += 1;
        if control >= 128 {
            let byte = *data.get(index)?;
            index += 1;
            out.extend(std::iter::repeat(byte).take(control as usize - 128 + 3));
        } else {
            let len = control as usize + 1;
            let literals = data.get(index..index + len)?;
            out.extend_from_slice(literals);
            index += len;
        }
    }
    Some(out)
}

impl Optimizer {
    /// A fresh optimizer with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze payload shape; cached by content hash.
    pub fn analyze(&self, data: &[u8]) -> PatternAnalysis {
        let key = content_hash(data);
        if let Some(cached) = self.analysis_cache.lock().expect("cache lock").get(&key) {
            return *cached;
        }

        let mut histogram = [0usize; 256];
        for &byte in data {
            histogram[byte as usize] += 1;
        }
        let distinct_bytes = histogram.iter().filter(|&&count| count > 0).count();
        let (dominant_byte, dominant_count) = histogram
            .iter()
            .enumerate()
            .max_by_key(|(_, &count)| count)
            .map(|(byte, &count)| (byte as u8, count))
            .unwrap_or((0, 0));

        let mut run_bytes = 0;
        let mut index = 0;
        while index < data.len() {
            let mut run = 1;
            while index + run < data.len() && data[index + run] == data[index] {
                run += 1;
            }
            if run >= 4 {
                run_bytes += run;
            }
            index += run;
        }

        let mut seen = std::collections::HashSet::new();
        let mut repeated_chunks = 0;
        for chunk in data.chunks(P2WSH_CHUNK_LEN) {
            if !seen.insert(chunk.to_vec()) {
                repeated_chunks += 1;
            }
        }

        let analysis = PatternAnalysis {
            len: data.len(),
            distinct_bytes,
            run_bytes,
            dominant_byte,
            dominant_share: if data.is_empty() {
                0.0
            } else {
                dominant_count as f64 / data.len() as f64
            },
            repeated_chunks,
        };
        self.analysis_cache.lock().expect("cache lock").insert(key, analysis);
        analysis
    }

    /// Measure chunk-level redundancy.
    pub fn dedup_report(&self, data: &[u8]) -> DedupReport {
        let mut seen = std::collections::HashSet::new();
        let mut total_chunks = 0;
        for chunk in data.chunks(P2WSH_CHUNK_LEN) {
            total_chunks += 1;
            seen.insert(chunk.to_vec());
        }
        let unique_chunks = seen.len();
        DedupReport {
            total_chunks,
            unique_chunks,
            savings_bytes: (total_chunks - unique_chunks) * P2WSH_CHUNK_LEN,
        }
    }

    /// Pick the chunking strategy with the fewest P2WSH outputs.
    ///
    /// RLE participates in scoring but never wins the wire form: external
    /// decoders accept raw or zlib payloads only. Every failure path degrades
    /// to pass-through.
    pub fn optimize(&self, data: &[u8]) -> OptimizedPayload {
        let key = content_hash(data);
        if let Some(cached) = self.optimize_cache.lock().expect("cache lock").get(&key) {
            return cached.clone();
        }

        let original_chunks = chunk_count(data.len());
        let mut scores = vec![(ChunkStrategy::Raw, original_chunks)];

        let deflated = zlib_compress(data);
        if let Some(deflated) = &deflated {
            scores.push((ChunkStrategy::Zlib, chunk_count(deflated.len())));
        }
        let rle = rle_encode(data);
        scores.push((ChunkStrategy::Rle, chunk_count(rle.len())));

        let (strategy, optimized) = match &deflated {
            Some(deflated) if deflated.len() < data.len() => {
                (ChunkStrategy::Zlib, deflated.clone())
            }
            _ => (ChunkStrategy::Raw, data.to_vec()),
        };

        let verification = verify(data, strategy, &optimized);
        let payload = if verification.is_valid {
            OptimizedPayload {
                strategy,
                optimized_chunks: chunk_count(optimized.len()),
                data: optimized,
                original_len: data.len(),
                original_chunks,
                verification,
                scores,
            }
        } else {
            tracing::warn!("optimizer verification failed, passing payload through");
            OptimizedPayload {
                strategy: ChunkStrategy::Raw,
                data: data.to_vec(),
                original_len: data.len(),
                original_chunks,
                optimized_chunks: original_chunks,
                verification,
                scores,
            }
        };

        self.optimize_cache
            .lock()
            .expect("cache lock")
            .insert(key, payload.clone());
        payload
    }
}

fn verify(original: &[u8], strategy: ChunkStrategy, optimized: &[u8]) -> Verification {
    let mut warnings = Vec::new();
    let round_trip = match strategy {
        ChunkStrategy::Raw => Some(optimized.to_vec()),
        ChunkStrategy::Zlib => zlib_decompress(optimized),
        ChunkStrategy::Rle => rle_decode(optimized),
    };
    let is_valid = round_trip.as_deref() == Some(original);
    if !is_valid {
        warnings.push("optimized payload does not round-trip".to_owned());
    }
    if optimized.len() >= original.len() && strategy != ChunkStrategy::Raw {
        warnings.push("optimized form is not smaller than the original".to_owned());
    }
    Verification { is_valid, warnings }
}

fn zlib_compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

fn zlib_decompress(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rle_round_trips_runs_and_literals() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![7],
            vec![1, 2, 3, 4, 5],
            vec![9; 500],
            b"aaabbbcccabcabc".to_vec(),
            {
                let mut mixed = vec![0u8; 200];
                mixed.extend(1..=200u8.min(255));
                mixed.extend(vec![0xff; 131]);
                mixed
            },
        ];
        for case in cases {
            assert_eq!(rle_decode(&rle_encode(&case)).unwrap(), case, "case len {}", case.len());
        }
    }

    #[test]
    fn rle_compresses_runs() {
        let data = vec![0u8; 320];
        let encoded = rle_encode(&data);
        assert!(encoded.len() < data.len() / 10);
    }

    #[test]
    fn analysis_measures_shape() {
        let optimizer = Optimizer::new();
        let mut data = vec![0u8; 64];
        data.extend(b"unique tail bytes!");
        let analysis = optimizer.analyze(&data);
        assert_eq!(analysis.len, data.len());
        assert_eq!(analysis.dominant_byte, 0);
        assert!(analysis.dominant_share > 0.7);
        assert!(analysis.run_bytes >= 64);
        // First two 32-byte chunks are identical zero chunks.
        assert_eq!(analysis.repeated_chunks, 1);
    }

    #[test]
    fn analysis_is_cached() {
        let optimizer = Optimizer::new();
        let data = vec![1u8; 100];
        let first = optimizer.analyze(&data);
        let second = optimizer.analyze(&data);
        assert_eq!(first, second);
        assert_eq!(optimizer.analysis_cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn dedup_counts_duplicate_chunks() {
        let mut data = vec![5u8; 96];
        data.extend(b"tail");
        let report = Optimizer::new().dedup_report(&data);
        assert_eq!(report.total_chunks, 4);
        assert_eq!(report.unique_chunks, 2);
        assert_eq!(report.savings_bytes, 64);
    }

    #[test]
    fn repetitive_payload_ships_zlib() {
        let data = vec![0xaa; 4096];
        let optimized = Optimizer::new().optimize(&data);
        assert_eq!(optimized.strategy, ChunkStrategy::Zlib);
        assert!(optimized.optimized_chunks < optimized.original_chunks);
        assert!(optimized.verification.is_valid);
        assert_eq!(zlib_decompress(&optimized.data).unwrap(), data);
    }

    #[test]
    fn rle_is_scored_but_never_shipped() {
        let data = vec![0xbb; 1024];
        let optimized = Optimizer::new().optimize(&data);
        assert!(optimized.scores.iter().any(|(s, _)| *s == ChunkStrategy::Rle));
        assert_ne!(optimized.strategy, ChunkStrategy::Rle);
    }

    #[test]
    fn optimize_is_cached_by_content() {
        let optimizer = Optimizer::new();
        let data = b"cache me twice".repeat(20);
        let first = optimizer.optimize(&data);
        let second = optimizer.optimize(&data);
        assert_eq!(first, second);
        assert_eq!(optimizer.optimize_cache.lock().unwrap().len(), 1);
    }
}
