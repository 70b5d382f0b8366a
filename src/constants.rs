//! Protocol constants shared across the crate.

/// Value of every stampchain data output (P2WSH dust on mainnet at 1 sat/vB).
pub const STAMP_DUST: u64 = 330;

/// Value of the P2WPKH anchor output leading SRC-20 transactions.
pub const SRC20_ANCHOR_VALUE: u64 = 330;

/// Counterparty message prefix, prepended before obfuscation.
pub const CNTRPRTY_MAGIC: &[u8; 8] = b"CNTRPRTY";

/// Counterparty message type for an LR-compact issuance.
pub const LR_ISSUANCE_TYPE: u8 = 22;

/// Maximum issuance description length in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 52;

/// ASCII framing prefix of every SRC-20 payload.
pub const STAMP_PREFIX: &[u8; 6] = b"stamp:";

/// Payload bytes carried by one P2WSH witness program.
pub const P2WSH_CHUNK_LEN: usize = 32;

/// Standardness cap on OP_RETURN data bytes.
pub const MAX_OP_RETURN_LEN: usize = 80;

/// Network dust floors at 1 sat/vB (mainnet).
pub const DUST_P2PKH: u64 = 546;
/// P2WPKH dust floor.
pub const DUST_P2WPKH: u64 = 294;
/// P2SH dust floor.
pub const DUST_P2SH: u64 = 540;
/// P2WSH dust floor.
pub const DUST_P2WSH: u64 = 330;
/// P2TR dust floor.
pub const DUST_P2TR: u64 = 330;

/// Long-term fee rate assumed when the caller does not provide one, in sat/vB.
pub const DEFAULT_LONG_TERM_FEE_RATE: u64 = 10;

/// Lowest fee rate accepted after normalization, in sat/vB.
pub const MIN_FEE_RATE: u64 = 1;
/// Highest fee rate accepted after normalization, in sat/vB.
pub const MAX_FEE_RATE: u64 = 1000;

/// Payload size at or above which the SRC-20 encoder attempts compression.
pub const SRC20_COMPRESSION_THRESHOLD: usize = 100;

/// Node budget for the branch-and-bound search.
pub const BNB_TOTAL_TRIES: usize = 100_000;
/// Decision-tree depth cap for the branch-and-bound search.
pub const BNB_MAX_DEPTH: usize = 20;

/// Cardinality cap of the blackjack exact phase.
pub const BLACKJACK_EXACT_MAX_INPUTS: usize = 10;
/// Cardinality cap of the blackjack closest phase.
pub const BLACKJACK_CLOSEST_MAX_INPUTS: usize = 15;
/// Combination budget per subset size in the blackjack search.
pub const BLACKJACK_COMBINATIONS_PER_SIZE: usize = 10_000;

/// Iteration budget of the stochastic knapsack walk.
pub const KNAPSACK_ITERATIONS: usize = 1000;
/// Inclusion probability of the knapsack walk.
pub const KNAPSACK_INCLUSION_PROBABILITY: f64 = 0.5;
/// Smallest non-zero excess the knapsack accepts, mirroring a change dust floor.
pub const KNAPSACK_CHANGE_FLOOR: u64 = 1000;
