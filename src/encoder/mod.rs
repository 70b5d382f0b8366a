//! Payload encoders: Counterparty issuance, SRC-20 framing, P2WSH chunking.

pub mod counterparty;
pub mod p2wsh;
mod rc4;
pub mod src20;

pub use rc4::Rc4;
