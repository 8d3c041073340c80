//! Cryptographic adapters: signature verification and randomness.

mod hashing;
mod random;

pub use hashing::Secp256k1Verifier;
pub use random::OsRandomSource;
