//! Provably-Fair Crash Points
//!
//! Commit to a round outcome before any bet is accepted, reveal the server
//! seed after the round terminates so anyone can reproduce the result.
//!
//! The scheme:
//! 1. [`FairnessOracle::commit`] draws a fresh seed pair and publishes
//!    `SHA256(server_seed-client_seed-nonce)` as the commitment.
//! 2. The crash point is a pure function of the same preimage
//!    ([`crash_point`]), so it is fixed the moment the commitment is
//!    published and unpredictable until the server seed is revealed.
//! 3. [`verify`] lets players recompute the crash point independently.

pub mod crash;
pub mod oracle;

pub use crash::{
    commit_hash, crash_point, verify, verify_request, VerifyRequest, VerifyResponse,
    VERIFY_TOLERANCE,
};
pub use oracle::{FairnessOracle, RoundCommit};
