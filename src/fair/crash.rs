//! Crash-Point Derivation and Verification
//!
//! The crash point is derived from `SHA256("{server_seed}-{client_seed}-{nonce}")`.
//! The first 4 digest bytes (big-endian, equal to the first 8 hex characters)
//! become a uniform draw in [0, 1], which is pushed through the house-edge
//! curve `1 / (1 - edge - f * (1 - edge))`.
//!
//! All arithmetic is 64-bit floating point in exactly the order written here;
//! [`verify`] depends on independent implementations reproducing it, so the
//! expression must not be reordered.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum absolute difference accepted by [`verify`].
///
/// Loose enough to absorb representation differences between verifier
/// implementations, far tighter than the gap between adjacent outcomes.
pub const VERIFY_TOLERANCE: f64 = 1e-4;

/// SHA-256 digest of the seed preimage `"{server}-{client}-{nonce}"`.
fn seed_digest(server_seed: &str, client_seed: &str, nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hasher.update(b"-");
    hasher.update(client_seed.as_bytes());
    hasher.update(b"-");
    hasher.update(nonce.to_string().as_bytes());
    hasher.finalize().into()
}

/// Commitment hash published at round creation, hex-encoded.
pub fn commit_hash(server_seed: &str, client_seed: &str, nonce: u64) -> String {
    hex::encode(seed_digest(server_seed, client_seed, nonce))
}

/// Derive the crash point for a seed triple.
///
/// Always >= 1.0. A draw of exactly `u32::MAX` yields `+inf` (the round then
/// terminates through the duration cap rather than a crash).
pub fn crash_point(server_seed: &str, client_seed: &str, nonce: u64, house_edge: f64) -> f64 {
    let digest = seed_digest(server_seed, client_seed, nonce);

    // First 4 digest bytes big-endian == first 8 hex characters as a u32.
    let draw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let f = draw as f64 / u32::MAX as f64;

    let raw = 1.0 / (1.0 - house_edge - f * (1.0 - house_edge));
    raw.max(1.0)
}

/// Recompute the crash point and compare against a claimed value.
pub fn verify(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    house_edge: f64,
    claimed_crash_point: f64,
) -> bool {
    let calculated = crash_point(server_seed, client_seed, nonce, house_edge);
    (calculated - claimed_crash_point).abs() < VERIFY_TOLERANCE
}

/// Verification request as submitted by a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Server seed revealed after round termination.
    pub server_seed: String,
    /// Client seed published with the commitment.
    pub client_seed: String,
    /// Round nonce.
    pub nonce: u64,
    /// Crash point the player is checking.
    pub claimed_crash_point: f64,
}

/// Verification outcome returned to the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the claimed crash point matches the seeds.
    pub is_valid: bool,
    /// Human-readable result.
    pub message: String,
}

/// Answer a player verification request.
pub fn verify_request(req: &VerifyRequest, house_edge: f64) -> VerifyResponse {
    let is_valid = verify(
        &req.server_seed,
        &req.client_seed,
        req.nonce,
        house_edge,
        req.claimed_crash_point,
    );
    let message = if is_valid {
        "Result is provably fair".to_string()
    } else {
        "Result verification failed".to_string()
    };
    VerifyResponse { is_valid, message }
}
