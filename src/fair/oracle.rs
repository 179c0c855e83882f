//! Fairness Oracle
//!
//! Draws fresh seed material for each round and seals the outcome behind a
//! published commitment before any bet is accepted. The server seed stays
//! secret until the round terminates.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::fair::crash::{commit_hash, crash_point};

/// Server seed entropy in bytes (256 bits, hex-encoded to 64 chars).
const SERVER_SEED_BYTES: usize = 32;

/// Client seed entropy in bytes (128 bits, hex-encoded to 32 chars).
const CLIENT_SEED_BYTES: usize = 16;

/// Sealed outcome for one round.
///
/// `commit_hash` is published at round creation; `server_seed` and
/// `crash_point` must not leave the engine until the round terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundCommit {
    /// Secret server seed, hex-encoded.
    pub server_seed: String,
    /// Client seed, hex-encoded.
    pub client_seed: String,
    /// Round nonce.
    pub nonce: u64,
    /// Published pre-commitment, `SHA256(server-client-nonce)` hex.
    pub commit_hash: String,
    /// Crash point derived from the preimage.
    pub crash_point: f64,
}

/// Generates and seals round outcomes.
///
/// Owns the per-process nonce counter; both seeds are regenerated on every
/// commit. The counter is not persisted across restarts — each round's
/// commitment is self-contained proof.
#[derive(Debug)]
pub struct FairnessOracle {
    house_edge: f64,
    nonce: u64,
}

impl FairnessOracle {
    /// Create an oracle with a fixed house edge (e.g. 0.05).
    pub fn new(house_edge: f64) -> Self {
        Self { house_edge, nonce: 0 }
    }

    /// The configured house edge.
    pub fn house_edge(&self) -> f64 {
        self.house_edge
    }

    /// Seal the next round: fresh seed pair, current nonce, commitment hash
    /// and crash point. Advances the nonce counter.
    pub fn commit(&mut self) -> RoundCommit {
        let server_seed = random_hex(SERVER_SEED_BYTES);
        let client_seed = random_hex(CLIENT_SEED_BYTES);
        let nonce = self.nonce;
        self.nonce += 1;

        let commit_hash = commit_hash(&server_seed, &client_seed, nonce);
        let crash_point = crash_point(&server_seed, &client_seed, nonce, self.house_edge);

        RoundCommit {
            server_seed,
            client_seed,
            nonce,
            commit_hash,
            crash_point,
        }
    }
}

/// Hex-encoded random bytes from the OS CSPRNG.
fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::crash::verify;

    #[test]
    fn test_commit_shapes() {
        let mut oracle = FairnessOracle::new(0.05);
        let commit = oracle.commit();

        assert_eq!(commit.server_seed.len(), 64);
        assert_eq!(commit.client_seed.len(), 32);
        assert_eq!(commit.commit_hash.len(), 64);
        assert!(commit.crash_point >= 1.0);
    }

    #[test]
    fn test_nonce_advances_per_commit() {
        let mut oracle = FairnessOracle::new(0.05);
        assert_eq!(oracle.commit().nonce, 0);
        assert_eq!(oracle.commit().nonce, 1);
        assert_eq!(oracle.commit().nonce, 2);
    }

    #[test]
    fn test_seeds_regenerated_each_commit() {
        let mut oracle = FairnessOracle::new(0.05);
        let a = oracle.commit();
        let b = oracle.commit();

        assert_ne!(a.server_seed, b.server_seed);
        assert_ne!(a.client_seed, b.client_seed);
        assert_ne!(a.commit_hash, b.commit_hash);
    }

    #[test]
    fn test_commit_matches_derivation() {
        let mut oracle = FairnessOracle::new(0.05);
        let commit = oracle.commit();

        assert_eq!(
            commit.commit_hash,
            commit_hash(&commit.server_seed, &commit.client_seed, commit.nonce)
        );
        assert!(verify(
            &commit.server_seed,
            &commit.client_seed,
            commit.nonce,
            0.05,
            commit.crash_point
        ));
    }
}
