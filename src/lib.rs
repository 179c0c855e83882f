//! # Crash Game Round Engine
//!
//! Provably-fair "crash" betting rounds: a multiplier climbs from 1.0 while
//! players may cash out at any moment before a cryptographically
//! pre-committed crash point is reached.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CRASH SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  fair/           - Provable fairness                         │
//! │  ├── oracle.rs   - Seed generation and round commitment      │
//! │  └── crash.rs    - Crash-point derivation and verification   │
//! │                                                              │
//! │  ledger/         - Balances and the open-bet book            │
//! │                                                              │
//! │  game/           - Round logic (deterministic)               │
//! │  ├── round.rs    - Round and bet-entry state                 │
//! │  ├── engine.rs   - Lifecycle state machine + bet protocol    │
//! │  ├── events.rs   - Events emitted to subscribers             │
//! │  ├── asset.rs    - Closed asset/currency enums               │
//! │  └── error.rs    - Player-facing error taxonomy              │
//! │                                                              │
//! │  service/        - Async shell (single-writer task)          │
//! │  broadcast.rs    - Event fan-out                             │
//! │  store/          - Best-effort persistence contract          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness Guarantee
//!
//! Every round's outcome is sealed before the first bet:
//! `SHA256(server_seed-client_seed-nonce)` is published at round creation and
//! the crash point is a pure function of the same preimage. The server seed
//! is revealed when the round terminates so anyone can re-derive the result.
//!
//! ## Concurrency Model
//!
//! One task owns round state. The multiplier tick and all player requests are
//! serialized through a single `select!` loop, so "multiplier crossed the
//! crash point" and "player cashed out" are never both true for the same
//! instant. Broadcast and persistence are fire-and-forget from that loop.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod fair;
pub mod game;
pub mod ledger;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use broadcast::Broadcaster;
pub use config::EngineConfig;
pub use fair::{FairnessOracle, VerifyRequest, VerifyResponse};
pub use game::{
    Asset, BetRequest, Currency, GameError, GameEvent, RoundEngine, RoundSnapshot, RoundStatus,
    UserId,
};
pub use ledger::Ledger;
pub use service::{EngineHandle, RoundService};
pub use store::{MemoryStore, Store};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
