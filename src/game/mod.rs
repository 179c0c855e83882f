//! Game Logic Module
//!
//! The round state machine and everything it owns. Deterministic with respect
//! to an injected clock; all side effects are queued as data.
//!
//! ## Module Structure
//!
//! - `asset`: Closed asset/currency enumerations
//! - `round`: Round, bet entries, history trail, snapshots
//! - `engine`: Round lifecycle, multiplier clock, bet/cashout protocol
//! - `events`: Events emitted to the broadcaster
//! - `error`: Player-facing error taxonomy

pub mod asset;
pub mod engine;
pub mod error;
pub mod events;
pub mod round;

// Re-export key types
pub use asset::{Asset, Currency};
pub use engine::{BetReceipt, BetRequest, CashoutReceipt, RoundEngine};
pub use error::{ErrorKind, GameError};
pub use events::GameEvent;
pub use round::{BetEntry, Round, RoundId, RoundSnapshot, RoundStatus, UserId};
