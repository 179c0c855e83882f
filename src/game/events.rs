//! Engine Events
//!
//! Everything the round engine tells the outside world, in broadcast order.
//! Fan-out is the broadcaster's problem; the engine only emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::asset::Currency;
use crate::game::round::{RoundId, UserId};

/// Round and player events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// New round created; commitment published, bets open.
    RoundCommitted {
        /// Round identifier.
        round_id: RoundId,
        /// Pre-commitment hash proving the outcome is already fixed.
        commit_hash: String,
        /// When the accept window opened.
        start_time: DateTime<Utc>,
    },

    /// Accept window elapsed; multiplier starts climbing.
    RoundStarted {
        /// Round identifier.
        round_id: RoundId,
    },

    /// Periodic multiplier broadcast.
    MultiplierUpdate {
        /// Round identifier.
        round_id: RoundId,
        /// Current multiplier.
        multiplier: f64,
        /// Entries still open.
        open_entry_count: usize,
    },

    /// A bet was accepted.
    PlayerBet {
        /// Round identifier.
        round_id: RoundId,
        /// Bettor.
        user_id: UserId,
        /// Quoted wager amount.
        amount: f64,
        /// Quote currency.
        currency: Currency,
        /// Bets placed so far this round.
        total_bets: u64,
    },

    /// A cashout was paid.
    PlayerCashout {
        /// Round identifier.
        round_id: RoundId,
        /// Winner.
        user_id: UserId,
        /// Multiplier the entry settled at.
        multiplier: f64,
        /// Payout in quote-currency units.
        payout: f64,
        /// Payout minus wager.
        profit: f64,
    },

    /// Multiplier reached the crash point. Server seed revealed.
    RoundCrashed {
        /// Round identifier.
        round_id: RoundId,
        /// The pre-committed crash point.
        crash_point: f64,
        /// Seed players use to verify the outcome.
        server_seed: String,
    },

    /// Duration cap reached without a crash. Server seed still revealed.
    RoundCompleted {
        /// Round identifier.
        round_id: RoundId,
        /// Multiplier at the cap.
        final_multiplier: f64,
        /// Seed players use to verify the outcome.
        server_seed: String,
    },
}

impl GameEvent {
    /// Round the event belongs to.
    pub fn round_id(&self) -> RoundId {
        match self {
            GameEvent::RoundCommitted { round_id, .. }
            | GameEvent::RoundStarted { round_id }
            | GameEvent::MultiplierUpdate { round_id, .. }
            | GameEvent::PlayerBet { round_id, .. }
            | GameEvent::PlayerCashout { round_id, .. }
            | GameEvent::RoundCrashed { round_id, .. }
            | GameEvent::RoundCompleted { round_id, .. } => *round_id,
        }
    }

    /// True for events that reveal the server seed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GameEvent::RoundCrashed { .. } | GameEvent::RoundCompleted { .. }
        )
    }
}
