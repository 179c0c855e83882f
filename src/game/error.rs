//! Player-Facing Error Taxonomy
//!
//! Every rejection maps to a stable code so clients branch on semantics, not
//! message text.

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;

/// How a [`GameError`] should be classified by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any state is touched.
    Validation,
    /// Operation not valid in the current round state.
    State,
    /// Caller lacks the funds for the operation.
    Resource,
    /// Engine is shutting down or gone.
    Unavailable,
}

/// Rejection returned from a player-facing operation.
///
/// No variant implies partial side effects: a rejected operation either
/// touched nothing or was fully rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameError {
    /// Wager amount was zero, negative, or non-finite.
    #[error("invalid bet amount")]
    InvalidAmount,

    /// Bets are only accepted while the round is waiting.
    #[error("round is not accepting bets")]
    RoundNotAcceptingBets,

    /// Cashout requires an active round.
    #[error("no active round")]
    NoActiveRound,

    /// The user already holds an entry in this round.
    #[error("already placed a bet in this round")]
    AlreadyBet,

    /// No open entry exists for this user in the current round.
    #[error("no active bet found")]
    NoOpenBet,

    /// The entry was already cashed out.
    #[error("bet already settled")]
    AlreadySettled,

    /// The multiplier reached the crash point before this cashout.
    #[error("round already crashed")]
    CrashAlreadyOccurred,

    /// Balance is lower than the requested wager.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// The engine task is no longer running.
    #[error("engine unavailable")]
    EngineClosed,
}

impl GameError {
    /// Stable machine-readable code, part of the public contract.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidAmount => "invalid_amount",
            GameError::RoundNotAcceptingBets => "round_not_accepting_bets",
            GameError::NoActiveRound => "no_active_round",
            GameError::AlreadyBet => "already_bet",
            GameError::NoOpenBet => "no_open_bet",
            GameError::AlreadySettled => "already_settled",
            GameError::CrashAlreadyOccurred => "crash_already_occurred",
            GameError::InsufficientBalance => "insufficient_balance",
            GameError::EngineClosed => "engine_closed",
        }
    }

    /// Error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidAmount => ErrorKind::Validation,
            GameError::RoundNotAcceptingBets
            | GameError::NoActiveRound
            | GameError::AlreadyBet
            | GameError::NoOpenBet
            | GameError::AlreadySettled
            | GameError::CrashAlreadyOccurred => ErrorKind::State,
            GameError::InsufficientBalance => ErrorKind::Resource,
            GameError::EngineClosed => ErrorKind::Unavailable,
        }
    }
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance => GameError::InsufficientBalance,
            LedgerError::AlreadyBet => GameError::AlreadyBet,
            LedgerError::NoOpenBet => GameError::NoOpenBet,
            LedgerError::AlreadySettled => GameError::AlreadySettled,
            LedgerError::UnknownRound => GameError::NoActiveRound,
        }
    }
}
