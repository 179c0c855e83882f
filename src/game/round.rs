//! Round State Definitions
//!
//! The authoritative record of one crash round: lifecycle status, fairness
//! material, bet entries and the multiplier history trail.
//! Uses BTreeMap for deterministic iteration order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::fair::RoundCommit;
use crate::game::asset::{Asset, Currency};

/// Unique player identifier, supplied by the external identity collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Fresh random id (tests and demo tooling).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique round identifier, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub Uuid);

impl RoundId {
    /// Fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Round lifecycle status.
///
/// `Crashed` and `Completed` are terminal within a cycle; a new `Waiting`
/// round supersedes them after the cool-down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Accept window: bets allowed, multiplier pinned at 1.0.
    Waiting,
    /// Multiplier climbing: cashouts allowed, bets rejected.
    Active,
    /// Multiplier reached the crash point.
    Crashed,
    /// Duration cap reached without a crash (defensive bound).
    Completed,
}

impl RoundStatus {
    /// True once the round will accept no further mutations.
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Crashed | RoundStatus::Completed)
    }
}

/// One user's wager in a round.
///
/// The cashout fields are unset until the entry settles as a win; an entry
/// settles at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BetEntry {
    /// Owner of the wager.
    pub user_id: UserId,

    /// Wager as quoted to the player.
    pub wager_amount: f64,
    /// Currency the wager was quoted in.
    pub wager_currency: Currency,

    /// Balance unit actually debited and credited.
    pub settlement_asset: Asset,
    /// Amount debited, in settlement-asset units.
    pub settlement_amount: f64,
    /// Asset price in the quote currency at bet time.
    pub exchange_rate_at_bet: f64,

    /// When the bet was placed.
    pub placed_at: DateTime<Utc>,

    /// Multiplier at cashout; set exactly once on a win.
    pub cashout_multiplier: Option<f64>,
    /// Payout credited, in settlement-asset units.
    pub cashout_amount: Option<f64>,
    /// When the cashout happened.
    pub cashout_at: Option<DateTime<Utc>>,
    /// Win/loss flag, set at settlement.
    pub won: Option<bool>,
}

impl BetEntry {
    /// Open entry for a freshly placed bet.
    pub fn new(
        user_id: UserId,
        wager_amount: f64,
        wager_currency: Currency,
        settlement_asset: Asset,
        settlement_amount: f64,
        exchange_rate_at_bet: f64,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            wager_amount,
            wager_currency,
            settlement_asset,
            settlement_amount,
            exchange_rate_at_bet,
            placed_at,
            cashout_multiplier: None,
            cashout_amount: None,
            cashout_at: None,
            won: None,
        }
    }

    /// True until the entry settles.
    pub fn is_open(&self) -> bool {
        self.won.is_none()
    }

    /// Profit in quote-currency units, once settled as a win.
    pub fn profit(&self) -> Option<f64> {
        self.cashout_multiplier
            .map(|m| self.wager_amount * m - self.wager_amount)
    }
}

/// Multiplier snapshot appended on every tick, for audit and replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistorySample {
    /// Sample time.
    pub timestamp: DateTime<Utc>,
    /// Multiplier at the sample.
    pub multiplier: f64,
    /// Entries still open at the sample.
    pub active_entries: usize,
}

/// Complete state of one round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Round {
    /// Round identifier.
    pub id: RoundId,
    /// Lifecycle status.
    pub status: RoundStatus,

    /// When the round record was created (accept window opens).
    pub created_at: DateTime<Utc>,
    /// When the multiplier started climbing.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once, at termination.
    pub ended_at: Option<DateTime<Utc>>,

    /// Pre-committed crash point. Never exposed in client snapshots before
    /// termination.
    pub crash_point: f64,
    /// Secret until termination.
    pub server_seed: String,
    /// Published with the commitment.
    pub client_seed: String,
    /// Round nonce.
    pub nonce: u64,
    /// Published pre-commitment hash.
    pub commit_hash: String,

    /// Last broadcast multiplier; frozen at the crash point on a crash.
    pub current_multiplier: f64,

    /// Number of bets placed.
    pub total_bets: u64,
    /// Sum of quoted wagers.
    pub total_wagered: f64,

    /// Audit copy of every entry, settled in place at termination.
    pub entries: BTreeMap<UserId, BetEntry>,

    /// Append-only multiplier trail.
    pub history: Vec<HistorySample>,
}

impl Round {
    /// Create a waiting round from a sealed commitment.
    pub fn new(commit: RoundCommit, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RoundId::random(),
            status: RoundStatus::Waiting,
            created_at,
            started_at: None,
            ended_at: None,
            crash_point: commit.crash_point,
            server_seed: commit.server_seed,
            client_seed: commit.client_seed,
            nonce: commit.nonce,
            commit_hash: commit.commit_hash,
            current_multiplier: 1.0,
            total_bets: 0,
            total_wagered: 0.0,
            entries: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Entries not yet settled.
    pub fn open_entry_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_open()).count()
    }

    /// Client-visible snapshot. Omits the crash point and seeds.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            id: self.id,
            status: self.status,
            current_multiplier: self.current_multiplier,
            open_entry_count: self.open_entry_count(),
            total_bets: self.total_bets,
            total_wagered: self.total_wagered,
            commit_hash: self.commit_hash.clone(),
        }
    }
}

/// Poll answer for clients; safe to expose mid-round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round identifier.
    pub id: RoundId,
    /// Lifecycle status.
    pub status: RoundStatus,
    /// Multiplier as of the last tick.
    pub current_multiplier: f64,
    /// Entries still open.
    pub open_entry_count: usize,
    /// Number of bets placed.
    pub total_bets: u64,
    /// Sum of quoted wagers.
    pub total_wagered: f64,
    /// Published pre-commitment.
    pub commit_hash: String,
}
