//! Persistence Contract
//!
//! The engine treats storage as a best-effort sink: every write is routed
//! through a dedicated writer task so a slow or failing store can never stall
//! the multiplier clock. Failures are logged and retried a bounded number of
//! times; gameplay proceeds from in-memory state regardless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::game::asset::{Asset, Currency};
use crate::game::round::{Round, RoundId, RoundStatus, UserId};
use crate::ledger::UserRecord;

/// Write attempts per operation before giving up.
const WRITE_ATTEMPTS: u32 = 3;

/// Delay between write retries.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Store failures are always treated as transient.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transient store failure: {0}")]
pub struct StoreError(pub String);

/// Economic event kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Wager debited at bet time.
    Bet,
    /// Payout credited at cashout.
    Cashout,
    /// Wager forfeited at round end.
    Loss,
}

/// Immutable append-only record of one economic event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Record identifier.
    pub id: Uuid,
    /// User the event belongs to.
    pub user_id: UserId,
    /// Round the event belongs to.
    pub round_id: RoundId,
    /// Event kind.
    pub kind: TransactionKind,
    /// Amount in quote-currency units.
    pub amount: f64,
    /// Quote currency.
    pub currency: Currency,
    /// Amount in settlement-asset units.
    pub settlement_amount: f64,
    /// Settlement asset.
    pub asset: Asset,
    /// Asset price in the quote currency at the event.
    pub exchange_rate: f64,
    /// Multiplier at the event (1.0 for bets).
    pub multiplier: f64,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    /// Record for a placed bet.
    #[allow(clippy::too_many_arguments)]
    pub fn bet(
        user_id: UserId,
        round_id: RoundId,
        amount: f64,
        currency: Currency,
        settlement_amount: f64,
        asset: Asset,
        exchange_rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            round_id,
            kind: TransactionKind::Bet,
            amount,
            currency,
            settlement_amount,
            asset,
            exchange_rate,
            multiplier: 1.0,
            timestamp,
        }
    }

    /// Record for a cashout payout.
    #[allow(clippy::too_many_arguments)]
    pub fn cashout(
        user_id: UserId,
        round_id: RoundId,
        amount: f64,
        currency: Currency,
        settlement_amount: f64,
        asset: Asset,
        exchange_rate: f64,
        multiplier: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            round_id,
            kind: TransactionKind::Cashout,
            amount,
            currency,
            settlement_amount,
            asset,
            exchange_rate,
            multiplier,
            timestamp,
        }
    }

    /// Record for a forfeited wager.
    #[allow(clippy::too_many_arguments)]
    pub fn loss(
        user_id: UserId,
        round_id: RoundId,
        amount: f64,
        currency: Currency,
        settlement_amount: f64,
        asset: Asset,
        exchange_rate: f64,
        multiplier: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            round_id,
            kind: TransactionKind::Loss,
            amount,
            currency,
            settlement_amount,
            asset,
            exchange_rate,
            multiplier,
            timestamp,
        }
    }
}

/// Page request, 1-based.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number starting at 1.
    pub page: usize,
    /// Items per page.
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// Page of query results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, newest first.
    pub items: Vec<T>,
    /// Requested page.
    pub page: usize,
    /// Requested page size.
    pub limit: usize,
    /// Total matching items.
    pub total: usize,
    /// Total pages.
    pub pages: usize,
}

impl<T> Page<T> {
    fn from_slice(all: &[T], page: Pagination) -> Self
    where
        T: Clone,
    {
        let limit = page.limit.max(1);
        let number = page.page.max(1);
        let total = all.len();
        let skip = (number - 1).saturating_mul(limit);
        let items = all.iter().skip(skip).take(limit).cloned().collect();
        Self {
            items,
            page: number,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}

/// History row for a round query.
///
/// The crash point and server seed stay hidden until the round terminates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round identifier.
    pub id: RoundId,
    /// Lifecycle status.
    pub status: RoundStatus,
    /// When the round was created.
    pub created_at: DateTime<Utc>,
    /// When the round terminated, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Crash point, revealed only after termination.
    pub crash_point: Option<f64>,
    /// Published pre-commitment.
    pub commit_hash: String,
    /// Bets placed.
    pub total_bets: u64,
    /// Sum of quoted wagers.
    pub total_wagered: f64,
}

impl From<&Round> for RoundSummary {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id,
            status: round.status,
            created_at: round.created_at,
            ended_at: round.ended_at,
            crash_point: round.status.is_terminal().then_some(round.crash_point),
            commit_hash: round.commit_hash.clone(),
            total_bets: round.total_bets,
            total_wagered: round.total_wagered,
        }
    }
}

/// Durable storage for rounds, users and transactions.
///
/// Every call may fail transiently; callers log and continue.
pub trait Store: Send + Sync + 'static {
    /// Persist a newly created round.
    fn create_round(&self, round: &Round) -> Result<(), StoreError>;
    /// Overwrite a round record.
    fn update_round(&self, round: &Round) -> Result<(), StoreError>;
    /// Append a transaction record.
    fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;
    /// Fetch a user record.
    fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, StoreError>;
    /// Upsert a user record.
    fn update_user(&self, record: &UserRecord) -> Result<(), StoreError>;
    /// Round history, newest first.
    fn query_rounds(&self, page: Pagination) -> Result<Page<RoundSummary>, StoreError>;
    /// One user's transactions, newest first.
    fn query_transactions(
        &self,
        user_id: &UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError>;
}

/// Write operation queued from the engine to the writer task.
#[derive(Clone, Debug)]
pub enum StoreOp {
    /// Persist a new round.
    CreateRound(Box<Round>),
    /// Overwrite a round.
    UpdateRound(Box<Round>),
    /// Append a transaction.
    AppendTransaction(TransactionRecord),
    /// Upsert user balances and stats.
    UpdateUser(UserRecord),
}

fn apply(store: &dyn Store, op: &StoreOp) -> Result<(), StoreError> {
    match op {
        StoreOp::CreateRound(round) => store.create_round(round),
        StoreOp::UpdateRound(round) => store.update_round(round),
        StoreOp::AppendTransaction(record) => store.append_transaction(record),
        StoreOp::UpdateUser(record) => store.update_user(record),
    }
}

/// Spawn the store writer task.
///
/// Drains queued operations until every sender is dropped, so pending writes
/// flush on shutdown. The engine never awaits this task mid-round.
pub fn spawn_writer(
    store: std::sync::Arc<dyn Store>,
    mut rx: mpsc::UnboundedReceiver<StoreOp>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match apply(store.as_ref(), &op) {
                    Ok(()) => break,
                    Err(err) if attempt < WRITE_ATTEMPTS => {
                        warn!("store write failed (attempt {}): {}", attempt, err);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                    Err(err) => {
                        error!("store write dropped after {} attempts: {}", attempt, err);
                        break;
                    }
                }
            }
        }
    })
}

#[derive(Default)]
struct MemoryInner {
    rounds: Vec<Round>,
    transactions: Vec<TransactionRecord>,
    users: HashMap<UserId, UserRecord>,
}

/// In-memory store for tests and the demo binary.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rounds persisted.
    pub fn round_count(&self) -> usize {
        self.inner.lock().expect("store lock").rounds.len()
    }

    /// Number of transactions persisted.
    pub fn transaction_count(&self) -> usize {
        self.inner.lock().expect("store lock").transactions.len()
    }
}

impl Store for MemoryStore {
    fn create_round(&self, round: &Round) -> Result<(), StoreError> {
        self.inner
            .lock()
            .expect("store lock")
            .rounds
            .push(round.clone());
        Ok(())
    }

    fn update_round(&self, round: &Round) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        match inner.rounds.iter_mut().find(|r| r.id == round.id) {
            Some(existing) => *existing = round.clone(),
            None => inner.rounds.push(round.clone()),
        }
        Ok(())
    }

    fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .expect("store lock")
            .transactions
            .push(record.clone());
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .users
            .get(user_id)
            .cloned())
    }

    fn update_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .expect("store lock")
            .users
            .insert(record.user_id, record.clone());
        Ok(())
    }

    fn query_rounds(&self, page: Pagination) -> Result<Page<RoundSummary>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        let mut summaries: Vec<RoundSummary> = inner.rounds.iter().map(RoundSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_slice(&summaries, page))
    }

    fn query_transactions(
        &self,
        user_id: &UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        let mut records: Vec<TransactionRecord> = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == *user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(Page::from_slice(&records, page))
    }
}
