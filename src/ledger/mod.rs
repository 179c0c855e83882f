//! Balance Ledger
//!
//! Per-user, per-asset balances plus the open-bet book for in-flight rounds.
//! Balance mutations for the same user and asset are mutually exclusive
//! (per-account lock); different users proceed in parallel. Registration and
//! settlement of bet entries are atomic check-then-act operations.
//!
//! The ledger is the in-memory authority; persistence is a best-effort
//! mirror handled elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::game::asset::Asset;
use crate::game::round::{BetEntry, RoundId, UserId};

/// Typed ledger rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Balance is lower than the requested debit.
    #[error("insufficient balance")]
    InsufficientBalance,
    /// The user already holds an entry in this round.
    #[error("already bet in this round")]
    AlreadyBet,
    /// No entry exists for this user in this round.
    #[error("no open bet")]
    NoOpenBet,
    /// The entry has already settled.
    #[error("bet already settled")]
    AlreadySettled,
    /// No book is open for this round.
    #[error("unknown round")]
    UnknownRound,
}

/// Lifetime wagering stats, in quote-currency units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Sum of all wagers placed.
    pub total_wagered: f64,
    /// Sum of all cashout payouts.
    pub total_won: f64,
    /// Sum of all lost wagers.
    pub total_lost: f64,
    /// Rounds in which the user's entry settled.
    pub rounds_played: u64,
}

/// Persistable snapshot of one user's ledger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// User identifier.
    pub user_id: UserId,
    /// Balance per asset.
    pub balances: BTreeMap<Asset, f64>,
    /// Lifetime stats.
    pub stats: UserStats,
}

#[derive(Debug, Default)]
struct Account {
    balances: BTreeMap<Asset, f64>,
    stats: UserStats,
}

/// Balance store and open-bet book.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: RwLock<HashMap<UserId, Arc<Mutex<Account>>>>,
    books: Mutex<HashMap<RoundId, BTreeMap<UserId, BetEntry>>>,
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, user_id: UserId) -> Arc<Mutex<Account>> {
        if let Some(acct) = self.accounts.read().expect("accounts lock").get(&user_id) {
            return acct.clone();
        }
        let mut accounts = self.accounts.write().expect("accounts lock");
        accounts.entry(user_id).or_default().clone()
    }

    fn existing_account(&self, user_id: &UserId) -> Option<Arc<Mutex<Account>>> {
        self.accounts
            .read()
            .expect("accounts lock")
            .get(user_id)
            .cloned()
    }

    /// Current balance, zero for unknown users or untouched assets.
    pub fn balance(&self, user_id: &UserId, asset: Asset) -> f64 {
        self.existing_account(user_id)
            .map(|acct| {
                acct.lock()
                    .expect("account lock")
                    .balances
                    .get(&asset)
                    .copied()
                    .unwrap_or(0.0)
            })
            .unwrap_or(0.0)
    }

    /// Credit funds, creating the account if needed. Cannot fail.
    ///
    /// Negative or non-finite amounts are a precondition violation.
    pub fn credit(&self, user_id: UserId, asset: Asset, amount: f64) {
        assert!(
            amount.is_finite() && amount >= 0.0,
            "ledger credit precondition violated: {amount}"
        );
        let acct = self.account(user_id);
        let mut acct = acct.lock().expect("account lock");
        *acct.balances.entry(asset).or_insert(0.0) += amount;
    }

    /// Alias for [`Ledger::credit`] used when funding accounts.
    pub fn deposit(&self, user_id: UserId, asset: Asset, amount: f64) {
        self.credit(user_id, asset, amount);
    }

    /// Atomically check and decrement a balance. No partial debits.
    pub fn try_debit(&self, user_id: UserId, asset: Asset, amount: f64) -> Result<(), LedgerError> {
        assert!(
            amount.is_finite() && amount >= 0.0,
            "ledger debit precondition violated: {amount}"
        );
        let acct = self
            .existing_account(&user_id)
            .ok_or(LedgerError::InsufficientBalance)?;
        let mut acct = acct.lock().expect("account lock");
        let balance = acct.balances.entry(asset).or_insert(0.0);
        if *balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        *balance -= amount;
        assert!(*balance >= 0.0, "negative balance after debit");
        Ok(())
    }

    /// Open an empty bet book for a round.
    pub fn open_round(&self, round_id: RoundId) {
        self.books
            .lock()
            .expect("books lock")
            .insert(round_id, BTreeMap::new());
    }

    /// Insert an entry iff the user has none in this round.
    pub fn try_register_entry(
        &self,
        round_id: RoundId,
        user_id: UserId,
        entry: BetEntry,
    ) -> Result<(), LedgerError> {
        let mut books = self.books.lock().expect("books lock");
        let book = books.get_mut(&round_id).ok_or(LedgerError::UnknownRound)?;
        if book.contains_key(&user_id) {
            return Err(LedgerError::AlreadyBet);
        }
        book.insert(user_id, entry);
        Ok(())
    }

    /// Mark the user's entry settled-win and return it for payout.
    ///
    /// The entry stays in the book so a repeat cashout reports
    /// `AlreadySettled` rather than `NoOpenBet`.
    pub fn try_settle_win(
        &self,
        round_id: RoundId,
        user_id: &UserId,
        multiplier: f64,
        at: DateTime<Utc>,
    ) -> Result<BetEntry, LedgerError> {
        let mut books = self.books.lock().expect("books lock");
        let book = books.get_mut(&round_id).ok_or(LedgerError::UnknownRound)?;
        let entry = book.get_mut(user_id).ok_or(LedgerError::NoOpenBet)?;
        if !entry.is_open() {
            return Err(LedgerError::AlreadySettled);
        }
        entry.cashout_multiplier = Some(multiplier);
        entry.cashout_amount = Some(entry.settlement_amount * multiplier);
        entry.cashout_at = Some(at);
        entry.won = Some(true);
        Ok(entry.clone())
    }

    /// Close a round's book, settling every still-open entry as a loss.
    /// Returns all entries for archival.
    pub fn close_round(&self, round_id: RoundId) -> Vec<BetEntry> {
        let book = self
            .books
            .lock()
            .expect("books lock")
            .remove(&round_id)
            .unwrap_or_default();
        book.into_values()
            .map(|mut entry| {
                if entry.is_open() {
                    entry.won = Some(false);
                }
                entry
            })
            .collect()
    }

    /// Entries not yet settled in a round's book.
    pub fn open_entry_count(&self, round_id: &RoundId) -> usize {
        self.books
            .lock()
            .expect("books lock")
            .get(round_id)
            .map(|book| book.values().filter(|e| e.is_open()).count())
            .unwrap_or(0)
    }

    /// Record a placed wager in lifetime stats.
    pub fn record_wager(&self, user_id: UserId, amount: f64) {
        let acct = self.account(user_id);
        acct.lock().expect("account lock").stats.total_wagered += amount;
    }

    /// Record a winning settlement in lifetime stats.
    pub fn record_win(&self, user_id: UserId, payout: f64) {
        let acct = self.account(user_id);
        let mut acct = acct.lock().expect("account lock");
        acct.stats.total_won += payout;
        acct.stats.rounds_played += 1;
    }

    /// Record a losing settlement in lifetime stats.
    pub fn record_loss(&self, user_id: UserId, wager: f64) {
        let acct = self.account(user_id);
        let mut acct = acct.lock().expect("account lock");
        acct.stats.total_lost += wager;
        acct.stats.rounds_played += 1;
    }

    /// Snapshot one user's balances and stats for persistence.
    pub fn snapshot_user(&self, user_id: &UserId) -> Option<UserRecord> {
        let acct = self.existing_account(user_id)?;
        let acct = acct.lock().expect("account lock");
        Some(UserRecord {
            user_id: *user_id,
            balances: acct.balances.clone(),
            stats: acct.stats.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::asset::Currency;

    fn entry_for(user: UserId, settlement: f64) -> BetEntry {
        BetEntry::new(
            user,
            100.0,
            Currency::Usd,
            Asset::Bitcoin,
            settlement,
            50_000.0,
            Utc::now(),
        )
    }

    #[test]
    fn test_debit_credit_conservation() {
        let ledger = Ledger::new();
        let user = UserId::random();

        ledger.deposit(user, Asset::Bitcoin, 1.0);
        ledger.try_debit(user, Asset::Bitcoin, 0.25).unwrap();
        ledger.credit(user, Asset::Bitcoin, 0.45);

        assert!((ledger.balance(&user, Asset::Bitcoin) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_debit_rejects_insufficient() {
        let ledger = Ledger::new();
        let user = UserId::random();

        ledger.deposit(user, Asset::Ethereum, 0.5);
        assert_eq!(
            ledger.try_debit(user, Asset::Ethereum, 0.6),
            Err(LedgerError::InsufficientBalance)
        );
        // Balance untouched after the rejection.
        assert!((ledger.balance(&user, Asset::Ethereum) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_debit_unknown_user() {
        let ledger = Ledger::new();
        assert_eq!(
            ledger.try_debit(UserId::random(), Asset::Bitcoin, 0.1),
            Err(LedgerError::InsufficientBalance)
        );
    }

    #[test]
    fn test_register_entry_once() {
        let ledger = Ledger::new();
        let round = RoundId::random();
        let user = UserId::random();
        ledger.open_round(round);

        ledger
            .try_register_entry(round, user, entry_for(user, 0.002))
            .unwrap();
        assert_eq!(
            ledger.try_register_entry(round, user, entry_for(user, 0.002)),
            Err(LedgerError::AlreadyBet)
        );
        assert_eq!(ledger.open_entry_count(&round), 1);
    }

    #[test]
    fn test_register_without_open_round() {
        let ledger = Ledger::new();
        let user = UserId::random();
        assert_eq!(
            ledger.try_register_entry(RoundId::random(), user, entry_for(user, 0.002)),
            Err(LedgerError::UnknownRound)
        );
    }

    #[test]
    fn test_settle_win_then_already_settled() {
        let ledger = Ledger::new();
        let round = RoundId::random();
        let user = UserId::random();
        ledger.open_round(round);
        ledger
            .try_register_entry(round, user, entry_for(user, 0.002))
            .unwrap();

        let settled = ledger
            .try_settle_win(round, &user, 1.8, Utc::now())
            .unwrap();
        assert_eq!(settled.cashout_multiplier, Some(1.8));
        assert!((settled.cashout_amount.unwrap() - 0.0036).abs() < 1e-12);
        assert_eq!(settled.won, Some(true));

        assert_eq!(
            ledger.try_settle_win(round, &user, 2.0, Utc::now()),
            Err(LedgerError::AlreadySettled)
        );
    }

    #[test]
    fn test_settle_without_entry() {
        let ledger = Ledger::new();
        let round = RoundId::random();
        ledger.open_round(round);
        assert_eq!(
            ledger.try_settle_win(round, &UserId::random(), 1.5, Utc::now()),
            Err(LedgerError::NoOpenBet)
        );
    }

    #[test]
    fn test_close_round_marks_losses() {
        let ledger = Ledger::new();
        let round = RoundId::random();
        let winner = UserId::random();
        let loser = UserId::random();
        ledger.open_round(round);
        ledger
            .try_register_entry(round, winner, entry_for(winner, 0.002))
            .unwrap();
        ledger
            .try_register_entry(round, loser, entry_for(loser, 0.003))
            .unwrap();
        ledger.try_settle_win(round, &winner, 1.5, Utc::now()).unwrap();

        let entries = ledger.close_round(round);
        assert_eq!(entries.len(), 2);
        let won: Vec<bool> = entries.iter().map(|e| e.won.unwrap()).collect();
        assert!(won.contains(&true) && won.contains(&false));

        // Book is gone afterwards.
        assert_eq!(ledger.open_entry_count(&round), 0);
    }

    #[test]
    fn test_concurrent_double_bet_single_debit() {
        let ledger = Arc::new(Ledger::new());
        let round = RoundId::random();
        let user = UserId::random();
        ledger.open_round(round);
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        // Bet protocol: debit, register, roll the debit back on AlreadyBet.
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    if ledger.try_debit(user, Asset::Bitcoin, 0.4).is_err() {
                        return false;
                    }
                    match ledger.try_register_entry(round, user, entry_for(user, 0.4)) {
                        Ok(()) => true,
                        Err(_) => {
                            ledger.credit(user, Asset::Bitcoin, 0.4);
                            false
                        }
                    }
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|placed| *placed)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(ledger.open_entry_count(&round), 1);
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_stats_accumulate() {
        let ledger = Ledger::new();
        let user = UserId::random();

        ledger.record_wager(user, 100.0);
        ledger.record_win(user, 180.0);
        ledger.record_wager(user, 50.0);
        ledger.record_loss(user, 50.0);

        let record = ledger.snapshot_user(&user).unwrap();
        assert!((record.stats.total_wagered - 150.0).abs() < 1e-12);
        assert!((record.stats.total_won - 180.0).abs() < 1e-12);
        assert!((record.stats.total_lost - 50.0).abs() < 1e-12);
        assert_eq!(record.stats.rounds_played, 2);
    }
}
