//! Round Engine
//!
//! The authoritative state machine for one crash round at a time:
//!
//! ```text
//! (create) -> Waiting --accept window--> Active --m >= crash--> Crashed
//!                                          \--duration cap--> Completed
//! Crashed/Completed --cool-down--> (next Waiting round)
//! ```
//!
//! The engine is deterministic with respect to an injected clock: `tick`,
//! `place_bet` and `cash_out` all take the caller's `Instant`, and the owner
//! (see `service`) is responsible for calling them from a single task so the
//! crash check and every cashout share one serialization point. Events and
//! store writes are queued as data and drained by the owner; the engine never
//! blocks on a collaborator.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::fair::FairnessOracle;
use crate::game::asset::{Asset, Currency};
use crate::game::error::GameError;
use crate::game::events::GameEvent;
use crate::game::round::{
    BetEntry, HistorySample, Round, RoundId, RoundSnapshot, RoundStatus, UserId,
};
use crate::ledger::Ledger;
use crate::store::{StoreOp, TransactionRecord};

/// A bet as it reaches the engine: already converted to settlement units by
/// the external price collaborator, with the quoted original kept for audit.
#[derive(Debug, Clone)]
pub struct BetRequest {
    /// Stake in settlement-asset units.
    pub amount: f64,
    /// Asset debited and credited.
    pub asset: Asset,
    /// Wager as quoted to the player.
    pub wager_amount: f64,
    /// Quote currency.
    pub wager_currency: Currency,
    /// Asset price in the quote currency at bet time.
    pub exchange_rate: f64,
}

impl BetRequest {
    /// A wager staked directly in its settlement asset (no conversion).
    pub fn native(amount: f64, asset: Asset) -> Self {
        let currency = match asset {
            Asset::Bitcoin => Currency::Btc,
            Asset::Ethereum => Currency::Eth,
        };
        Self {
            amount,
            asset,
            wager_amount: amount,
            wager_currency: currency,
            exchange_rate: 1.0,
        }
    }

    fn validate(&self) -> Result<(), GameError> {
        let ok = self.amount.is_finite()
            && self.amount > 0.0
            && self.wager_amount.is_finite()
            && self.wager_amount > 0.0
            && self.exchange_rate.is_finite()
            && self.exchange_rate > 0.0;
        if ok {
            Ok(())
        } else {
            Err(GameError::InvalidAmount)
        }
    }
}

/// Acknowledgement for an accepted bet.
#[derive(Debug, Clone)]
pub struct BetReceipt {
    /// Round the bet entered.
    pub round_id: RoundId,
    /// Settlement amount debited.
    pub amount: f64,
    /// Asset debited.
    pub asset: Asset,
}

/// Acknowledgement for a paid cashout.
#[derive(Debug, Clone)]
pub struct CashoutReceipt {
    /// Round the entry belonged to.
    pub round_id: RoundId,
    /// Multiplier the entry settled at.
    pub multiplier: f64,
    /// Payout in quote-currency units.
    pub payout: f64,
    /// Payout credited, in settlement-asset units.
    pub settlement_payout: f64,
    /// Payout minus wager, in quote-currency units.
    pub profit: f64,
}

/// The round engine. One instance owns the single authoritative round.
pub struct RoundEngine {
    config: EngineConfig,
    oracle: FairnessOracle,
    ledger: Arc<Ledger>,
    round: Round,
    /// Waiting: when to activate. Terminal: when to start the next round.
    phase_deadline: Instant,
    /// Monotonic anchor of the active phase.
    active_since: Option<Instant>,
    pending_events: Vec<GameEvent>,
    pending_ops: Vec<StoreOp>,
}

impl RoundEngine {
    /// Create the engine and commit the first round.
    pub fn new(config: EngineConfig, ledger: Arc<Ledger>, now: Instant) -> Self {
        let mut oracle = FairnessOracle::new(config.house_edge);
        let commit = oracle.commit();
        let round = Round::new(commit, Utc::now());
        ledger.open_round(round.id);

        let mut engine = Self {
            phase_deadline: now + config.accept_window,
            config,
            oracle,
            ledger,
            round,
            active_since: None,
            pending_events: Vec::new(),
            pending_ops: Vec::new(),
        };
        engine.announce_round();
        engine
    }

    fn announce_round(&mut self) {
        info!(
            "round {} committed (hash {})",
            self.round.id, self.round.commit_hash
        );
        self.pending_events.push(GameEvent::RoundCommitted {
            round_id: self.round.id,
            commit_hash: self.round.commit_hash.clone(),
            start_time: self.round.created_at,
        });
        self.pending_ops
            .push(StoreOp::CreateRound(Box::new(self.round.clone())));
    }

    /// Advance the clock: phase transitions and multiplier updates.
    pub fn tick(&mut self, now: Instant) {
        match self.round.status {
            RoundStatus::Waiting => {
                if now >= self.phase_deadline {
                    self.activate(now);
                }
            }
            RoundStatus::Active => self.advance_multiplier(now),
            RoundStatus::Crashed | RoundStatus::Completed => {
                if now >= self.phase_deadline {
                    self.begin_next_round(now);
                }
            }
        }
    }

    fn activate(&mut self, now: Instant) {
        self.round.status = RoundStatus::Active;
        self.round.started_at = Some(Utc::now());
        self.active_since = Some(now);
        info!("round {} started", self.round.id);
        self.pending_events.push(GameEvent::RoundStarted {
            round_id: self.round.id,
        });
        self.pending_ops
            .push(StoreOp::UpdateRound(Box::new(self.round.clone())));
    }

    fn advance_multiplier(&mut self, now: Instant) {
        let Some(since) = self.active_since else {
            return;
        };
        let elapsed = now.duration_since(since);
        let multiplier = self.config.multiplier_at(elapsed);

        if multiplier >= self.round.crash_point {
            let crash_point = self.round.crash_point;
            self.terminate(RoundStatus::Crashed, crash_point, now);
            return;
        }
        if elapsed >= self.config.max_round_duration {
            self.terminate(RoundStatus::Completed, multiplier, now);
            return;
        }

        self.round.current_multiplier = multiplier;
        let sample = HistorySample {
            timestamp: Utc::now(),
            multiplier,
            active_entries: self.round.open_entry_count(),
        };
        self.round.history.push(sample);
        self.pending_events.push(GameEvent::MultiplierUpdate {
            round_id: self.round.id,
            multiplier,
            open_entry_count: self.round.open_entry_count(),
        });
    }

    /// Settle the round and schedule the cool-down.
    ///
    /// All still-open entries become losses; the server seed is revealed.
    fn terminate(&mut self, status: RoundStatus, final_multiplier: f64, now: Instant) {
        self.round.status = status;
        self.round.current_multiplier = final_multiplier;
        self.round.ended_at = Some(Utc::now());

        let entries = self.ledger.close_round(self.round.id);
        let losses = entries.iter().filter(|e| e.won == Some(false)).count();
        for entry in entries {
            if entry.won == Some(false) {
                self.ledger.record_loss(entry.user_id, entry.wager_amount);
                self.pending_ops
                    .push(StoreOp::AppendTransaction(TransactionRecord::loss(
                        entry.user_id,
                        self.round.id,
                        entry.wager_amount,
                        entry.wager_currency,
                        entry.settlement_amount,
                        entry.settlement_asset,
                        entry.exchange_rate_at_bet,
                        final_multiplier,
                        Utc::now(),
                    )));
                if let Some(record) = self.ledger.snapshot_user(&entry.user_id) {
                    self.pending_ops.push(StoreOp::UpdateUser(record));
                }
            }
            self.round.entries.insert(entry.user_id, entry);
        }

        match status {
            RoundStatus::Crashed => {
                info!(
                    "round {} crashed at {:.4} ({} losing entries)",
                    self.round.id, final_multiplier, losses
                );
                self.pending_events.push(GameEvent::RoundCrashed {
                    round_id: self.round.id,
                    crash_point: self.round.crash_point,
                    server_seed: self.round.server_seed.clone(),
                });
            }
            RoundStatus::Completed => {
                warn!(
                    "round {} hit the duration cap at {:.4}",
                    self.round.id, final_multiplier
                );
                self.pending_events.push(GameEvent::RoundCompleted {
                    round_id: self.round.id,
                    final_multiplier,
                    server_seed: self.round.server_seed.clone(),
                });
            }
            _ => unreachable!("terminate called with non-terminal status"),
        }

        self.pending_ops
            .push(StoreOp::UpdateRound(Box::new(self.round.clone())));
        self.phase_deadline = now + self.config.cooldown;
        self.active_since = None;
    }

    fn begin_next_round(&mut self, now: Instant) {
        let commit = self.oracle.commit();
        self.round = Round::new(commit, Utc::now());
        self.ledger.open_round(self.round.id);
        self.phase_deadline = now + self.config.accept_window;
        self.active_since = None;
        self.announce_round();
    }

    /// Place a bet. Valid only while the round is `Waiting`.
    ///
    /// Debits first, registers second; a registration failure rolls the debit
    /// back so conservation holds.
    pub fn place_bet(&mut self, user_id: UserId, req: BetRequest) -> Result<BetReceipt, GameError> {
        req.validate()?;

        if self.round.status != RoundStatus::Waiting {
            return Err(GameError::RoundNotAcceptingBets);
        }

        self.ledger.try_debit(user_id, req.asset, req.amount)?;

        let entry = BetEntry::new(
            user_id,
            req.wager_amount,
            req.wager_currency,
            req.asset,
            req.amount,
            req.exchange_rate,
            Utc::now(),
        );
        if let Err(err) = self
            .ledger
            .try_register_entry(self.round.id, user_id, entry.clone())
        {
            self.ledger.credit(user_id, req.asset, req.amount);
            return Err(err.into());
        }

        self.ledger.record_wager(user_id, req.wager_amount);
        self.round.total_bets += 1;
        self.round.total_wagered += req.wager_amount;
        self.round.entries.insert(user_id, entry);

        debug!(
            "bet accepted: user {} staked {} {} in round {}",
            user_id, req.amount, req.asset, self.round.id
        );
        self.pending_events.push(GameEvent::PlayerBet {
            round_id: self.round.id,
            user_id,
            amount: req.wager_amount,
            currency: req.wager_currency,
            total_bets: self.round.total_bets,
        });
        self.pending_ops
            .push(StoreOp::AppendTransaction(TransactionRecord::bet(
                user_id,
                self.round.id,
                req.wager_amount,
                req.wager_currency,
                req.amount,
                req.asset,
                req.exchange_rate,
                Utc::now(),
            )));
        self.pending_ops
            .push(StoreOp::UpdateRound(Box::new(self.round.clone())));
        if let Some(record) = self.ledger.snapshot_user(&user_id) {
            self.pending_ops.push(StoreOp::UpdateUser(record));
        }

        Ok(BetReceipt {
            round_id: self.round.id,
            amount: req.amount,
            asset: req.asset,
        })
    }

    /// Cash out at the multiplier of this serialization point.
    ///
    /// If the multiplier has already reached the crash point, the crash
    /// transition runs here and the cashout loses the race.
    pub fn cash_out(&mut self, user_id: UserId, now: Instant) -> Result<CashoutReceipt, GameError> {
        if self.round.status != RoundStatus::Active {
            return Err(GameError::NoActiveRound);
        }
        let Some(since) = self.active_since else {
            return Err(GameError::NoActiveRound);
        };

        let elapsed = now.duration_since(since);
        let multiplier = self.config.multiplier_at(elapsed);

        if multiplier >= self.round.crash_point {
            let crash_point = self.round.crash_point;
            self.terminate(RoundStatus::Crashed, crash_point, now);
            return Err(GameError::CrashAlreadyOccurred);
        }
        if elapsed >= self.config.max_round_duration {
            self.terminate(RoundStatus::Completed, multiplier, now);
            return Err(GameError::NoActiveRound);
        }

        let settled = self
            .ledger
            .try_settle_win(self.round.id, &user_id, multiplier, Utc::now())?;

        let settlement_payout = settled.settlement_amount * multiplier;
        self.ledger
            .credit(user_id, settled.settlement_asset, settlement_payout);

        let payout = settled.wager_amount * multiplier;
        let profit = payout - settled.wager_amount;
        self.ledger.record_win(user_id, payout);
        self.round.entries.insert(user_id, settled.clone());

        debug!(
            "cashout: user {} at {:.4}x for {} {} in round {}",
            user_id, multiplier, settlement_payout, settled.settlement_asset, self.round.id
        );
        self.pending_events.push(GameEvent::PlayerCashout {
            round_id: self.round.id,
            user_id,
            multiplier,
            payout,
            profit,
        });
        self.pending_ops
            .push(StoreOp::AppendTransaction(TransactionRecord::cashout(
                user_id,
                self.round.id,
                payout,
                settled.wager_currency,
                settlement_payout,
                settled.settlement_asset,
                settled.exchange_rate_at_bet,
                multiplier,
                Utc::now(),
            )));
        self.pending_ops
            .push(StoreOp::UpdateRound(Box::new(self.round.clone())));
        if let Some(record) = self.ledger.snapshot_user(&user_id) {
            self.pending_ops.push(StoreOp::UpdateUser(record));
        }

        Ok(CashoutReceipt {
            round_id: self.round.id,
            multiplier,
            payout,
            settlement_payout,
            profit,
        })
    }

    /// Client-visible state of the current round. Never mutates.
    pub fn snapshot(&self) -> RoundSnapshot {
        self.round.snapshot()
    }

    /// The current round record.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Answer a fairness verification request against this engine's edge.
    pub fn verify(&self, req: &crate::fair::VerifyRequest) -> crate::fair::VerifyResponse {
        crate::fair::verify_request(req, self.oracle.house_edge())
    }

    /// Drain events queued since the last drain.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Drain store operations queued since the last drain.
    pub fn take_store_ops(&mut self) -> Vec<StoreOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Replace the current round with one built from a fixed commitment.
    #[cfg(test)]
    pub(crate) fn force_round(&mut self, commit: crate::fair::RoundCommit, now: Instant) {
        self.ledger.close_round(self.round.id);
        self.pending_events.clear();
        self.pending_ops.clear();
        self.round = Round::new(commit, Utc::now());
        self.ledger.open_round(self.round.id);
        self.phase_deadline = now + self.config.accept_window;
        self.active_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::RoundCommit;
    use crate::store::TransactionKind;
    use std::time::Duration;

    const CRASH_POINT: f64 = 2.105;

    fn rigged_commit(crash_point: f64) -> RoundCommit {
        RoundCommit {
            server_seed: "ab".repeat(32),
            client_seed: "cd".repeat(16),
            nonce: 0,
            commit_hash: "ef".repeat(32),
            crash_point,
        }
    }

    fn engine_with_crash(crash_point: f64) -> (RoundEngine, Arc<Ledger>, Instant) {
        let config = EngineConfig::default();
        let ledger = Arc::new(Ledger::new());
        let t0 = Instant::now();
        let mut engine = RoundEngine::new(config, ledger.clone(), t0);
        engine.force_round(rigged_commit(crash_point), t0);
        (engine, ledger, t0)
    }

    fn usd_bet(amount: f64) -> BetRequest {
        // 100 USD at 50k USD/BTC -> 0.002 BTC staked.
        BetRequest {
            amount: amount / 50_000.0,
            asset: Asset::Bitcoin,
            wager_amount: amount,
            wager_currency: Currency::Usd,
            exchange_rate: 50_000.0,
        }
    }

    /// Active-phase instant at which the multiplier reaches `target`.
    fn instant_for_multiplier(t0: Instant, config: &EngineConfig, target: f64) -> Instant {
        let secs = target.ln() / config.growth_rate;
        t0 + config.accept_window + Duration::from_secs_f64(secs)
    }

    fn activate(engine: &mut RoundEngine, t0: Instant) {
        engine.tick(t0 + engine.config.accept_window);
        assert_eq!(engine.round().status, RoundStatus::Active);
    }

    #[test]
    fn test_bet_then_cashout_scenario() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        engine.place_bet(user, usd_bet(100.0)).unwrap();
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.998).abs() < 1e-12);

        activate(&mut engine, t0);

        let at = instant_for_multiplier(t0, &engine.config, 1.8);
        let receipt = engine.cash_out(user, at).unwrap();

        assert!((receipt.multiplier - 1.8).abs() < 1e-6);
        assert!((receipt.payout - 180.0).abs() < 1e-3);
        assert!((receipt.profit - 80.0).abs() < 1e-3);

        // 0.998 + 0.002 * 1.8
        assert!((ledger.balance(&user, Asset::Bitcoin) - 1.0016).abs() < 1e-6);

        let events = engine.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::PlayerCashout { .. })));
    }

    #[test]
    fn test_uncashed_entry_loses_on_crash() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        engine.place_bet(user, usd_bet(100.0)).unwrap();
        activate(&mut engine, t0);
        engine.take_store_ops();

        engine.tick(instant_for_multiplier(t0, &engine.config, 2.2));

        let round = engine.round();
        assert_eq!(round.status, RoundStatus::Crashed);
        assert_eq!(round.current_multiplier, CRASH_POINT);
        assert_eq!(round.entries[&user].won, Some(false));

        // Only the bet debit; no further deduction on loss.
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.998).abs() < 1e-12);

        let ops = engine.take_store_ops();
        assert!(ops.iter().any(|op| matches!(
            op,
            StoreOp::AppendTransaction(r) if r.kind == TransactionKind::Loss
                && (r.amount - 100.0).abs() < 1e-9
        )));

        let events = engine.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::RoundCrashed { crash_point, .. } if *crash_point == CRASH_POINT
        )));
    }

    #[test]
    fn test_non_positive_bet_rejected() {
        let (mut engine, ledger, _t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        for amount in [0.0, -10.0, f64::NAN] {
            let err = engine.place_bet(user, usd_bet(amount)).unwrap_err();
            assert_eq!(err, GameError::InvalidAmount);
        }

        assert!((ledger.balance(&user, Asset::Bitcoin) - 1.0).abs() < 1e-12);
        assert_eq!(engine.round().entries.len(), 0);
    }

    #[test]
    fn test_double_bet_single_debit() {
        let (mut engine, ledger, _t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        engine.place_bet(user, usd_bet(100.0)).unwrap();
        let err = engine.place_bet(user, usd_bet(100.0)).unwrap_err();
        assert_eq!(err, GameError::AlreadyBet);

        // Rollback leaves exactly one debit.
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.998).abs() < 1e-12);
        assert_eq!(engine.round().total_bets, 1);
    }

    #[test]
    fn test_insufficient_balance() {
        let (mut engine, ledger, _t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 0.001);

        let err = engine.place_bet(user, usd_bet(100.0)).unwrap_err();
        assert_eq!(err, GameError::InsufficientBalance);
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_bet_rejected_while_active() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);

        activate(&mut engine, t0);
        let err = engine.place_bet(user, usd_bet(100.0)).unwrap_err();
        assert_eq!(err, GameError::RoundNotAcceptingBets);
    }

    #[test]
    fn test_cashout_rejected_while_waiting() {
        let (mut engine, _ledger, t0) = engine_with_crash(CRASH_POINT);
        let err = engine.cash_out(UserId::random(), t0).unwrap_err();
        assert_eq!(err, GameError::NoActiveRound);
    }

    #[test]
    fn test_cashout_without_bet() {
        let (mut engine, _ledger, t0) = engine_with_crash(CRASH_POINT);
        activate(&mut engine, t0);

        let at = instant_for_multiplier(t0, &engine.config, 1.5);
        let err = engine.cash_out(UserId::random(), at).unwrap_err();
        assert_eq!(err, GameError::NoOpenBet);
    }

    #[test]
    fn test_cashout_twice_already_settled() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);
        engine.place_bet(user, usd_bet(100.0)).unwrap();
        activate(&mut engine, t0);

        let at = instant_for_multiplier(t0, &engine.config, 1.5);
        engine.cash_out(user, at).unwrap();
        let err = engine.cash_out(user, at).unwrap_err();
        assert_eq!(err, GameError::AlreadySettled);
    }

    #[test]
    fn test_cashout_racing_crash_never_pays() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);
        engine.place_bet(user, usd_bet(100.0)).unwrap();
        activate(&mut engine, t0);

        // No tick has observed the crash yet; the cashout arrives after the
        // crash instant and must lose the race at the serialization point.
        let at = instant_for_multiplier(t0, &engine.config, 2.2);
        let err = engine.cash_out(user, at).unwrap_err();
        assert_eq!(err, GameError::CrashAlreadyOccurred);

        let round = engine.round();
        assert_eq!(round.status, RoundStatus::Crashed);
        assert_eq!(round.entries[&user].won, Some(false));
        assert!((ledger.balance(&user, Asset::Bitcoin) - 0.998).abs() < 1e-12);
    }

    #[test]
    fn test_cashout_after_crash_transition() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);
        engine.place_bet(user, usd_bet(100.0)).unwrap();
        activate(&mut engine, t0);

        let crash_at = instant_for_multiplier(t0, &engine.config, 2.2);
        engine.tick(crash_at);
        assert_eq!(engine.round().status, RoundStatus::Crashed);

        let err = engine.cash_out(user, crash_at).unwrap_err();
        assert_eq!(err, GameError::NoActiveRound);
    }

    #[test]
    fn test_duration_cap_completes_round() {
        // Unreachable crash point: the defensive bound must fire.
        let (mut engine, _ledger, t0) = engine_with_crash(f64::INFINITY);
        activate(&mut engine, t0);

        engine.tick(t0 + engine.config.accept_window + engine.config.max_round_duration);

        assert_eq!(engine.round().status, RoundStatus::Completed);
        let events = engine.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::RoundCompleted { .. })));
    }

    #[test]
    fn test_multiplier_updates_and_history() {
        let (mut engine, _ledger, t0) = engine_with_crash(CRASH_POINT);
        activate(&mut engine, t0);
        engine.take_events();

        let at = instant_for_multiplier(t0, &engine.config, 1.2);
        engine.tick(at);

        let round = engine.round();
        assert!((round.current_multiplier - 1.2).abs() < 1e-6);
        assert_eq!(round.history.len(), 1);

        let events = engine.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::MultiplierUpdate { multiplier, .. } if (*multiplier - 1.2).abs() < 1e-6
        )));
    }

    #[test]
    fn test_cooldown_starts_fresh_round() {
        let (mut engine, _ledger, t0) = engine_with_crash(CRASH_POINT);
        activate(&mut engine, t0);

        let crash_at = instant_for_multiplier(t0, &engine.config, 2.2);
        engine.tick(crash_at);
        let old_id = engine.round().id;
        let old_hash = engine.round().commit_hash.clone();
        engine.take_events();

        // Cool-down not yet elapsed: still terminal.
        engine.tick(crash_at + engine.config.cooldown / 2);
        assert_eq!(engine.round().status, RoundStatus::Crashed);

        engine.tick(crash_at + engine.config.cooldown);
        let round = engine.round();
        assert_eq!(round.status, RoundStatus::Waiting);
        assert_ne!(round.id, old_id);
        assert_ne!(round.commit_hash, old_hash);
        assert_eq!(round.current_multiplier, 1.0);
        assert!(round.entries.is_empty());

        let events = engine.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::RoundCommitted { .. })));
    }

    #[test]
    fn test_snapshot_reflects_round() {
        let (mut engine, ledger, _t0) = engine_with_crash(CRASH_POINT);
        let user = UserId::random();
        ledger.deposit(user, Asset::Bitcoin, 1.0);
        engine.place_bet(user, usd_bet(100.0)).unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.status, RoundStatus::Waiting);
        assert_eq!(snap.open_entry_count, 1);
        assert_eq!(snap.total_bets, 1);
        assert!((snap.total_wagered - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_conservation_over_full_round() {
        let (mut engine, ledger, t0) = engine_with_crash(CRASH_POINT);
        let winner = UserId::random();
        let loser = UserId::random();
        ledger.deposit(winner, Asset::Bitcoin, 1.0);
        ledger.deposit(loser, Asset::Bitcoin, 1.0);

        engine.place_bet(winner, usd_bet(100.0)).unwrap();
        engine.place_bet(loser, usd_bet(100.0)).unwrap();
        activate(&mut engine, t0);

        let at = instant_for_multiplier(t0, &engine.config, 1.5);
        let receipt = engine.cash_out(winner, at).unwrap();
        engine.tick(instant_for_multiplier(t0, &engine.config, 2.2));

        // winner: 1.0 - stake + stake * m; loser: 1.0 - stake.
        let expected_winner = 1.0 - 0.002 + receipt.settlement_payout;
        assert!((ledger.balance(&winner, Asset::Bitcoin) - expected_winner).abs() < 1e-9);
        assert!((ledger.balance(&loser, Asset::Bitcoin) - 0.998).abs() < 1e-12);
    }
}
