//! Crash Game Server
//!
//! Runs the round engine against an in-memory store with a few simulated
//! players, logging the event stream. Transport, auth and durable storage
//! are external collaborators; this binary demonstrates the engine itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crash_game::game::RoundId;
use crash_game::{
    Asset, BetRequest, EngineConfig, EngineHandle, GameError, GameEvent, Ledger, MemoryStore,
    RoundService, RoundStatus, UserId, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    info!("Crash Server v{}", VERSION);
    info!(
        "accept window {:?}, tick {:?}, growth rate {}, house edge {}",
        config.accept_window, config.tick_interval, config.growth_rate, config.house_edge
    );

    let ledger = Arc::new(Ledger::new());
    let store = Arc::new(MemoryStore::new());

    // Seed demo balances.
    let players: Vec<UserId> = (0..3).map(|_| UserId::random()).collect();
    for user in &players {
        ledger.deposit(*user, Asset::Bitcoin, 1.0);
        ledger.deposit(*user, Asset::Ethereum, 10.0);
        info!("seeded player {} with 1 BTC / 10 ETH", user);
    }

    let service = RoundService::spawn(config, ledger.clone(), store.clone());

    // Log every event the engine broadcasts.
    let mut events = service.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event logger lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Simulated players with different cashout appetites.
    for (index, user) in players.iter().enumerate() {
        let handle = service.handle();
        let user = *user;
        tokio::spawn(async move {
            simulate_player(handle, user, 1.2 + 0.35 * index as f64).await;
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    service.shutdown_and_wait().await;
    info!(
        "persisted {} rounds, {} transactions",
        store.round_count(),
        store.transaction_count()
    );
    Ok(())
}

fn log_event(event: &GameEvent) {
    match event {
        GameEvent::RoundCommitted {
            round_id,
            commit_hash,
            ..
        } => info!("round {} committed, hash {}", round_id, &commit_hash[..16]),
        GameEvent::RoundStarted { round_id } => info!("round {} started", round_id),
        GameEvent::MultiplierUpdate { multiplier, .. } => {
            // Log only near each 0.1x step to keep output readable.
            if (multiplier * 10.0).fract() < 0.06 {
                info!("multiplier {:.2}x", multiplier);
            }
        }
        GameEvent::PlayerBet {
            user_id,
            amount,
            currency,
            total_bets,
            ..
        } => info!(
            "player {} bet {} {} ({} bets)",
            user_id, amount, currency, total_bets
        ),
        GameEvent::PlayerCashout {
            user_id,
            multiplier,
            profit,
            ..
        } => info!(
            "player {} cashed out at {:.2}x, profit {:.4}",
            user_id, multiplier, profit
        ),
        GameEvent::RoundCrashed {
            round_id,
            crash_point,
            server_seed,
        } => info!(
            "round {} crashed at {:.2}x, seed {}...",
            round_id,
            crash_point,
            &server_seed[..8]
        ),
        GameEvent::RoundCompleted {
            round_id,
            final_multiplier,
            ..
        } => info!(
            "round {} hit the duration cap at {:.2}x",
            round_id, final_multiplier
        ),
    }
}

/// Poll the engine and play every round: bet while waiting, cash out once the
/// multiplier reaches `target`.
async fn simulate_player(handle: EngineHandle, user: UserId, target: f64) {
    let mut bet_round: Option<RoundId> = None;

    loop {
        let snap = match handle.get_state().await {
            Ok(snap) => snap,
            Err(GameError::EngineClosed) => break,
            Err(_) => continue,
        };

        match snap.status {
            RoundStatus::Waiting if bet_round != Some(snap.id) => {
                match handle
                    .place_bet(user, BetRequest::native(0.01, Asset::Bitcoin))
                    .await
                {
                    Ok(receipt) => bet_round = Some(receipt.round_id),
                    Err(GameError::AlreadyBet) => bet_round = Some(snap.id),
                    Err(GameError::EngineClosed) => break,
                    Err(err) => warn!("player {} bet rejected: {}", user, err),
                }
            }
            RoundStatus::Active
                if bet_round == Some(snap.id) && snap.current_multiplier >= target =>
            {
                match handle.cash_out(user).await {
                    Err(GameError::EngineClosed) => break,
                    // Lost the race to the crash, or already settled: move on.
                    _ => bet_round = None,
                }
            }
            _ => {}
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
