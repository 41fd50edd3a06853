//! Market ledger: share inventory, per-user positions, the append-only
//! trade log, and lifecycle state (resolution, reminders).
//!
//! This module is the sole mutator of a market's `bought_shares`,
//! `is_resolved` and `resolution`. Each market's state sits behind its
//! own mutex, so trades on one market serialize while independent
//! markets proceed in parallel.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::lmsr::{self, Side};

/// Final outcome of a resolved market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Yes,
    No,
    /// Voided market; outcome never determined.
    Na,
}

/// One applied trade. Append-only; never rewritten.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub user_id: String,
    pub side: Side,
    pub shares_delta: f64,
    pub cash_delta: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Mutable state of one market, guarded by its mutex in [`MarketLedger`].
#[derive(Debug)]
pub struct MarketState {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub liquidity: f64,
    /// [yes_inventory, no_inventory]
    pub bought_shares: [f64; 2],
    pub is_resolved: bool,
    pub resolution: Option<Resolution>,
    pub remind_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    positions: HashMap<String, [f64; 2]>,
    trades: Vec<TradeRecord>,
}

impl MarketState {
    /// Current holdings for one user, [yes, no]. Zero if never traded.
    pub fn position(&self, user_id: &str) -> [f64; 2] {
        self.positions.get(user_id).copied().unwrap_or([0.0, 0.0])
    }

    pub fn positions(&self) -> &HashMap<String, [f64; 2]> {
        &self.positions
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Commit one validated trade: inventory, position and log move together.
    pub fn record_trade(
        &mut self,
        user_id: &str,
        side: Side,
        shares_delta: f64,
        cash_delta: Decimal,
        executed_at: DateTime<Utc>,
    ) {
        self.bought_shares[side.index()] += shares_delta;
        let position = self
            .positions
            .entry(user_id.to_string())
            .or_insert([0.0, 0.0]);
        position[side.index()] += shares_delta;
        self.trades.push(TradeRecord {
            user_id: user_id.to_string(),
            side,
            shares_delta,
            cash_delta,
            executed_at,
        });
    }

    /// Net signed cash flow per user on this market, folded from the log.
    pub fn balance_changes(&self) -> HashMap<String, Decimal> {
        self.trades.iter().fold(HashMap::new(), |mut acc, trade| {
            *acc.entry(trade.user_id.clone()).or_insert(Decimal::ZERO) += trade.cash_delta;
            acc
        })
    }

    /// Read-only view with `prob`/`cost_func` recomputed from the live
    /// inventory; derived values are never cached.
    pub fn snapshot(&self) -> MarketSnapshot {
        let info = lmsr::price(self.bought_shares, self.liquidity);
        MarketSnapshot {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            owner_id: self.owner_id.clone(),
            liquidity: self.liquidity,
            bought_shares: self.bought_shares,
            prob: info.probs,
            cost_func: info.cost_func,
            is_resolved: self.is_resolved,
            resolution: self.resolution,
            remind_at: self.remind_at.map(|at| at.timestamp()),
            created_at: self.created_at.timestamp(),
        }
    }
}

/// Snapshot returned by the engine API.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub liquidity: f64,
    pub bought_shares: [f64; 2],
    pub prob: [f64; 2],
    pub cost_func: f64,
    pub is_resolved: bool,
    pub resolution: Option<Resolution>,
    pub remind_at: Option<i64>,
    pub created_at: i64,
}

/// Owns every market record and assigns fresh ids.
pub struct MarketLedger {
    markets: DashMap<i64, Arc<Mutex<MarketState>>>,
    next_id: AtomicI64,
    reminder_period: Duration,
}

impl MarketLedger {
    pub fn new(reminder_period: Duration) -> Self {
        assert!(
            reminder_period > Duration::zero(),
            "reminder period must be positive"
        );
        Self {
            markets: DashMap::new(),
            next_id: AtomicI64::new(1),
            reminder_period,
        }
    }

    /// Insert a fully validated market and return its fresh id.
    pub fn insert(
        &self,
        title: String,
        description: String,
        owner_id: String,
        liquidity: f64,
        remind_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = MarketState {
            id,
            title,
            description,
            owner_id,
            liquidity,
            bought_shares: [0.0, 0.0],
            is_resolved: false,
            resolution: None,
            remind_at,
            created_at,
            positions: HashMap::new(),
            trades: Vec::new(),
        };
        info!(market_id = id, liquidity, "market created");
        self.markets.insert(id, Arc::new(Mutex::new(state)));
        id
    }

    /// Handle to one market's lock; cloning the Arc drops the map guard
    /// so no shard lock is held while the market mutex is taken.
    pub fn handle(&self, market_id: i64) -> EngineResult<Arc<Mutex<MarketState>>> {
        self.markets
            .get(&market_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::InvalidMarket(market_id))
    }

    /// Run `f` with exclusive access to one market's state.
    pub fn with_market<T>(
        &self,
        market_id: i64,
        f: impl FnOnce(&mut MarketState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let handle = self.handle(market_id)?;
        let mut state = handle.lock().expect("market lock poisoned");
        f(&mut state)
    }

    /// Set (or overwrite) the resolution. Re-resolution is permitted.
    pub fn resolve(&self, market_id: i64, outcome: Resolution) -> EngineResult<MarketSnapshot> {
        self.with_market(market_id, |market| {
            market.is_resolved = true;
            market.resolution = Some(outcome);
            info!(market_id, outcome = ?outcome, "market resolved");
            Ok(market.snapshot())
        })
    }

    /// Reopen a resolved market. The last resolution value is kept for audit.
    pub fn unresolve(&self, market_id: i64) -> EngineResult<MarketSnapshot> {
        self.with_market(market_id, |market| {
            market.is_resolved = false;
            info!(market_id, "market unresolved");
            Ok(market.snapshot())
        })
    }

    /// Ids of unresolved markets whose reminder is due at `now`.
    ///
    /// Each returned market's `remind_at` is advanced by whole periods
    /// until it is strictly in the future, so an immediate second poll
    /// returns nothing and a backlog of missed ticks collapses into a
    /// single reminder.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Vec<i64> {
        let mut due = Vec::new();
        for entry in self.markets.iter() {
            let mut market = entry.value().lock().expect("market lock poisoned");
            if market.is_resolved {
                continue;
            }
            let Some(mut at) = market.remind_at else {
                continue;
            };
            if at > now {
                continue;
            }
            while at <= now {
                at += self.reminder_period;
            }
            market.remind_at = Some(at);
            info!(market_id = market.id, next_remind_at = %at, "reminder due");
            due.push(market.id);
        }
        due.sort_unstable();
        due
    }
}
