//! The engine facade: pricing, market ledger and account ledger composed
//! into the atomic operations the presentation layer calls.
//!
//! Every operation validates first and mutates second, so a rejected
//! request leaves no partial state behind. Lock order is always
//! market, then account; nothing awaits while a lock is held.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use crate::account::{to_cash, Account, AccountLedger};
use crate::config::MarketConfig;
use crate::error::{EngineError, EngineResult};
use crate::lmsr::{self, Side};
use crate::market::{MarketLedger, MarketSnapshot, Resolution};

/// Direction of a quoted trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Parameters for market creation, validated by [`Engine::create_market`].
#[derive(Debug, Clone)]
pub struct NewMarket {
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub liquidity: f64,
    pub remind_at: Option<DateTime<Utc>>,
}

pub struct Engine {
    markets: MarketLedger,
    accounts: AccountLedger,
    config: MarketConfig,
}

impl Engine {
    pub fn new(config: MarketConfig) -> Self {
        let period_secs = (config.reminder_period_hours * 3600.0).round().max(1.0) as i64;
        Self {
            markets: MarketLedger::new(Duration::seconds(period_secs)),
            accounts: AccountLedger::new(config.starting_balance),
            config,
        }
    }

    /// Idempotent account creation with the configured starting grant.
    pub fn create_user(&self, user_id: &str) -> EngineResult<Account> {
        if user_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("user id must not be empty".to_string()));
        }
        Ok(self.accounts.get_or_create(user_id))
    }

    pub fn get_user(&self, user_id: &str) -> EngineResult<Account> {
        self.accounts.get(user_id)
    }

    /// Create a market, funding the maker subsidy from the owner's balance.
    pub fn create_market(&self, req: NewMarket, now: DateTime<Utc>) -> EngineResult<MarketSnapshot> {
        if req.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty".to_string()));
        }
        if !req.liquidity.is_finite() || req.liquidity < self.config.min_liquidity {
            return Err(EngineError::InvalidInput(format!(
                "liquidity must be at least {}",
                self.config.min_liquidity
            )));
        }
        if let Some(remind_at) = req.remind_at {
            if remind_at <= now {
                return Err(EngineError::InvalidInput(
                    "reminder date must be in the future".to_string(),
                ));
            }
        }

        self.accounts.get_or_create(&req.owner_id);
        let subsidy = to_cash(req.liquidity)?;
        self.accounts.apply(&req.owner_id, -subsidy)?;

        let market_id = self.markets.insert(
            req.title,
            req.description,
            req.owner_id,
            req.liquidity,
            req.remind_at,
            now,
        );
        self.markets.with_market(market_id, |market| Ok(market.snapshot()))
    }

    pub fn get_market(&self, market_id: i64) -> EngineResult<MarketSnapshot> {
        self.markets.with_market(market_id, |market| Ok(market.snapshot()))
    }

    pub fn get_positions(&self, market_id: i64) -> EngineResult<HashMap<String, [f64; 2]>> {
        self.markets
            .with_market(market_id, |market| Ok(market.positions().clone()))
    }

    /// Aggregated signed cash flow per user on one market.
    pub fn balance_changes(&self, market_id: i64) -> EngineResult<HashMap<String, Decimal>> {
        self.markets
            .with_market(market_id, |market| Ok(market.balance_changes()))
    }

    /// Cost preview for the trade dialog; touches no state.
    pub fn trade_quote(
        &self,
        market_id: i64,
        shares_amount: f64,
        side: Side,
        action: TradeAction,
    ) -> EngineResult<Decimal> {
        if !shares_amount.is_finite() || shares_amount < 0.0 {
            return Err(EngineError::InvalidInput(
                "shares amount must be a non-negative number".to_string(),
            ));
        }
        self.markets.with_market(market_id, |market| {
            let cash = match action {
                TradeAction::Buy => {
                    lmsr::buy_cost(market.bought_shares, market.liquidity, shares_amount, side)
                }
                TradeAction::Sell => {
                    lmsr::sell_payoff(market.bought_shares, market.liquidity, shares_amount, side)
                }
            };
            to_cash(cash)
        })
    }

    /// Apply a trade: positive `shares_amount` buys, negative sells.
    ///
    /// Inventory, the user's position, the trade log and the balance
    /// move as one unit; any rejection leaves all four untouched.
    pub fn create_trade(
        &self,
        market_id: i64,
        user_id: &str,
        shares_amount: f64,
        side: Side,
    ) -> EngineResult<MarketSnapshot> {
        if !shares_amount.is_finite() || shares_amount == 0.0 {
            return Err(EngineError::InvalidInput(
                "shares amount must be a non-zero number".to_string(),
            ));
        }
        self.accounts.get_or_create(user_id);

        let handle = self.markets.handle(market_id)?;
        let mut market = handle.lock().expect("market lock poisoned");
        if market.is_resolved {
            return Err(EngineError::MarketResolved(market_id));
        }
        if shares_amount < 0.0 {
            let held = market.position(user_id)[side.index()];
            let requested = -shares_amount;
            if held < requested {
                return Err(EngineError::InsufficientShares { held, requested });
            }
        }

        // the user's cash moves opposite to the cost function
        let cash_delta = to_cash(-lmsr::cost_delta(
            market.bought_shares,
            market.liquidity,
            shares_amount,
            side,
        ))?;
        self.accounts.apply(user_id, cash_delta)?;
        let executed_at = Utc::now();
        market.record_trade(user_id, side, shares_amount, cash_delta, executed_at);
        info!(
            market_id,
            user_id,
            side = side.as_str(),
            shares = shares_amount,
            cash = %cash_delta,
            "trade applied"
        );
        Ok(market.snapshot())
    }

    pub fn resolve_market(&self, market_id: i64, outcome: Resolution) -> EngineResult<MarketSnapshot> {
        self.markets.resolve(market_id, outcome)
    }

    pub fn unresolve_market(&self, market_id: i64) -> EngineResult<MarketSnapshot> {
        self.markets.unresolve(market_id)
    }

    /// Unresolved markets due for a reminder; advances their schedules.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Vec<i64> {
        self.markets.due_reminders(now)
    }
}
