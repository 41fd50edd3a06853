//! Account ledger: virtual-credit balances per platform user.
//!
//! Balances are exact decimals quantized to micro-credits; the f64 LMSR
//! math is converted through [`to_cash`] before it ever touches a balance.
//! Accounts are created lazily on first interaction with a one-time grant.

use dashmap::DashMap;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Cash amounts carry at most this many decimal places (micro-credits).
pub const CASH_DP: u32 = 6;

/// Quantize an LMSR cash figure to an exact micro-credit amount.
///
/// Non-finite input means the requested trade pushed the cost function
/// past what f64 can represent, which is rejected rather than rounded.
pub fn to_cash(value: f64) -> EngineResult<Decimal> {
    if !value.is_finite() {
        return Err(EngineError::InvalidInput(
            "amount too large for this market".to_string(),
        ));
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(CASH_DP))
        .ok_or_else(|| EngineError::InvalidInput("cash amount out of range".to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub balance: Decimal,
}

/// Owns every user balance. Mutations for one user serialize on that
/// user's mutex, even when they originate from different markets.
pub struct AccountLedger {
    accounts: DashMap<String, Arc<Mutex<Account>>>,
    starting_balance: Decimal,
}

impl AccountLedger {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            accounts: DashMap::new(),
            starting_balance,
        }
    }

    /// Idempotent create; the starting grant is applied only on first sight.
    pub fn get_or_create(&self, user_id: &str) -> Account {
        let handle = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id, balance = %self.starting_balance, "account created");
                Arc::new(Mutex::new(Account {
                    id: user_id.to_string(),
                    balance: self.starting_balance,
                }))
            })
            .value()
            .clone();
        let account = handle.lock().expect("account lock poisoned");
        account.clone()
    }

    pub fn get(&self, user_id: &str) -> EngineResult<Account> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().expect("account lock poisoned");
        Ok(account.clone())
    }

    fn handle(&self, user_id: &str) -> EngineResult<Arc<Mutex<Account>>> {
        self.accounts
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))
    }

    /// Apply a signed cash delta as part of a trade's atomic unit.
    ///
    /// The check and the write happen under one lock, so a debit that
    /// would leave the balance negative fails without any other effect.
    pub fn apply(&self, user_id: &str, delta: Decimal) -> EngineResult<Decimal> {
        let handle = self.handle(user_id)?;
        let mut account = handle.lock().expect("account lock poisoned");
        let new_balance = account.balance + delta;
        if new_balance < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                balance: account.balance,
                required: -delta,
            });
        }
        account.balance = new_balance;
        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> AccountLedger {
        AccountLedger::new(Decimal::from(1000))
    }

    #[test]
    fn grant_applies_once() {
        let accounts = ledger();
        let first = accounts.get_or_create("U1");
        assert_eq!(first.balance, Decimal::from(1000));

        accounts.apply("U1", Decimal::from(-300)).unwrap();
        let again = accounts.get_or_create("U1");
        assert_eq!(again.balance, Decimal::from(700));
    }

    #[test]
    fn overdraft_is_rejected_and_balance_untouched() {
        let accounts = ledger();
        accounts.get_or_create("U1");

        let err = accounts.apply("U1", Decimal::from(-1001)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(accounts.get("U1").unwrap().balance, Decimal::from(1000));
    }

    #[test]
    fn unknown_user_is_reported() {
        let accounts = ledger();
        assert!(matches!(
            accounts.get("ghost"),
            Err(EngineError::UnknownUser(_))
        ));
    }

    #[test]
    fn cash_quantizes_to_micro_credits() {
        let cash = to_cash(5.123_456_789).unwrap();
        assert_eq!(cash, Decimal::new(5_123_457, 6));
        assert!(to_cash(f64::INFINITY).is_err());
        assert!(to_cash(f64::NAN).is_err());
    }
}
