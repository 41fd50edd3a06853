//! src/lmsr.rs
//! Numerically stable LMSR pricing for binary markets, f64 math only.
//!
//! Pure functions, no state. Ledger mutation lives in `market`/`account`.

use serde::{Deserialize, Serialize};

/// Which side of a binary market a trade touches.
///
/// Index 0 is YES, index 1 is NO, matching the `bought_shares` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn index(&self) -> usize {
        match self {
            Side::Yes => 0,
            Side::No => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

/// Cost function and implied probabilities at one inventory point.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LmsrInfo {
    pub cost_func: f64,
    pub probs: [f64; 2],
}

#[inline]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    // if m is -inf (when both a,b are -inf), this still returns -inf
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// LMSR cost function C(q) = b * ln(exp(q_yes/b) + exp(q_no/b)).
#[inline]
pub fn cost_func(shares: [f64; 2], b: f64) -> f64 {
    assert!(b > 0.0 && b.is_finite(), "liquidity invalid");
    b * log_sum_exp(shares[0] / b, shares[1] / b)
}

/// Implied probabilities [p_yes, p_no]; the pair always sums to 1.
#[inline]
pub fn probs(shares: [f64; 2], b: f64) -> [f64; 2] {
    assert!(b > 0.0 && b.is_finite(), "liquidity invalid");
    let a = shares[0] / b;
    let c = shares[1] / b;
    let m = a.max(c);
    let ey = (a - m).exp();
    let en = (c - m).exp();
    let p_yes = ey / (ey + en);
    [p_yes, 1.0 - p_yes]
}

/// Cost function and probabilities in one call.
pub fn price(shares: [f64; 2], liquidity: f64) -> LmsrInfo {
    LmsrInfo {
        cost_func: cost_func(shares, liquidity),
        probs: probs(shares, liquidity),
    }
}

/// Change in the cost function when `shares_delta` (signed) lands on `side`.
///
/// Positive means the maker collects that much cash; negative means it
/// pays out. A zero delta yields exactly zero.
pub fn cost_delta(shares: [f64; 2], b: f64, shares_delta: f64, side: Side) -> f64 {
    let before = cost_func(shares, b);
    let mut after = shares;
    after[side.index()] += shares_delta;
    cost_func(after, b) - before
}

/// Cash a buyer pays for `amount` (non-negative) shares on `side`.
pub fn buy_cost(shares: [f64; 2], b: f64, amount: f64, side: Side) -> f64 {
    debug_assert!(amount >= 0.0);
    cost_delta(shares, b, amount, side)
}

/// Cash a seller receives for `amount` (non-negative) shares on `side`.
pub fn sell_payoff(shares: [f64; 2], b: f64, amount: f64, side: Side) -> f64 {
    debug_assert!(amount >= 0.0);
    -cost_delta(shares, b, -amount, side)
}

// -----------------------
// Tests
// -----------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_market_cost_is_b_ln2() {
        for b in [1.0, 100.0, 5000.0] {
            let c = cost_func([0.0, 0.0], b);
            assert!((c - b * 2.0_f64.ln()).abs() < 1e-9, "b={b}, c={c}");
        }
    }

    #[test]
    fn empty_market_is_even_odds() {
        let p = probs([0.0, 0.0], 100.0);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ten_yes_shares_at_b_100_cost_about_5_12() {
        let cost = buy_cost([0.0, 0.0], 100.0, 10.0, Side::Yes);
        let expected = 100.0 * (0.1_f64.exp() + 1.0).ln() - 100.0 * 2.0_f64.ln();
        assert!((cost - expected).abs() < 1e-9);
        assert!((cost - 5.12).abs() < 0.01, "cost={cost}");
    }

    #[test]
    fn zero_shares_cost_exactly_zero() {
        let q = [37.5, -12.0];
        assert_eq!(buy_cost(q, 250.0, 0.0, Side::No), 0.0);
        assert_eq!(sell_payoff(q, 250.0, 0.0, Side::Yes), 0.0);
    }

    #[test]
    fn stable_for_large_inventory_over_liquidity() {
        // naive exponentiation overflows here; log-sum-exp must not
        let q = [80_000.0, -3_000.0];
        let info = price(q, 100.0);
        assert!(info.cost_func.is_finite());
        assert!(info.probs[0] > 0.999_999);
        assert!(info.probs[0] <= 1.0);
    }

    proptest! {
        #[test]
        fn probs_sum_to_one(
            b in 10.0f64..10_000.0,
            q_yes in -5_000.0f64..5_000.0,
            q_no in -5_000.0f64..5_000.0,
        ) {
            let p = probs([q_yes, q_no], b);
            prop_assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
            prop_assert!(p[0] >= 0.0 && p[0] <= 1.0);
        }

        #[test]
        fn cost_and_prob_increase_with_yes_inventory(
            // skew kept well inside the regime where ln(1+x) resolves,
            // so strict inequalities are meaningful
            b in 500.0f64..10_000.0,
            q_yes in -1_000.0f64..1_000.0,
            q_no in -1_000.0f64..1_000.0,
            bump in 0.5f64..500.0,
        ) {
            let before = price([q_yes, q_no], b);
            let after = price([q_yes + bump, q_no], b);
            prop_assert!(after.cost_func > before.cost_func);
            prop_assert!(after.probs[0] > before.probs[0]);
        }

        #[test]
        fn buy_then_sell_nets_to_zero(
            b in 10.0f64..10_000.0,
            q_yes in -2_000.0f64..2_000.0,
            q_no in -2_000.0f64..2_000.0,
            amount in 0.1f64..500.0,
            yes in proptest::bool::ANY,
        ) {
            let side = if yes { Side::Yes } else { Side::No };
            let start = [q_yes, q_no];
            let cost = buy_cost(start, b, amount, side);
            let mut held = start;
            held[side.index()] += amount;
            let payoff = sell_payoff(held, b, amount, side);
            prop_assert!((cost - payoff).abs() < 1e-6,
                "cost={cost}, payoff={payoff}");
        }

        #[test]
        fn buying_is_never_free(
            b in 500.0f64..10_000.0,
            q_yes in -1_000.0f64..1_000.0,
            q_no in -1_000.0f64..1_000.0,
            amount in 0.01f64..500.0,
            yes in proptest::bool::ANY,
        ) {
            let side = if yes { Side::Yes } else { Side::No };
            prop_assert!(buy_cost([q_yes, q_no], b, amount, side) > 0.0);
        }
    }
}
