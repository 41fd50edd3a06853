//! Configuration management for the market engine
//! Supports environment variables and default values for market parameters

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

/// Configuration for the market engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Market configuration
    pub market: MarketConfig,
}

/// Market-specific configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Smallest LMSR liquidity parameter a market may be created with (default: 100)
    pub min_liquidity: f64,

    /// Credits granted to an account on first interaction (default: 1000)
    pub starting_balance: Decimal,

    /// Gap between reminder notifications for one market (default: 1.0)
    pub reminder_period_hours: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_liquidity: 100.0,
            starting_balance: Decimal::from(1000),
            reminder_period_hours: 1.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(min_liquidity) = env::var("MARKET_MIN_LIQUIDITY") {
            config.market.min_liquidity = min_liquidity.parse()
                .unwrap_or(config.market.min_liquidity);
        }

        if let Ok(starting_balance) = env::var("MARKET_STARTING_BALANCE") {
            config.market.starting_balance = starting_balance.parse()
                .unwrap_or(config.market.starting_balance);
        }

        if let Ok(period) = env::var("MARKET_REMINDER_PERIOD_HOURS") {
            config.market.reminder_period_hours = period.parse()
                .unwrap_or(config.market.reminder_period_hours);
        }

        // Validate configuration
        config.validate();

        config
    }

    /// Validate configuration values
    fn validate(&mut self) {
        if !self.market.min_liquidity.is_finite() || self.market.min_liquidity <= 0.0 {
            warn!(min_liquidity = self.market.min_liquidity, "invalid min_liquidity, using default");
            self.market.min_liquidity = 100.0;
        }

        if self.market.starting_balance < Decimal::ZERO {
            warn!(starting_balance = %self.market.starting_balance, "invalid starting_balance, using default");
            self.market.starting_balance = Decimal::from(1000);
        }

        if !self.market.reminder_period_hours.is_finite() || self.market.reminder_period_hours <= 0.0 {
            warn!(reminder_period_hours = self.market.reminder_period_hours, "invalid reminder_period_hours, using default");
            self.market.reminder_period_hours = 1.0;
        }
    }

    /// Emit the effective configuration at startup
    pub fn log(&self) {
        info!(
            min_liquidity = self.market.min_liquidity,
            starting_balance = %self.market.starting_balance,
            reminder_period_hours = self.market.reminder_period_hours,
            "engine configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.market.min_liquidity, 100.0);
        assert_eq!(config.market.starting_balance, Decimal::from(1000));
        assert_eq!(config.market.reminder_period_hours, 1.0);
    }

    #[test]
    fn validate_rejects_nonpositive_liquidity() {
        let mut config = Config::default();
        config.market.min_liquidity = -5.0;
        config.validate();
        assert_eq!(config.market.min_liquidity, 100.0);
    }
}
