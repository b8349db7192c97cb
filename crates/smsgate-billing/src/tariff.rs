// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message pricing.

use smsgate_config::model::BillingConfig;

/// Computes the credit charged for a message.
pub trait Tariff: Send + Sync {
    fn cost(&self, receiver: &str, body: &str) -> i64;
}

/// The same price for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTariff {
    cost: i64,
}

impl FixedTariff {
    pub const DEFAULT_COST: i64 = 1000;

    pub fn new(cost: i64) -> Self {
        Self { cost }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.sms_cost)
    }
}

impl Default for FixedTariff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

impl Tariff for FixedTariff {
    fn cost(&self, _receiver: &str, _body: &str) -> i64 {
        self.cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_tariff_ignores_content() {
        let tariff = FixedTariff::new(250);
        assert_eq!(tariff.cost("09120000000", "hi"), 250);
        assert_eq!(tariff.cost("", &"x".repeat(1000)), 250);
    }

    #[test]
    fn default_matches_config_default() {
        assert_eq!(
            FixedTariff::default(),
            FixedTariff::from_config(&BillingConfig::default())
        );
    }
}
