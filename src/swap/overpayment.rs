use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverpaymentConfig {
    #[serde(default = "default_exempt_amount")]
    pub exempt_amount: u64,
    #[serde(default = "default_max_percentage")]
    pub max_percentage: u64,
}

impl Default for OverpaymentConfig {
    fn default() -> Self {
        Self {
            exempt_amount: default_exempt_amount(),
            max_percentage: default_max_percentage(),
        }
    }
}

fn default_exempt_amount() -> u64 {
    10_000
}

fn default_max_percentage() -> u64 {
    2
}

#[derive(Debug, Clone, Copy)]
pub struct OverpaymentProtector {
    exempt_amount: u64,
    max_percentage: u64,
}

impl OverpaymentProtector {
    pub fn new(config: OverpaymentConfig) -> Self {
        Self {
            exempt_amount: config.exempt_amount,
            max_percentage: config.max_percentage,
        }
    }

    /// An overpayment is refused only when it is above both the exempt amount
    /// and the allowed share of the expected amount.
    pub fn is_unacceptable_overpay(&self, expected: u64, actual: u64) -> bool {
        let overpay = actual.saturating_sub(expected);
        let max_relative = u128::from(expected) * u128::from(self.max_percentage) / 100;

        overpay > self.exempt_amount && u128::from(overpay) > max_relative
    }
}
