use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("locked {actual} is less than expected {expected}")]
    InsufficientAmount { actual: u64, expected: u64 },

    #[error("locked {actual} is overpaying expected {expected}")]
    OverpaidAmount { actual: u64, expected: u64 },
}
