pub mod chain;
pub mod config;
pub mod logging;
pub mod swap;
pub mod worker;
pub mod zeroconf;
