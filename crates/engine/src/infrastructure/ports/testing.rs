//! Time and randomness behind ports so tests can pin them.

use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Inclusive range.
    fn gen_range(&self, min: i32, max: i32) -> i32;
    /// Sampler seed for graphs built without an explicit one.
    fn gen_seed(&self) -> u32;
}
