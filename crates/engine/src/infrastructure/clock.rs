//! Clock and random implementations.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::infrastructure::ports::{ClockPort, RandomPort};

/// Wall-clock time, used for `created_at` stamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Thread-local RNG for seeds and transmission numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn gen_seed(&self) -> u32 {
        rand::thread_rng().gen()
    }
}

/// Pinned time for tests.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Pinned randomness for tests; `gen_range` clamps the value into range.
#[cfg(test)]
pub struct FixedRandom(pub i32);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        self.0.clamp(min, max)
    }

    fn gen_seed(&self) -> u32 {
        self.0.unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_range_is_inclusive() {
        let random = SystemRandom;
        for _ in 0..200 {
            let value = random.gen_range(1000, 9999);
            assert!((1000..=9999).contains(&value));
        }
    }

    #[test]
    fn degenerate_range_returns_lower_bound() {
        assert_eq!(SystemRandom.gen_range(5, 5), 5);
        assert_eq!(SystemRandom.gen_range(7, 3), 7);
    }

    #[test]
    fn fixed_random_clamps() {
        assert_eq!(FixedRandom(12).gen_range(1000, 9999), 1000);
        assert_eq!(FixedRandom(-3).gen_seed(), 3);
    }
}
