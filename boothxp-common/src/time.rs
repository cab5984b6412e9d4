//! Timestamp and calendar-day utilities

use chrono::{NaiveDate, Utc};
use std::sync::Mutex;

/// Get the current UTC calendar day
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Source of the current calendar day
///
/// The daily dispensation cap is keyed by day, so the dispenser reads the day
/// through this trait instead of the system clock directly.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall-clock UTC day
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        today()
    }
}

/// Manually advanced day, for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    day: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self { day: Mutex::new(day) }
    }

    /// Move the clock to another day
    pub fn set(&self, day: NaiveDate) {
        *self.day.lock().unwrap_or_else(|e| e.into_inner()) = day;
    }

    /// Advance the clock by whole days
    pub fn advance_days(&self, days: u64) {
        let mut day = self.day.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = day.checked_add_days(chrono::Days::new(days)) {
            *day = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.day.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_is_after_2000() {
        assert!(today() > NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }

    #[test]
    fn test_system_clock_reports_today() {
        assert_eq!(SystemClock.today(), today());
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.today(), start);

        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        clock.set(start);
        assert_eq!(clock.today(), start);
    }
}
