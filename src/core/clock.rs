use chrono::{DateTime, Local, NaiveDate, Utc};

/// Day-folder names and the retention cutoff use this format everywhere.
/// Zero-padded, so string order equals date order.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for day folders and rollover detection.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock; days follow the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

pub fn day_string(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Seconds between two instants as a float; negative if `later` is earlier.
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}
