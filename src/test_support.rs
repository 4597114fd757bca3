use std::cell::Cell;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::revision::Clock;

/// A clock that only moves when told to.
pub(crate) struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Cell::new(
                Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
                    .single()
                    .expect("valid fixed instant"),
            ),
        }
    }

    pub(crate) fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + TimeDelta::milliseconds(ms));
    }

    pub(crate) fn advance_us(&self, us: i64) {
        self.now.set(self.now.get() + TimeDelta::microseconds(us));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
