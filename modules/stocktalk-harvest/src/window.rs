use chrono::{DateTime, TimeDelta, Utc};

/// Recency window `[now - width, now]`, closed on both ends.
///
/// Sources are asked for recent posts already; this is the second line of
/// defence against items that slip outside the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    width: TimeDelta,
}

impl RecencyWindow {
    pub fn new(width: TimeDelta) -> Self {
        Self { width }
    }

    pub fn hours(hours: u32) -> Self {
        Self::new(TimeDelta::hours(i64::from(hours)))
    }

    pub fn width(&self) -> TimeDelta {
        self.width
    }

    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        timestamp >= now - self.width && timestamp <= now
    }
}

impl Default for RecencyWindow {
    fn default() -> Self {
        Self::hours(24)
    }
}
