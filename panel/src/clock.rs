use std::{
    sync::OnceLock,
    time::Instant,
};

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

const STAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";
const FALLBACK_TIMEZONE: Tz = chrono_tz::Etc::GMTMinus3;

/// Wall clock used for log entries and the device contact stamp.
#[derive(Debug, Clone, Copy)]
pub struct PanelClock {
    tz: Tz,
}

impl PanelClock {
    pub fn new(timezone: &str) -> Self {
        let tz = timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown timezone {timezone:?}, using {FALLBACK_TIMEZONE}");
            FALLBACK_TIMEZONE
        });
        Self { tz }
    }

    pub fn stamp(&self) -> String {
        format_stamp(Utc::now().with_timezone(&self.tz))
    }
}

pub fn format_stamp<T: TimeZone>(at: DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    at.format(STAMP_FORMAT).to_string()
}

pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_like_asctime() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 22, 4, 9).unwrap();
        let shifted = at.with_timezone(&FALLBACK_TIMEZONE);

        assert_eq!(format_stamp(shifted), "Tue Jan  6 01:04:09 2026");
    }

    #[test]
    fn unknown_timezone_falls_back() {
        let clock = PanelClock::new("Mars/Olympus");
        assert_eq!(clock.tz, FALLBACK_TIMEZONE);
    }
}
