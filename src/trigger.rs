//! Poll triggers deciding when a pipeline next runs
//!
//! Two modes exist: a plain fixed delay, and a daily time window that fires
//! at an interval while the wall clock (in a configured zone) is inside
//! `[start, end]` and otherwise parks until the next occurrence of `start`.
//!
//! Triggers are pure: [`PollTrigger::next_execution`] maps "now" plus the
//! last actual execution to the next execution instant and touches no state.
//!
//! # Example
//!
//! ```rust
//! use fileferry::config::PollerConfig;
//! use fileferry::trigger::PollTrigger;
//! use chrono::Utc;
//! use std::time::Duration;
//!
//! let trigger = PollTrigger::from_config(Some(&PollerConfig::time_window(
//!     Duration::from_secs(30),
//!     "08:00",
//!     "18:00",
//!     "Europe/Berlin",
//! )));
//! let next = trigger.next_execution(Utc::now(), None);
//! assert!(next > Utc::now() - chrono::TimeDelta::seconds(1));
//! ```

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;

use crate::config::{PollerConfig, PollerKind, parse_window_time};

/// Fixed delay used when a poller is malformed and carries no fallback of its own
pub const DEFAULT_FALLBACK_FIXED_DELAY: Duration = Duration::from_millis(5000);

/// Computes the next execution instant for a pipeline scheduler loop
#[derive(Clone, Debug, PartialEq)]
pub enum PollTrigger {
    /// Fire `interval` after the previous execution (or after "now" when
    /// there has been none)
    FixedDelay {
        /// Delay between executions
        interval: Duration,
    },
    /// Fire at `interval` while the local time in `zone` is inside
    /// `[start, end]`, both ends inclusive; park until the next occurrence
    /// of `start` otherwise
    TimeWindow {
        /// Interval inside the active window
        interval: Duration,
        /// Window start (inclusive)
        start: NaiveTime,
        /// Window end (inclusive)
        end: NaiveTime,
        /// Zone the window is evaluated in
        zone: Tz,
    },
}

impl PollTrigger {
    /// Build a trigger from an optional poller configuration
    ///
    /// A poller missing a required field for its kind does not fail: the
    /// trigger degrades to a fixed delay of `fallback_fixed_delay`, or
    /// [`DEFAULT_FALLBACK_FIXED_DELAY`] when that is absent too. Validation
    /// reports the malformed poller separately; this keeps the scheduler
    /// itself total.
    pub fn from_config(poller: Option<&PollerConfig>) -> Self {
        let fallback = poller
            .and_then(|p| p.fallback_fixed_delay)
            .unwrap_or(DEFAULT_FALLBACK_FIXED_DELAY);

        let Some(poller) = poller else {
            return PollTrigger::FixedDelay { interval: fallback };
        };

        match poller.kind {
            PollerKind::Fixed => {
                if let Some(interval) = poller.fixed_interval
                    && interval >= Duration::from_millis(1)
                {
                    return PollTrigger::FixedDelay { interval };
                }
            }
            PollerKind::TimeWindow => {
                let start = poller.start_time.as_deref().and_then(parse_window_time);
                let end = poller.end_time.as_deref().and_then(parse_window_time);
                let zone = poller
                    .time_zone
                    .as_deref()
                    .and_then(|z| z.parse::<Tz>().ok());
                if let (Some(interval), Some(start), Some(end), Some(zone)) =
                    (poller.window_interval, start, end, zone)
                    && interval >= Duration::from_millis(1)
                {
                    return PollTrigger::TimeWindow {
                        interval,
                        start,
                        end,
                        zone,
                    };
                }
            }
        }

        tracing::debug!(
            fallback_ms = fallback.as_millis() as u64,
            "poller configuration incomplete for its kind, using fixed fallback delay"
        );
        PollTrigger::FixedDelay { interval: fallback }
    }

    /// Compute the next execution instant
    ///
    /// `last_actual` is the instant the previous tick actually started, if
    /// any; inside an active window (and always for fixed delay) it is the
    /// baseline the interval is added to.
    pub fn next_execution(
        &self,
        now: DateTime<Utc>,
        last_actual: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        match self {
            PollTrigger::FixedDelay { interval } => {
                last_actual.unwrap_or(now) + to_delta(*interval)
            }
            PollTrigger::TimeWindow {
                interval,
                start,
                end,
                zone,
            } => {
                let local = now.with_timezone(zone);
                let current = local.time();

                // Inclusive on both ends. Windows with start > end are never
                // active except at the degenerate instants where current
                // satisfies both bounds; overnight wraparound is not
                // implemented.
                if *start <= current && current <= *end {
                    last_actual.unwrap_or(now) + to_delta(*interval)
                } else {
                    let date = if current < *start {
                        local.date_naive()
                    } else {
                        local
                            .date_naive()
                            .succ_opt()
                            .unwrap_or_else(|| local.date_naive())
                    };
                    match zone.from_local_datetime(&date.and_time(*start)).earliest() {
                        Some(next_start) => next_start.with_timezone(&Utc),
                        // DST gap swallowed the start time; fall back to a
                        // plain delay rather than firing never.
                        None => now + to_delta(DEFAULT_FALLBACK_FIXED_DELAY),
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for PollTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollTrigger::FixedDelay { interval } => {
                write!(f, "fixed-delay {}ms", interval.as_millis())
            }
            PollTrigger::TimeWindow {
                interval,
                start,
                end,
                zone,
            } => write!(
                f,
                "time-window {}ms in [{start}, {end}] {zone}",
                interval.as_millis()
            ),
        }
    }
}

fn to_delta(duration: Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(duration).unwrap_or(chrono::TimeDelta::MAX)
}
