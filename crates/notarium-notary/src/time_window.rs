//! Time-window checks against an injected clock.

use std::sync::Arc;

use notarium_core::{Clock, TimeWindow};
use time::Duration;

use crate::error::NotaryError;

/// Fail with `TimeWindowInvalid` unless `clock.now()` lies in `window`.
///
/// An absent window means the transaction is valid at any time.
pub fn validate_time_window(clock: &dyn Clock, window: Option<&TimeWindow>) -> Result<(), NotaryError> {
    let Some(window) = window else {
        return Ok(());
    };
    let current_time = clock.now();
    if window.contains(current_time) {
        Ok(())
    } else {
        Err(NotaryError::TimeWindowInvalid {
            current_time,
            time_window: *window,
        })
    }
}

/// Lenient check that widens each window bound by a clock-skew tolerance.
#[derive(Clone)]
pub struct TimeWindowChecker {
    clock: Arc<dyn Clock>,
    tolerance: Duration,
}

impl TimeWindowChecker {
    /// Default clock-skew allowance.
    pub const DEFAULT_TOLERANCE: Duration = Duration::seconds(30);

    /// Checker over `clock` with the given tolerance.
    pub fn new(clock: Arc<dyn Clock>, tolerance: Duration) -> Self {
        Self { clock, tolerance }
    }

    /// Like `validate_time_window`, with both bounds widened by the tolerance.
    pub fn validate(&self, window: Option<&TimeWindow>) -> Result<(), NotaryError> {
        match window {
            Some(window) if !self.is_valid(window) => Err(NotaryError::TimeWindowInvalid {
                current_time: self.clock.now(),
                time_window: *window,
            }),
            _ => Ok(()),
        }
    }

    /// Whether `now` falls in the window once both bounds are widened.
    pub fn is_valid(&self, window: &TimeWindow) -> bool {
        let now = self.clock.now();
        let after_start = window
            .from_time()
            .map_or(true, |from| now >= from.saturating_sub(self.tolerance));
        let before_end = window
            .until_time()
            .map_or(true, |until| now < until.saturating_add(self.tolerance));
        after_start && before_end
    }
}
