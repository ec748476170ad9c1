use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::SubsecRound;
use serde::{Deserialize, Serialize};

use tracelog_types::{now, TraceRecord, TraceTime};

/// Rounds of sleep-and-recheck before assuming the clock has moved on.
const MAX_ADVANCE_RETRIES: u32 = 5;

/// Inclusive lower bound on the timestamps a reader delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Checkpoint(TraceTime);

impl Checkpoint {
    /// Checkpoint at `time`, truncated to millisecond resolution.
    pub fn at(time: TraceTime) -> Self {
        Self(time.trunc_subsecs(3))
    }

    /// First millisecond strictly after the current instant.
    ///
    /// Blocks until the wall clock has reached the returned time, so any
    /// record stamped after this call returns is admitted.
    pub fn after_now() -> Self {
        advance_past(now(), now)
    }

    pub fn time(&self) -> TraceTime {
        self.0
    }

    /// Whether `record` lies at or after this checkpoint.
    pub fn admits(&self, record: &TraceRecord) -> bool {
        record.time >= self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

fn advance_past(observed: TraceTime, mut clock: impl FnMut() -> TraceTime) -> Checkpoint {
    let target = Checkpoint::at(observed + chrono::Duration::milliseconds(1));
    for _ in 0..MAX_ADVANCE_RETRIES {
        if clock() >= target.0 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    target
}
