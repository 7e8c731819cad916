//! Wall-clock helpers.

use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time at microsecond precision.
///
/// Persisted timestamps must survive a Postgres `timestamptz` round-trip
/// unchanged, which stores microseconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
