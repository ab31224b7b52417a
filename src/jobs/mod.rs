//! Daily notification and automatic salary-raise job.

pub mod engine;
pub mod plan;
pub mod schedule;
pub mod store;

use chrono::{NaiveDate, Utc};

/// The current calendar date in UTC. Stored hire and raise dates use the same
/// clock as the daily run, so review dates never drift by a day.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
