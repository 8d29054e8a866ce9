use chrono::{Duration, NaiveDate};
use serde_json::{Map, Value};

use analyst_common::Clock;

/// Name of the date parameter every tracked query accepts.
pub const DATE_PARAMETER: &str = "p_date";

pub fn query_parameters(target_date: NaiveDate) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(
        DATE_PARAMETER.to_string(),
        Value::String(target_date.format("%Y-%m-%d").to_string()),
    );
    params
}

pub fn current_utc_date(clock: &dyn Clock) -> NaiveDate {
    clock.utc_now().date_naive()
}

/// Yesterday in UTC; the daily submit targets the last complete day.
pub fn previous_utc_date(clock: &dyn Clock) -> NaiveDate {
    current_utc_date(clock) - Duration::days(1)
}
