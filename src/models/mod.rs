//! Domain records and their validation rules.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod filters;
pub mod movie;
pub mod user;
pub mod validator;

pub use filters::{Filters, Metadata};
pub use movie::{Movie, MovieChanges, MovieQuery, NewMovie, Runtime};
pub use user::{NewUser, User};
pub use validator::Validator;

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// The current calendar year (UTC).
pub fn current_year() -> i32 {
    civil_year(now_unix().div_euclid(86_400))
}

/// Gregorian year for a count of days since 1970-01-01.
fn civil_year(days: i64) -> i32 {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    year as i32
}
