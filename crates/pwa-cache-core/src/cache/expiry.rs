//! Age-based expiry of stored responses

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::exchange::ResponseInfo;

/// Parse an HTTP `Date` header value
///
/// Accepts the IMF-fixdate / RFC 2822 form servers send, and RFC 3339.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Whether `response` has outlived `max_age` as of `now`
///
/// A response without a parseable `Date` header never expires.
pub fn is_expired_at<R>(response: &R, max_age: Duration, now: DateTime<Utc>) -> bool
where
    R: ResponseInfo + ?Sized,
{
    let Some(date) = response.header("date").and_then(parse_http_date) else {
        return false;
    };
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return false;
    };

    match date.checked_add_signed(max_age) {
        Some(expires_at) => now >= expires_at,
        None => false,
    }
}

/// Whether `response` has outlived `max_age` now
pub fn is_expired<R>(response: &R, max_age: Duration) -> bool
where
    R: ResponseInfo + ?Sized,
{
    is_expired_at(response, max_age, Utc::now())
}
