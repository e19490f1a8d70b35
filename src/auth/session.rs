use axum::http::{header, HeaderMap};
use chrono::{Duration, NaiveDateTime, Utc};
use rand::Rng;

use crate::db::TIMESTAMP_FORMAT;

/// Current time in the zone every stored timestamp uses.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Stored expiry for a session issued at `now`.
pub fn expiry_after(now: NaiveDateTime, days: u32) -> String {
    format_timestamp(&(now + Duration::days(i64::from(days))))
}

/// A session is dead once `now` is past its expiry. Blank or garbled
/// expiries are treated as already expired.
pub fn is_expired(expires: &str, now: NaiveDateTime) -> bool {
    match NaiveDateTime::parse_from_str(expires, TIMESTAMP_FORMAT) {
        Ok(expires_at) => now > expires_at,
        Err(_) => true,
    }
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn session_cookie(name: &str, token: &str, days: u32) -> String {
    let max_age_secs = u64::from(days) * 24 * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
