use axum::http::{header, HeaderMap};
use time::Duration;

pub const SESSION_COOKIE: &str = "jwt";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// `Set-Cookie` value for an http-only cookie living `max_age`.
pub fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={value}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        max_age.whole_seconds().max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expired(name: &str, secure: bool) -> String {
    build(name, "loggedout", Duration::ZERO, secure)
}

pub fn read<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}
