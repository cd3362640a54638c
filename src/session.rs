use axum::http::{HeaderMap, HeaderValue, header};

use crate::token::TOKEN_TTL_SECS;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

/// Session Cookie Adapter
///
/// The only place that writes the `token` cookie. Handlers return these header values
/// (`[(SET_COOKIE, value)]`) rather than formatting cookie strings themselves.
pub fn issue(token: &str) -> HeaderValue {
    let cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={TOKEN_TTL_SECS}"
    );
    // Tokens are base64url segments joined by dots, always a valid header value.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear())
}

/// Overwrites the cookie with an empty value and `Max-Age=0` so the browser drops it.
pub fn clear() -> HeaderValue {
    HeaderValue::from_static("token=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

/// read_token
///
/// Extracts the raw `token` cookie value from the request headers. Every `Cookie`
/// header is scanned; empty values are treated as absent.
pub fn read_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
