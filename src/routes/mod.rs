/// Router Module Index
///
/// API routes are grouped by the session they demand. The grouping is for readability:
/// enforcement lives in the `Session` / `AdminSession` extractors of each handler.

/// Routes open to anonymous callers: health, ping and the authentication endpoints.
pub mod public;

/// Routes whose handlers take a `Session`: the caller's own profile and requests.
pub mod authenticated;

/// Routes whose handlers take an `AdminSession`. Nested under `/api/admin`.
pub mod admin;
