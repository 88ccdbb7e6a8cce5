//! HTTP Basic auth for the admin panel.
//!
//! Credentials are compared as SHA-256 digests with a constant-time loop, so
//! neither the length nor the first mismatching byte leaks through timing.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::AdminState;

pub const ADMIN_USER: &str = "admin";

/// Split an `Authorization: Basic ...` value into user and password.
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn digest_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da.iter().zip(db.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn credentials_match(user: &str, password: &str, expected_password: &str) -> bool {
    // Both comparisons always run.
    let user_ok = digest_eq(user, ADMIN_USER);
    let password_ok = digest_eq(password, expected_password);
    user_ok & password_ok
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"admin\"")],
        "Неверные учетные данные\n",
    )
        .into_response()
}

pub(super) async fn require_basic(State(state): State<AdminState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic)
        .is_some_and(|(user, password)| credentials_match(&user, &password, &state.password));

    if authorized {
        return next.run(req).await;
    }
    warn!(path = %req.uri().path(), "admin panel: rejected credentials");
    unauthorized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let value = format!("Basic {}", STANDARD.encode("admin:s3cr:et"));
        assert_eq!(parse_basic(&value), Some(("admin".into(), "s3cr:et".into())));
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[test]
    fn credentials_need_both_parts() {
        assert!(credentials_match("admin", "pw", "pw"));
        assert!(!credentials_match("root", "pw", "pw"));
        assert!(!credentials_match("admin", "pw2", "pw"));
    }
}
