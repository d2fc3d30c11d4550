//! Request authorization for `POST /pdf`.
//!
//! Rules are tried in order and the first match grants access:
//!
//! 1. `Authorization: Bearer <token>` equal to the configured bearer token.
//! 2. `Authorization: Basic <base64>` whose decoded `user:pass` equals the
//!    configured pair (split at the first `:`).
//! 3. A `token` field in the body equal to the configured bearer token.
//! 4. Nothing configured at all: the service is open.
//!
//! Secret comparisons run in constant time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pdf_renderer_config::AuthConfig;
use subtle::ConstantTimeEq;

/// Whether a request carrying `header` (the raw `Authorization` value) and
/// `body_token` may render.
pub fn authorize(auth: &AuthConfig, header: Option<&str>, body_token: Option<&str>) -> bool {
    let bearer = auth.bearer_token();
    let basic = auth.basic_user().zip(auth.basic_pass());

    if let (Some(expected), Some(token)) = (bearer, header.and_then(|h| credentials(h, "Bearer"))) {
        if secret_eq(token.trim(), expected) {
            return true;
        }
    }
    if let (Some((user, pass)), Some(encoded)) = (basic, header.and_then(|h| credentials(h, "Basic"))) {
        if let Some((given_user, given_pass)) = decode_basic(encoded) {
            // Both halves are always compared so timing does not reveal which one differed.
            let user_ok = secret_eq(&given_user, user);
            let pass_ok = secret_eq(&given_pass, pass);
            if user_ok & pass_ok {
                return true;
            }
        }
    }
    if let (Some(expected), Some(token)) = (bearer, body_token) {
        if secret_eq(token, expected) {
            return true;
        }
    }
    bearer.is_none() && auth.basic_user().is_none() && auth.basic_pass().is_none()
}

/// The credentials following `scheme` in an `Authorization` value. The
/// scheme itself is matched case-insensitively.
fn credentials<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (given, rest) = header.trim_start().split_once(' ')?;
    given.eq_ignore_ascii_case(scheme).then_some(rest)
}

/// Malformed input (bad base64, not UTF-8, no `:`) is simply not a match.
fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn secret_eq(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_renderer_config::Secret;
    use rstest::rstest;

    fn config(bearer: Option<&str>, user: Option<&str>, pass: Option<&str>) -> AuthConfig {
        AuthConfig {
            bearer_token: bearer.map(Secret::new),
            basic_user: user.map(Secret::new),
            basic_pass: pass.map(Secret::new),
        }
    }

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[rstest]
    #[case::open(None, None, None, None, None, true)]
    #[case::open_with_empty_secrets(Some(""), Some(""), None, None, None, true)]
    #[case::bearer_match(Some("abc123"), None, None, Some("Bearer abc123"), None, true)]
    #[case::bearer_scheme_case(Some("abc123"), None, None, Some("bearer abc123"), None, true)]
    #[case::bearer_trimmed(Some("abc123"), None, None, Some("Bearer  abc123 "), None, true)]
    #[case::bearer_mismatch(Some("abc123"), None, None, Some("Bearer wrong"), None, false)]
    #[case::bearer_missing(Some("abc123"), None, None, None, None, false)]
    #[case::body_token(Some("abc123"), None, None, None, Some("abc123"), true)]
    #[case::body_token_wrong(Some("abc123"), None, None, None, Some("nope"), false)]
    #[case::body_token_after_bad_header(Some("abc123"), None, None, Some("Bearer wrong"), Some("abc123"), true)]
    #[case::body_token_without_bearer(None, Some("u"), Some("p"), None, Some("anything"), false)]
    #[case::partial_basic_rejects(None, Some("u"), None, None, None, false)]
    fn test_authorize(
        #[case] bearer: Option<&str>,
        #[case] user: Option<&str>,
        #[case] pass: Option<&str>,
        #[case] header: Option<&str>,
        #[case] body_token: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(authorize(&config(bearer, user, pass), header, body_token), expected);
    }

    #[rstest]
    #[case::match_("user:secret", true)]
    #[case::colon_in_password("user:sec:ret", false)]
    #[case::wrong_password("user:nope", false)]
    #[case::wrong_user("other:secret", false)]
    #[case::no_colon("usersecret", false)]
    fn test_basic(#[case] credentials: &str, #[case] expected: bool) {
        let auth = config(None, Some("user"), Some("secret"));
        assert_eq!(authorize(&auth, Some(&basic(credentials)), None), expected);
    }

    #[test]
    fn test_basic_password_with_colons() {
        let auth = config(None, Some("user"), Some("a:b:c"));
        assert!(authorize(&auth, Some(&basic("user:a:b:c")), None));
    }

    #[test]
    fn test_malformed_basic_falls_through_to_body_token() {
        let auth = config(Some("tok"), Some("user"), Some("secret"));
        assert!(!authorize(&auth, Some("Basic %%%not-base64"), None));
        assert!(authorize(&auth, Some("Basic %%%not-base64"), Some("tok")));
    }

    #[test]
    fn test_non_utf8_basic_is_not_a_match() {
        let auth = config(None, Some("user"), Some("secret"));
        let header = format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'x']));
        assert!(!authorize(&auth, Some(&header), None));
    }
}
