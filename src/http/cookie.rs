//! Session cookie encoding and extraction.
//!
//! The session token rides in a single HTTP-only cookie scoped to the
//! whole site. `SameSite=Lax` keeps it off cross-site subrequests while
//! still surviving top-level navigation.

use axum::http::{header, HeaderMap};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "vigil_session";

/// Build the `Set-Cookie` value carrying a freshly issued token.
///
/// Max-Age matches the token TTL so the browser drops the cookie at the
/// same moment verification would start failing.
pub fn session_cookie(token: &str, max_age_seconds: u64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age_seconds
    )
}

/// Build the `Set-Cookie` value that clears the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE)
}

/// Extract the session token from the request's Cookie headers, if any.
pub fn extract_session(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            if let Some((name, token)) = pair.trim().split_once('=') {
                if name == SESSION_COOKIE && !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc.def.ghi", 43_200);
        assert!(cookie.starts_with("vigil_session=abc.def.ghi;"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=43200"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie();
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.starts_with("vigil_session=;"));
    }

    #[test]
    fn test_extract_from_single_cookie() {
        let headers = headers_with_cookie("vigil_session=tok123");
        assert_eq!(extract_session(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_among_other_cookies() {
        let headers = headers_with_cookie("theme=dark; vigil_session=tok123; lang=en");
        assert_eq!(extract_session(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_missing_or_empty() {
        assert!(extract_session(&HeaderMap::new()).is_none());

        let headers = headers_with_cookie("theme=dark");
        assert!(extract_session(&headers).is_none());

        let headers = headers_with_cookie("vigil_session=");
        assert!(extract_session(&headers).is_none());
    }

    #[test]
    fn test_extract_ignores_name_suffix_collisions() {
        let headers = headers_with_cookie("not_vigil_session=evil; vigil_session=good");
        assert_eq!(extract_session(&headers).as_deref(), Some("good"));
    }
}
