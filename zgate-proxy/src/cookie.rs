//! Session cookies
//!
//! Management sessions ride in `zgate-session`, proxy-scoped sessions in
//! `zgate-proxy`. Both carry only the opaque session ID.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Management session cookie
pub const SESSION_COOKIE: &str = "zgate-session";

/// Proxy-scoped session cookie
pub const PROXY_COOKIE: &str = "zgate-proxy";

/// Build a session cookie
pub fn session_cookie(name: &'static str, session_id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, session_id))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie value carried by the request, if any
pub fn load(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Queue removal of `name`
pub fn remove(jar: CookieJar, name: &'static str) -> CookieJar {
    jar.remove(Cookie::build(name).path("/").build())
}

/// Does this `Set-Cookie` value set or clear `name`?
pub fn sets_cookie(set_cookie: &str, name: &str) -> bool {
    set_cookie
        .split_once('=')
        .map(|(n, _)| n.trim() == name)
        .unwrap_or(false)
}
