use std::fmt;

use serde::{Deserialize, Serialize};

/// Cookie that carries the anonymous visitor token.
pub const VISITOR_COOKIE: &str = "uid";

/// Cookie lifetime: ten 365-day years, in seconds.
pub const VISITOR_COOKIE_MAX_AGE: u64 = 60 * 60 * 24 * 365 * 10;

/// Opaque anonymous visitor identity.
///
/// Minted once per visitor as a UUID v4 rendered as 32 lowercase hex chars.
/// Tokens arriving from the client are kept verbatim and never re-derived,
/// so a returning visitor keeps the same identity for the cookie's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorToken(String);

impl VisitorToken {
    /// Mint a fresh token from 122 random bits (UUID v4).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of resolving a request's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub token: VisitorToken,
    /// `true` when no usable token arrived and a new one was minted.
    pub minted: bool,
}

/// Resolve the visitor token for a request.
///
/// A present, non-empty inbound token is returned unchanged. Anything else
/// yields a freshly minted token. Never fails.
pub fn resolve(inbound: Option<&str>) -> ResolvedIdentity {
    match inbound.filter(|t| !t.trim().is_empty()) {
        Some(token) => ResolvedIdentity {
            token: VisitorToken(token.to_string()),
            minted: false,
        },
        None => ResolvedIdentity {
            token: VisitorToken::mint(),
            minted: true,
        },
    }
}

/// Pull the visitor token out of a raw `Cookie` header value.
///
/// Works on bytes: other cookies on the same domain may carry non-ASCII
/// values, and only the `uid` value itself has to be valid UTF-8.
pub fn token_from_cookie_header(cookie_header: &[u8]) -> Option<&str> {
    cookie_header.split(|b| *b == b';').find_map(|pair| {
        let value = pair
            .trim_ascii()
            .strip_prefix(VISITOR_COOKIE.as_bytes())?
            .strip_prefix(b"=")?;
        std::str::from_utf8(value).ok()
    })
}

/// Build the `Set-Cookie` value that persists `token` on the client.
///
/// `HttpOnly` keeps the token away from page scripts.
pub fn build_visitor_cookie(token: &VisitorToken, https: bool) -> String {
    let secure = if https { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        VISITOR_COOKIE, token, VISITOR_COOKIE_MAX_AGE, secure,
    )
}
