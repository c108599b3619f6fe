use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};

use pagecount_core::visitor::{
    build_visitor_cookie, resolve, token_from_cookie_header, ResolvedIdentity, VisitorToken,
};

/// Deferred write-back of the visitor cookie.
///
/// Produced by [`resolve_identity`] at request start; the handler calls
/// [`attach`](Self::attach) on whatever response it ends up returning.
#[derive(Debug, Clone)]
pub struct IdentityCookie {
    identity: ResolvedIdentity,
    https: bool,
}

impl IdentityCookie {
    pub fn token(&self) -> &VisitorToken {
        &self.identity.token
    }

    pub fn minted(&self) -> bool {
        self.identity.minted
    }

    /// Append `Set-Cookie` for the resolved token to `response`.
    ///
    /// Sent on every response, not only for new visitors, so the ten-year
    /// expiry keeps sliding forward.
    pub fn attach(self, mut response: Response) -> Response {
        let cookie = build_visitor_cookie(&self.identity.token, self.https);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Visitor token not representable as a cookie");
            }
        }
        response
    }
}

/// Read the `uid` cookie (if any) and resolve the visitor's identity.
pub fn resolve_identity(headers: &HeaderMap, https: bool) -> IdentityCookie {
    let inbound = headers
        .get_all(header::COOKIE)
        .iter()
        .find_map(|v| token_from_cookie_header(v.as_bytes()));

    IdentityCookie {
        identity: resolve(inbound),
        https,
    }
}
