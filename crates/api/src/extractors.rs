//! Request extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Client address as reported by the edge proxy, for request logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First hop of X-Forwarded-For, then X-Real-IP.
        let ip = header(parts, "x-forwarded-for")
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .or_else(|| header(parts, "x-real-ip"))
            .map(str::to_string);

        Ok(ClientIp(ip))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
