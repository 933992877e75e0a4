//! Time-bound HMAC-SHA256 request signing.
//!
//! Every Spark endpoint (WebSocket and HTTP) authenticates the request line
//! through three query parameters appended to the target URL:
//!
//! - `host`: the authority the request is addressed to
//! - `date`: an RFC-1123 GMT timestamp
//! - `authorization`: base64 of a parameter string that itself embeds the
//!   base64 HMAC-SHA256 signature of the canonical request
//!
//! The remote service only accepts a signature for a few seconds around
//! `date`, so a [`SignedRequest`] must be rebuilt for every connection attempt.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use time::macros::format_description;
use url::Url;

use crate::errors::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

/// Algorithm name embedded in the authorization parameters.
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

/// Header list embedded in the authorization parameters.
pub const SIGNED_HEADERS: &str = "host date request-line";

/// A signed request URL and the values it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub host: String,
    pub path: String,
    pub date: String,
    /// Base64 of the authorization parameter string
    pub authorization: String,
    pub final_url: String,
}

/// Sign `url` for `method` at the current instant.
pub fn sign(url: &str, method: &str, api_key: &str, api_secret: &str) -> GatewayResult<SignedRequest> {
    sign_at(url, method, api_key, api_secret, OffsetDateTime::now_utc())
}

/// Sign `url` for `method` as if the current time were `at`.
pub fn sign_at(
    url: &str,
    method: &str,
    api_key: &str,
    api_secret: &str,
    at: OffsetDateTime,
) -> GatewayResult<SignedRequest> {
    if api_key.is_empty() || api_secret.is_empty() {
        return Err(GatewayError::AuthError(
            "API key and secret must not be empty".to_string(),
        ));
    }

    let (mut signed, host, path) = split_host_path(url)?;
    let method = method.to_ascii_uppercase();
    let date = rfc1123(at)?;

    let canonical = format!("host: {host}\ndate: {date}\n{method} {path} HTTP/1.1");
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| GatewayError::AuthError(format!("Invalid API secret: {e}")))?;
    mac.update(canonical.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let authorization_origin = format!(
        "api_key=\"{api_key}\", algorithm=\"{SIGNATURE_ALGORITHM}\", headers=\"{SIGNED_HEADERS}\", signature=\"{signature}\""
    );
    let authorization = BASE64.encode(authorization_origin.as_bytes());

    signed
        .query_pairs_mut()
        .append_pair("authorization", &authorization)
        .append_pair("date", &date)
        .append_pair("host", &host);

    Ok(SignedRequest {
        method,
        host,
        path,
        date,
        authorization,
        final_url: signed.into(),
    })
}

/// Parse an absolute URL and split it into `host[:port]` and path.
///
/// A path is mandatory: `wss://host` without a trailing `/...` is rejected.
/// The host comes from the parsed URL so it matches the `Host` header sent
/// on the wire; a default port (`:443` for `wss`) is therefore dropped.
fn split_host_path(url: &str) -> GatewayResult<(Url, String, String)> {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| GatewayError::MalformedUrl(format!("missing scheme: {url}")))?;
    match rest.find('/') {
        None => return Err(GatewayError::MalformedUrl(format!("missing path: {url}"))),
        Some(0) => return Err(GatewayError::MalformedUrl(format!("missing host: {url}"))),
        Some(_) => {}
    }

    let parsed =
        Url::parse(url).map_err(|e| GatewayError::MalformedUrl(format!("{url}: {e}")))?;
    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Err(GatewayError::MalformedUrl(format!("missing host: {url}"))),
    };
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = parsed.path().to_string();
    Ok((parsed, host, path))
}

fn rfc1123(at: OffsetDateTime) -> GatewayResult<String> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|e| GatewayError::AuthError(format!("Failed to format date: {e}")))
}
