//! AK/SK request signing (`SDK-HMAC-SHA256`)
//!
//! The canonical request is built from the method, the escaped path with a
//! trailing slash, the sorted escaped query, the sorted lower-case headers,
//! the signed header list and the hex SHA-256 of the body. The signature is
//! the hex HMAC-SHA256 of
//! `SDK-HMAC-SHA256\n{X-Sdk-Date}\n{hex(sha256(canonical request))}`
//! keyed with the secret key.

use crate::error::{HuaweiError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HOST, HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_X_DATE: &str = "X-Sdk-Date";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Signs requests with an access key / secret key pair
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Add `X-Sdk-Date`, `Host` and `Authorization` headers to `request`
    pub fn sign(&self, request: &mut reqwest::Request, now: DateTime<Utc>) -> Result<()> {
        let date = now.format(DATE_FORMAT).to_string();
        let host = host_header(request.url())?;

        let headers = request.headers_mut();
        headers.insert(HEADER_X_DATE, header_value(&date)?);
        if !headers.contains_key(HOST) {
            headers.insert(HOST, header_value(&host)?);
        }

        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .unwrap_or_default();
        let (canonical, signed_headers) =
            canonical_request(request.method().as_str(), request.url(), request.headers(), body)?;
        let signature = self.signature(&string_to_sign(&canonical, &date))?;

        let authorization = format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, signed_headers, signature
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }

    fn signature(&self, string_to_sign: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| HuaweiError::Signing(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Canonical request and the `;`-joined signed header list
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(String, String)> {
    let mut names: Vec<String> = headers.keys().map(|k| k.as_str().to_lowercase()).collect();
    names.sort();
    names.dedup();

    let mut canonical_headers = String::new();
    for name in &names {
        let values = headers
            .get_all(name.as_str())
            .iter()
            .map(|v| {
                v.to_str()
                    .map(str::trim)
                    .map_err(|e| HuaweiError::Signing(format!("header {}: {}", name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        canonical_headers.push_str(&format!("{}:{}\n", name, values.join(",")));
    }
    let signed_headers = names.join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    );
    Ok((canonical, signed_headers))
}

pub fn string_to_sign(canonical_request: &str, date: &str) -> String {
    format!(
        "{}\n{}\n{}",
        ALGORITHM,
        date,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

fn canonical_uri(url: &Url) -> String {
    let mut uri = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/");
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| HuaweiError::Signing(format!("no host in {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| HuaweiError::Signing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::{Body, Method, Request};

    fn at_new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sign_post_with_query_and_body() {
        let url = Url::parse(
            "https://as.cn-north-4.myhuaweicloud.com/autoscaling-api/v1/0123/scaling_group?b=2&a=1",
        )
        .unwrap();
        let mut request = Request::new(Method::POST, url);
        request
            .headers_mut()
            .insert("Content-Type", HeaderValue::from_static("application/json"));
        request
            .headers_mut()
            .insert("X-Project-Id", HeaderValue::from_static("0123"));
        *request.body_mut() = Some(Body::from(r#"{"a":1}"#));

        Signer::new("AK", "SK").sign(&mut request, at_new_year()).unwrap();

        let headers = request.headers();
        assert_eq!(headers["x-sdk-date"], "20240101T000000Z");
        assert_eq!(headers["host"], "as.cn-north-4.myhuaweicloud.com");
        assert_eq!(
            headers["authorization"],
            "SDK-HMAC-SHA256 Access=AK, SignedHeaders=content-type;host;x-project-id;x-sdk-date, \
             Signature=d29b4131082d93774d6212425fbdd139f8aa2cec53ec76af3109b459b7999f8a"
        );
    }

    #[test]
    fn test_canonical_request_escapes_path() {
        let url = Url::parse("https://scm.x.com/v3/scm/certificates/a%20b").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("scm.x.com"));
        headers.insert(HEADER_X_DATE, HeaderValue::from_static("20240101T000000Z"));

        let (canonical, signed) = canonical_request("GET", &url, &headers, b"").unwrap();
        assert_eq!(signed, "host;x-sdk-date");
        assert_eq!(
            canonical,
            "GET\n/v3/scm/certificates/a%20b/\n\nhost:scm.x.com\nx-sdk-date:20240101T000000Z\n\n\
             host;x-sdk-date\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let mut request = Request::new(Method::GET, url);
        Signer::new("AK", "SK").sign(&mut request, at_new_year()).unwrap();
        assert!(
            request.headers()["authorization"]
                .to_str()
                .unwrap()
                .ends_with("Signature=0eaa299a9b6c57205970c6225644fde3b19af6efa0d689b196311109945064e5")
        );
    }

    #[test]
    fn test_host_keeps_port() {
        let url = Url::parse("http://127.0.0.1:8080/v3/").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_debug_hides_secret() {
        let printed = format!("{:?}", Signer::new("AK", "very-secret"));
        assert!(printed.contains("AK"));
        assert!(!printed.contains("very-secret"));
    }
}
