use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use axum_extra::headers::{HeaderMapExt, UserAgent};
use serde_json::Value;

use super::model::SessionInfo;

/// Client facts read from one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub forwarded_for: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// The client IP comes from `ip_header` when configured and present,
    /// otherwise from the connection address.
    pub fn from_request<B>(req: &Request<B>, ip_header: Option<&str>) -> Self {
        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        Self::from_headers(req.headers(), ip_header, remote_ip)
    }

    pub fn from_headers(
        headers: &HeaderMap,
        ip_header: Option<&str>,
        remote_ip: Option<String>,
    ) -> Self {
        let header_ip = ip_header
            .and_then(|name| headers.get(name))
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
            .map(str::to_string);

        Self {
            ip: header_ip.or(remote_ip),
            forwarded_for: headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
            user_agent: headers
                .typed_get::<UserAgent>()
                .map(|ua| ua.as_str().to_string()),
        }
    }
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Best-effort lookup; `None` when nothing is known or the lookup failed.
    async fn locate(&self, ip: &str) -> Option<Value>;
}

/// Looks addresses up over HTTP. `{ip}` in the URL template is replaced by
/// the address.
#[derive(Clone)]
pub struct HttpGeoLocator {
    client: reqwest::Client,
    url_template: String,
}

impl HttpGeoLocator {
    pub fn new(url_template: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: &str) -> Option<Value> {
        if !is_public(ip) {
            return None;
        }

        let url = self.url_template.replace("{ip}", ip);
        let response = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!("Geo lookup for {} returned {}", ip, resp.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("Geo lookup for {} failed: {}", ip, e);
                return None;
            }
        };

        response.json::<Value>().await.ok()
    }
}

/// Builds the metadata snapshot stored with a session. The geo lookup only
/// runs when the address differs from the one already recorded.
pub async fn snapshot(
    previous: &SessionInfo,
    meta: &RequestMeta,
    geo: Option<&dyn GeoLocator>,
) -> SessionInfo {
    let geo_result = match (&meta.ip, geo) {
        (Some(ip), _) if previous.ip.as_ref() == Some(ip) && previous.geo.is_some() => {
            previous.geo.clone()
        }
        (Some(ip), Some(locator)) => locator.locate(ip).await,
        _ => None,
    };

    SessionInfo {
        ip: meta.ip.clone(),
        forwarded_for: meta.forwarded_for.clone(),
        user_agent: meta.user_agent.clone(),
        geo: geo_result,
    }
}

fn is_public(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified())
        }
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::HeaderValue;

    use super::*;

    struct CountingLocator(AtomicUsize);

    #[async_trait]
    impl GeoLocator for CountingLocator {
        async fn locate(&self, ip: &str) -> Option<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(serde_json::json!({ "ip": ip, "country": "NL" }))
        }
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        headers
    }

    #[test]
    fn configured_header_wins_over_connection_address() {
        let meta = RequestMeta::from_headers(&headers(), Some("x-real-ip"), Some("10.0.0.2".into()));
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.forwarded_for.as_deref(), Some("203.0.113.9, 10.0.0.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn connection_address_is_the_fallback() {
        let meta = RequestMeta::from_headers(&HeaderMap::new(), Some("x-real-ip"), Some("10.0.0.2".into()));
        assert_eq!(meta.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(meta.user_agent, None);
    }

    #[tokio::test]
    async fn geo_lookup_is_reused_while_the_ip_is_unchanged() {
        let locator = CountingLocator(AtomicUsize::new(0));
        let meta = RequestMeta::from_headers(&headers(), Some("x-real-ip"), None);

        let first = snapshot(&SessionInfo::default(), &meta, Some(&locator)).await;
        let second = snapshot(&first, &meta, Some(&locator)).await;

        assert_eq!(locator.0.load(Ordering::SeqCst), 1);
        assert_eq!(first.geo, second.geo);
        assert!(second.geo.is_some());
    }

    #[test]
    fn private_addresses_are_not_public() {
        assert!(!is_public("127.0.0.1"));
        assert!(!is_public("192.168.1.4"));
        assert!(!is_public("garbage"));
        assert!(is_public("203.0.113.9"));
    }
}
