//! reqwest-backed implementation of the transport port.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use fp_core::domain::Locale;
use fp_core::ports::{Transport, TransportResponse};
use fp_core::{Error, Result};

pub const BASE_URL: &str = "https://funpay.com/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalizes an api method or absolute url onto the site origin and
/// applies the locale path prefix. The site serves `ru` at the bare
/// origin and prefixes `en`/`uk`; an already-present prefix is stripped
/// first so the override never stacks.
pub fn normalize_url(path: &str, locale: Option<Locale>) -> String {
    let mut url = if path == BASE_URL.trim_end_matches('/') {
        BASE_URL.to_string()
    } else if path.starts_with(BASE_URL) {
        path.to_string()
    } else {
        format!("{BASE_URL}{}", path.trim_start_matches('/'))
    };

    for loc in [Locale::En, Locale::Uk] {
        let prefixed = format!("{BASE_URL}{}/", loc.as_str());
        if let Some(rest) = url.strip_prefix(&prefixed) {
            url = format!("{BASE_URL}{rest}");
            break;
        }
    }

    match locale {
        Some(loc @ (Locale::En | Locale::Uk)) => {
            let rest = &url[BASE_URL.len()..];
            format!("{BASE_URL}{}/{rest}", loc.as_str())
        }
        _ => url,
    }
}

/// Session-cookie transport. One instance per authenticated session;
/// the server-issued PHPSESSID is carried over between calls.
pub struct HttpTransport {
    client: reqwest::Client,
    golden_key: String,
    user_agent: Option<String>,
    phpsessid: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(golden_key: impl Into<String>, user_agent: Option<String>) -> Result<HttpTransport> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::External(e.to_string()))?;
        Ok(HttpTransport {
            client,
            golden_key: golden_key.into(),
            user_agent,
            phpsessid: Mutex::new(None),
        })
    }

    pub fn phpsessid(&self) -> Option<String> {
        self.phpsessid.lock().ok().and_then(|g| g.clone())
    }

    fn cookie_header(&self) -> String {
        let mut cookie = format!("golden_key={}; cookie_prefs=1", self.golden_key);
        if let Some(sid) = self.phpsessid() {
            cookie.push_str("; PHPSESSID=");
            cookie.push_str(&sid);
        }
        cookie
    }

    fn remember_session_cookie(&self, response: &reqwest::Response) {
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(header) = value.to_str() else {
                continue;
            };
            let Some(rest) = header.strip_prefix("PHPSESSID=") else {
                continue;
            };
            let sid = rest.split(';').next().unwrap_or_default();
            if !sid.is_empty() {
                if let Ok(mut guard) = self.phpsessid.lock() {
                    *guard = Some(sid.to_string());
                }
            }
        }
    }

    fn apply_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header("cookie", self.cookie_header())
            .header("accept", "*/*")
            .header("x-requested-with", "XMLHttpRequest");
        if let Some(ua) = &self.user_agent {
            builder = builder.header("user-agent", ua);
        }
        builder
    }

    async fn finish(&self, response: reqwest::Response) -> Result<TransportResponse> {
        self.remember_session_cookie(&response);
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::External(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, locale: Option<Locale>) -> Result<TransportResponse> {
        let url = normalize_url(path, locale);
        let response = self
            .apply_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::External(e.to_string()))?;
        self.finish(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        locale: Option<Locale>,
    ) -> Result<TransportResponse> {
        let url = normalize_url(path, locale);
        let response = self
            .apply_headers(self.client.post(&url))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::External(e.to_string()))?;
        self.finish(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_land_on_the_origin() {
        assert_eq!(
            normalize_url("chat/history?node=7", None),
            "https://funpay.com/chat/history?node=7"
        );
        assert_eq!(normalize_url("/runner/", None), "https://funpay.com/runner/");
        assert_eq!(normalize_url("https://funpay.com", None), "https://funpay.com/");
    }

    #[test]
    fn locale_prefix_is_inserted_exactly_once() {
        assert_eq!(
            normalize_url("orders/trade", Some(Locale::En)),
            "https://funpay.com/en/orders/trade"
        );
        assert_eq!(
            normalize_url("https://funpay.com/en/orders/trade", Some(Locale::Uk)),
            "https://funpay.com/uk/orders/trade"
        );
    }

    #[test]
    fn ru_locale_stays_on_the_bare_origin() {
        assert_eq!(
            normalize_url("https://funpay.com/en/orders/trade", Some(Locale::Ru)),
            "https://funpay.com/orders/trade"
        );
        assert_eq!(
            normalize_url("orders/trade", None),
            "https://funpay.com/orders/trade"
        );
    }

    #[test]
    fn cookie_header_carries_key_and_session() {
        let transport = HttpTransport::new("gk123", None).unwrap();
        assert_eq!(transport.cookie_header(), "golden_key=gk123; cookie_prefs=1");
        *transport.phpsessid.lock().unwrap() = Some("abc".to_string());
        assert_eq!(
            transport.cookie_header(),
            "golden_key=gk123; cookie_prefs=1; PHPSESSID=abc"
        );
    }
}
