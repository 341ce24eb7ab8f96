//! Single point through which every registry request is sent.
//!
//! Applies the TLS policy and Basic auth from [`RegistryClientConfig`] and
//! turns any status other than the one the caller expects into a
//! [`RequestError`]. Nothing is retried.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Certificate, Client, Method, Response, StatusCode};
use tracing::{debug, error, warn};

use crate::config::RegistryClientConfig;
use crate::error::{ConfigError, RequestError};

pub struct HttpAdapter {
    client: Client,
    config: RegistryClientConfig,
}

impl HttpAdapter {
    pub fn new(config: RegistryClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();

        if let Some(path) = config.ca_bundle() {
            let pem = std::fs::read(path).map_err(|e| ConfigError::Certificate {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let certs =
                Certificate::from_pem_bundle(&pem).map_err(|e| ConfigError::Certificate {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            // Verify against the configured bundle only.
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Send one request and require `expected` as the response status.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        expected: StatusCode,
        mut headers: HeaderMap,
    ) -> Result<Response, RequestError> {
        if self.config.login.is_auth {
            self.apply_auth(url, &mut headers);
        }

        debug!(%method, url, "registry request");
        let resp = self
            .client
            .request(method.clone(), url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                error!(%method, url, error = %e, "request error");
                RequestError::Transport(e)
            })?;

        let status = resp.status();
        if status == expected {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        warn!(
            %method,
            url,
            status = status.as_u16(),
            expected = expected.as_u16(),
            body = %body.trim(),
            "unexpected response status"
        );

        if status == StatusCode::NOT_FOUND {
            Err(RequestError::NotFound(url.to_string()))
        } else {
            Err(RequestError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Adds `Authorization: Basic` for the URL's authority, keeping every
    /// caller-supplied header. A missing credential is logged and the
    /// request goes out unauthenticated.
    fn apply_auth(&self, url: &str, headers: &mut HeaderMap) {
        let Some(authority) = authority(url) else {
            warn!(url, "cannot determine authority for auth lookup");
            return;
        };

        let Some(token) = self.config.credential_for(&authority) else {
            warn!(authority = %authority, "no auth data for registry host");
            return;
        };

        match HeaderValue::from_str(&format!("Basic {}", token)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => warn!(authority = %authority, error = %e, "invalid auth token"),
        }
    }
}

/// `host[:port]` of a URL exactly as written, the key used in the
/// credential map. An explicit default port such as `:443` is kept.
pub fn authority(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let netloc = &rest[..end];
    let host = netloc.rsplit_once('@').map_or(netloc, |(_, host)| host);
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use reqwest::header::ACCEPT;

    fn adapter(auths: &[(&str, &str)]) -> HttpAdapter {
        HttpAdapter::new(RegistryClientConfig::for_tests(auths)).unwrap()
    }

    #[test]
    fn test_authority_includes_explicit_port() {
        assert_eq!(
            authority("http://localhost:5000/v2/_catalog").as_deref(),
            Some("localhost:5000")
        );
        assert_eq!(
            authority("https://registry.example.com/v2/").as_deref(),
            Some("registry.example.com")
        );
        assert_eq!(authority("not a url"), None);
    }

    #[test]
    fn test_authority_keeps_default_port() {
        assert_eq!(
            authority("https://registry.example.com:443/v2/_catalog").as_deref(),
            Some("registry.example.com:443")
        );
        assert_eq!(
            authority("http://user:pw@reg:80?x=1").as_deref(),
            Some("reg:80")
        );
        assert_eq!(authority("http:///v2/"), None);
    }

    #[test]
    fn test_default_port_key_injects_credential() {
        let http = adapter(&[("registry.example.com:443", "dXNlcjpwYXNz")]);
        let mut headers = HeaderMap::new();
        http.apply_auth("https://registry.example.com:443/v2/_catalog", &mut headers);
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Basic dXNlcjpwYXNz")
        );

        let mut headers = HeaderMap::new();
        http.apply_auth("https://registry.example.com/v2/_catalog", &mut headers);
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_expected_status_returns_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/_catalog")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let http = adapter(&[]);
        let url = format!("{}/v2/_catalog", server.url());
        let resp = http
            .execute(Method::GET, &url, StatusCode::OK, HeaderMap::new())
            .await;

        mock.assert_async().await;
        assert!(resp.is_ok());
    }

    #[tokio::test]
    async fn test_other_status_is_soft_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v2/app/manifests/sha256:abc")
            .with_status(405)
            .with_body("deletes disabled")
            .create_async()
            .await;

        let http = adapter(&[]);
        let url = format!("{}/v2/app/manifests/sha256:abc", server.url());
        let err = http
            .execute(Method::DELETE, &url, StatusCode::ACCEPTED, HeaderMap::new())
            .await
            .unwrap_err();

        match err {
            RequestError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 405);
                assert_eq!(body, "deletes disabled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_status_other_than_expected_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v2/app/manifests/sha256:abc")
            .with_status(200)
            .create_async()
            .await;

        let http = adapter(&[]);
        let url = format!("{}/v2/app/manifests/sha256:abc", server.url());
        let err = http
            .execute(Method::DELETE, &url, StatusCode::ACCEPTED, HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::UnexpectedStatus { status: 200, .. }
        ));
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/missing/tags/list")
            .with_status(404)
            .create_async()
            .await;

        let http = adapter(&[]);
        let url = format!("{}/v2/missing/tags/list", server.url());
        let err = http
            .execute(Method::GET, &url, StatusCode::OK, HeaderMap::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let http = adapter(&[]);
        let err = http
            .execute(
                Method::GET,
                "http://127.0.0.1:1/v2/_catalog",
                StatusCode::OK,
                HeaderMap::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }

    #[tokio::test]
    async fn test_auth_header_merged_with_caller_headers() {
        let mut server = mockito::Server::new_async().await;
        let authority = authority(&server.url()).unwrap();
        let mock = server
            .mock("HEAD", "/v2/app/manifests/v1")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_header("accept", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let http = adapter(&[(authority.as_str(), "dXNlcjpwYXNz")]);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let url = format!("{}/v2/app/manifests/v1", server.url());
        let resp = http
            .execute(Method::HEAD, &url, StatusCode::OK, headers)
            .await;

        mock.assert_async().await;
        assert!(resp.is_ok());
    }

    #[tokio::test]
    async fn test_missing_credential_proceeds_unauthenticated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/_catalog")
            .match_header("authorization", Matcher::Missing)
            .match_header("accept", "application/json")
            .with_status(200)
            .create_async()
            .await;

        // Auth is on, but only for some other host.
        let http = adapter(&[("other.example.com:5000", "dXNlcjpwYXNz")]);
        assert!(http.config.login.is_auth);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let url = format!("{}/v2/_catalog", server.url());
        let resp = http
            .execute(Method::GET, &url, StatusCode::OK, headers)
            .await;

        mock.assert_async().await;
        assert!(resp.is_ok());
    }

    #[test]
    fn test_unreadable_cert_bundle_is_config_error() {
        let mut config = RegistryClientConfig::for_tests(&[]);
        config.ssl.is_https = true;
        config.ssl.certs = Some("/nonexistent/ca.pem".into());
        let err = HttpAdapter::new(config).err().unwrap();
        assert!(matches!(err, ConfigError::Certificate { .. }));
    }
}
