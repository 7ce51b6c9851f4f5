//! Clients for the peer services that own media and users.
//!
//! The file service owns stored images and PDFs by key, the media service
//! resolves video references, the user service identifies the caller. Every
//! peer wraps its payload in the same `{status_code, message, data}`
//! envelope.

use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// Deletes stored blobs and resolves their display URLs.
pub trait FileGateway: Send + Sync + 'static {
    fn delete_image(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn delete_pdf(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn image_url(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
    fn pdf_url(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Resolves video references to playable URLs.
pub trait MediaGateway: Send + Sync + 'static {
    fn video_url(
        &self,
        video_id: &str,
        language: Option<i32>,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Identifies the user behind a bearer token.
pub trait UserGateway: Send + Sync + 'static {
    fn current_user(&self, token: &str)
        -> impl Future<Output = Result<Option<CurrentUser>>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// A peer answered with a non-success status, either at the HTTP level or
/// inside its response envelope.
#[derive(Debug, thiserror::Error)]
#[error("{service} returned {status}: {message}")]
pub struct UpstreamStatus {
    pub service: &'static str,
    pub status: u16,
    pub message: String,
}

/// Client errors other than 429 are permanent; everything else (5xx,
/// network, timeouts) may be transient.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<UpstreamStatus>() {
        Some(upstream) => upstream.status == 429 || upstream.status >= 500,
        None => true,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct FileUrlRequest<'a> {
    key: &'a str,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct VideoFolder {
    #[serde(default)]
    video_url: String,
}

/// Shared HTTP plumbing for one peer service.
#[derive(Debug, Clone)]
struct PeerClient {
    service: &'static str,
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PeerClient {
    fn new(service: &'static str, http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            service,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token.or(self.token.as_deref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.service))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(UpstreamStatus {
                service: self.service,
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.service))?;

        match envelope.status_code {
            Some(code) if code != 200 => Err(UpstreamStatus {
                service: self.service,
                status: code,
                message: envelope.message,
            }
            .into()),
            _ => Ok(envelope.data),
        }
    }

    async fn delete(&self, path: &str, operation: &str) -> Result<()> {
        let url = self.endpoint(path);
        with_retry_if(
            &RetryConfig::blob_delete(),
            operation,
            || async {
                self.call::<serde_json::Value>(self.authorize(self.http.delete(&url), None))
                    .await
                    .map(|_| ())
            },
            is_retryable,
        )
        .await
    }
}

/// HTTP client for the file service.
#[derive(Debug, Clone)]
pub struct HttpFileGateway {
    peer: PeerClient,
}

impl HttpFileGateway {
    pub fn new(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            peer: PeerClient::new("file service", http, base_url, token),
        }
    }

    async fn file_url(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let url = self.peer.endpoint(&format!("/v1/gateway/{}/get-url", kind));
        let body = FileUrlRequest { key, mode: "public" };
        let resolved: Option<String> = with_retry_if(
            &RetryConfig::gateway_lookup(),
            &format!("resolve {} url", kind),
            || async {
                self.peer
                    .call(self.peer.authorize(self.peer.http.post(&url), None).json(&body))
                    .await
            },
            is_retryable,
        )
        .await?;
        Ok(resolved.filter(|u| !u.is_empty()))
    }
}

impl FileGateway for HttpFileGateway {
    async fn delete_image(&self, key: &str) -> Result<()> {
        debug!(key, "Deleting image");
        self.peer
            .delete(&format!("/v1/gateway/images/{}", key), "delete image")
            .await
    }

    async fn delete_pdf(&self, key: &str) -> Result<()> {
        debug!(key, "Deleting pdf");
        self.peer
            .delete(&format!("/v1/gateway/pdfs/{}", key), "delete pdf")
            .await
    }

    async fn image_url(&self, key: &str) -> Result<Option<String>> {
        self.file_url("images", key).await
    }

    async fn pdf_url(&self, key: &str) -> Result<Option<String>> {
        self.file_url("pdfs", key).await
    }
}

/// HTTP client for the media service.
#[derive(Debug, Clone)]
pub struct HttpMediaGateway {
    peer: PeerClient,
}

impl HttpMediaGateway {
    pub fn new(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            peer: PeerClient::new("media service", http, base_url, token),
        }
    }
}

impl MediaGateway for HttpMediaGateway {
    async fn video_url(&self, video_id: &str, language: Option<i32>) -> Result<Option<String>> {
        let mut url = self
            .peer
            .endpoint(&format!("/api/v1/gateway/upload/video_folders/{}", video_id));
        if let Some(language) = language {
            url.push_str(&format!("?language_id={}", language));
        }

        let folder: Option<VideoFolder> = with_retry_if(
            &RetryConfig::gateway_lookup(),
            "resolve video url",
            || async {
                self.peer
                    .call(self.peer.authorize(self.peer.http.get(&url), None))
                    .await
            },
            is_retryable,
        )
        .await?;

        Ok(folder.map(|f| f.video_url).filter(|u| !u.is_empty()))
    }
}

/// HTTP client for the user service.
#[derive(Debug, Clone)]
pub struct HttpUserGateway {
    peer: PeerClient,
}

impl HttpUserGateway {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            peer: PeerClient::new("user service", http, base_url, None),
        }
    }
}

impl UserGateway for HttpUserGateway {
    async fn current_user(&self, token: &str) -> Result<Option<CurrentUser>> {
        let url = self.peer.endpoint("/v1/gateway/users/current-user");
        self.peer
            .call(self.peer.authorize(self.peer.http.get(&url), Some(token)))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn files(server: &MockServer) -> HttpFileGateway {
        HttpFileGateway::new(reqwest::Client::new(), &server.uri(), Some("svc-token".to_string()))
    }

    fn ok(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 200,
            "message": "ok",
            "data": data,
        }))
    }

    // ==================== FileGateway Tests ====================

    #[tokio::test]
    async fn test_delete_image_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/gateway/images/a.png"))
            .and(header("Authorization", "Bearer svc-token"))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        files(&server).delete_image("a.png").await.expect("delete succeeds");
    }

    #[tokio::test]
    async fn test_delete_pdf_hits_pdf_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/gateway/pdfs/f.pdf"))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        files(&server).delete_pdf("f.pdf").await.expect("delete succeeds");
    }

    #[tokio::test]
    async fn test_delete_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/gateway/images/gone.png"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = files(&server).delete_image("gone.png").await.unwrap_err();

        let upstream = err.downcast_ref::<UpstreamStatus>().expect("upstream status");
        assert_eq!(upstream.status, 404);
        assert!(!is_retryable(&err));
    }

    #[tokio::test]
    async fn test_envelope_status_is_checked() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/gateway/images/x.png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 400,
                "message": "invalid key",
                "data": null,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = files(&server).delete_image("x.png").await.unwrap_err();
        assert!(err.to_string().contains("invalid key"));
    }

    #[tokio::test]
    async fn test_image_url_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/gateway/images/get-url"))
            .and(body_json(json!({"key": "a.png", "mode": "public"})))
            .respond_with(ok(json!("https://cdn.example/a.png")))
            .mount(&server)
            .await;

        let url = files(&server).image_url("a.png").await.expect("lookup succeeds");
        assert_eq!(url.as_deref(), Some("https://cdn.example/a.png"));
    }

    #[tokio::test]
    async fn test_empty_url_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/gateway/pdfs/get-url"))
            .respond_with(ok(json!("")))
            .mount(&server)
            .await;

        assert_eq!(files(&server).pdf_url("f.pdf").await.unwrap(), None);
    }

    // ==================== MediaGateway Tests ====================

    #[tokio::test]
    async fn test_video_url_with_language() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/gateway/upload/video_folders/vid-1"))
            .and(query_param("language_id", "2"))
            .respond_with(ok(json!({"id": "vid-1", "video_url": "https://v.example/1.m3u8"})))
            .mount(&server)
            .await;

        let media = HttpMediaGateway::new(reqwest::Client::new(), &server.uri(), None);
        let url = media.video_url("vid-1", Some(2)).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://v.example/1.m3u8"));
    }

    // ==================== UserGateway Tests ====================

    #[tokio::test]
    async fn test_current_user_forwards_caller_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gateway/users/current-user"))
            .and(header("Authorization", "Bearer caller-token"))
            .respond_with(ok(json!({"id": "u-1", "username": "editor"})))
            .mount(&server)
            .await;

        let users = HttpUserGateway::new(reqwest::Client::new(), &server.uri());
        let user = users.current_user("caller-token").await.unwrap().expect("user");
        assert_eq!(user.id, "u-1");
        assert_eq!(user.username, "editor");
    }

    // ==================== Retry classification ====================

    #[test]
    fn test_is_retryable() {
        let status = |status| {
            anyhow::Error::from(UpstreamStatus {
                service: "file service",
                status,
                message: String::new(),
            })
        };
        assert!(is_retryable(&status(500)));
        assert!(is_retryable(&status(503)));
        assert!(is_retryable(&status(429)));
        assert!(!is_retryable(&status(400)));
        assert!(!is_retryable(&status(401)));
        assert!(is_retryable(&anyhow::anyhow!("connection reset")));
    }
}
