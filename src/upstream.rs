use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::UpstreamConfig;

pub const SYNTHESIZED_HEADER: &str = "x-demo-synthesized";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    pub fn json(status: StatusCode, payload: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: serde_json::to_vec(payload).unwrap_or_default(),
        }
    }

    pub fn synthesized(payload: &Value) -> Self {
        let mut response = Self::json(StatusCode::OK, payload);
        response.headers.insert(
            HeaderName::from_static(SYNTHESIZED_HEADER),
            HeaderValue::from_static("1"),
        );
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_synthesized(&self) -> bool {
        self.headers.contains_key(SYNTHESIZED_HEADER)
    }

    pub fn parse_json(&self) -> Result<Value, String> {
        serde_json::from_slice(&self.body)
            .map_err(|err| format!("response body is not JSON: {}", err))
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, String>;

    fn describe(&self) -> String;
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, String> {
        HttpUpstream::new(Duration::from_millis(config.timeout_ms))
    }

    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("failed to build upstream client: {}", err))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, String> {
        let headers = forwardable(&request.headers, &["host", "content-length", "accept-encoding"]);
        let response = self
            .client
            .request(request.method, request.url.as_str())
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|err| format!("upstream request failed: {}", err))?;

        let status = response.status();
        let headers = forwardable(response.headers(), &["content-length"]);
        let body = response
            .bytes()
            .await
            .map_err(|err| format!("upstream body read failed: {}", err))?;

        Ok(OutboundResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    fn describe(&self) -> String {
        "http".to_string()
    }
}

fn forwardable(headers: &HeaderMap, extra: &[&str]) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !HOP_BY_HOP.contains(&name) && !extra.contains(&name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

pub struct OutboundSlot {
    current: RwLock<Arc<dyn Upstream>>,
}

impl OutboundSlot {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            current: RwLock::new(upstream),
        }
    }

    pub async fn current(&self) -> Arc<dyn Upstream> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, next: Arc<dyn Upstream>) -> Arc<dyn Upstream> {
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, next)
    }

    pub async fn wrap<F>(&self, build: F) -> Arc<dyn Upstream>
    where
        F: FnOnce(Arc<dyn Upstream>) -> Arc<dyn Upstream>,
    {
        let mut guard = self.current.write().await;
        let captured = guard.clone();
        *guard = build(captured.clone());
        captured
    }

    pub async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, String> {
        let upstream = self.current().await;
        upstream.send(request).await
    }
}
