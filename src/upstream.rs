use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use reqwest::{Client, redirect::Policy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("network unreachable: {0}")]
    Unreachable(String),
}

/// A request leaving the page, as seen by the gateway.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// A fully buffered response. Cloning it is how a response gets "teed" into
/// the cache while the original goes back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "body_base64")]
    pub body: Vec<u8>,
}

mod body_base64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

impl ResponseSnapshot {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The synthetic response served when neither the network nor the cache
    /// can answer.
    pub fn offline() -> Self {
        Self {
            status: 503,
            reason: Some("Service Unavailable".to_string()),
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: b"Offline".to_vec(),
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot, FetchError>;
}

pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot, FetchError> {
        if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
            return Err(FetchError::Unsupported(request.url.clone()));
        }

        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| FetchError::Unsupported(request.method.to_string()))?;

        let mut outbound = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name.as_str()) {
                outbound = outbound.header(name.as_str(), value.as_bytes());
            }
        }
        if !request.body.is_empty() {
            outbound = outbound.body(request.body.to_vec());
        }

        let response = outbound.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ResponseSnapshot {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }
}

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}
