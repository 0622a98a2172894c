use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    /**
        Whether requests with this method carry the license challenge as body.
    */
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/**
    Stage an exchange had reached, mirroring the XHR ready states.
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadyState {
    #[default]
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl ReadyState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsent => "UNSENT",
            Self::Opened => "OPENED",
            Self::HeadersReceived => "HEADERS_RECEIVED",
            Self::Loading => "LOADING",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Send cookies and other credentials with the request.
    pub with_credentials: bool,
}

impl HttpRequest {
    /**
        First header value with the given name, compared case-insensitively.
    */
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            status: Some(self.status),
            status_text: self.status_text.clone(),
            ready_state: ReadyState::Done,
        }
    }
}

/**
    Status fields of an exchange captured when it ended.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeSnapshot {
    pub status: Option<u16>,
    pub status_text: String,
    pub ready_state: ReadyState,
}

impl ExchangeSnapshot {
    pub fn at(ready_state: ReadyState) -> Self {
        Self {
            ready_state,
            ..Self::default()
        }
    }
}

/**
    A license exchange that ended without a complete response.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("exchange aborted at {}", .0.ready_state)]
    Aborted(ExchangeSnapshot),

    #[error("{reason}")]
    Network {
        reason: String,
        snapshot: ExchangeSnapshot,
    },
}

impl TransportFailure {
    pub fn network(reason: impl Into<String>, snapshot: ExchangeSnapshot) -> Self {
        Self::Network {
            reason: reason.into(),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &ExchangeSnapshot {
        match self {
            Self::Aborted(snapshot) | Self::Network { snapshot, .. } => snapshot,
        }
    }
}

/**
    Performs one HTTP exchange with a license server.

    Implementations report any non-2xx status as a normal response; only
    exchanges that did not produce a response are failures.
*/
#[async_trait]
pub trait LicenseTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

#[async_trait]
impl<T: LicenseTransport + ?Sized> LicenseTransport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        (**self).send(request).await
    }
}

/**
    [`LicenseTransport`] backed by reqwest.

    Credentialed exchanges go through a separate client with a cookie store,
    so cookies set by one license server are replayed only when asked for.
*/
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    credentialed: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            credentialed: reqwest::Client::builder().cookie_store(true).build()?,
        })
    }

    pub fn with_clients(client: reqwest::Client, credentialed: reqwest::Client) -> Self {
        Self {
            client,
            credentialed,
        }
    }
}

#[async_trait]
impl LicenseTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let client = if request.with_credentials {
            &self.credentialed
        } else {
            &self.client
        };

        let mut builder = client.request(request.method.into(), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            let stage = if e.is_builder() {
                ReadyState::Unsent
            } else {
                ReadyState::Opened
            };
            TransportFailure::network(e.to_string(), ExchangeSnapshot::at(stage))
        })?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        // Headers arrived; a failure from here on is the body being cut off.
        let body = response.bytes().await.map_err(|_| {
            TransportFailure::Aborted(ExchangeSnapshot {
                status: Some(status.as_u16()),
                status_text: status_text.clone(),
                ready_state: ReadyState::Loading,
            })
        })?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            body,
        })
    }
}

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
}
