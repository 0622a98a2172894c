use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::{Instrument, debug, info_span, warn};
use url::Url;

use drm_core::{KeySystemRegistry, eq_ignore_ascii_case};

use crate::adapter::{AdapterTable, RawResponse};
use crate::bus::{Completion, NotificationBus};
use crate::clearkey;
use crate::config::DispatcherConfig;
use crate::error::{ClearKeyError, DispatcherError, LicenseRequestError, TransportDiagnostic};
use crate::message::{LicenseMessage, LicenseRequestResult, SessionToken};
use crate::protection_data::ProtectionData;
use crate::transport::{
    ExchangeSnapshot, HttpRequest, LicenseTransport, ReadyState, TransportFailure,
};

const AUTHORIZATION: &str = "Authorization";

/**
    Everything needed to negotiate one license.
*/
#[derive(Debug, Clone)]
pub struct LicenseRequest {
    pub key_system: String,
    pub protection_data: Option<ProtectionData>,
    pub message: LicenseMessage,
    /// License URL from the manifest, used when protection data has none.
    pub fallback_url: Option<String>,
    pub session_token: SessionToken,
    /// Init data the session was created with; may carry a license URL.
    pub init_data: Option<Bytes>,
}

impl LicenseRequest {
    pub fn new(
        key_system: impl Into<String>,
        message: LicenseMessage,
        session_token: impl Into<SessionToken>,
    ) -> Self {
        Self {
            key_system: key_system.into(),
            protection_data: None,
            message,
            fallback_url: None,
            session_token: session_token.into(),
            init_data: None,
        }
    }

    pub fn with_protection_data(mut self, protection_data: ProtectionData) -> Self {
        self.protection_data = Some(protection_data);
        self
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn with_init_data(mut self, init_data: impl Into<Bytes>) -> Self {
        self.init_data = Some(init_data.into());
        self
    }
}

/**
    Drives license requests to exactly one terminal event each.

    Cheap to clone; clones share the registry, adapters, transport and bus.
*/
#[derive(Clone)]
pub struct LicenseRequestDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<KeySystemRegistry>,
    adapters: Arc<AdapterTable>,
    transport: Arc<dyn LicenseTransport>,
    bus: Arc<dyn NotificationBus>,
    config: DispatcherConfig,
    runtime: Handle,
}

pub struct LicenseRequestDispatcherBuilder {
    registry: Option<Arc<KeySystemRegistry>>,
    adapters: Option<Arc<AdapterTable>>,
    transport: Arc<dyn LicenseTransport>,
    bus: Arc<dyn NotificationBus>,
    config: DispatcherConfig,
    runtime: Option<Handle>,
}

impl LicenseRequestDispatcherBuilder {
    pub fn registry(mut self, registry: Arc<KeySystemRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn adapters(mut self, adapters: AdapterTable) -> Self {
        self.adapters = Some(Arc::new(adapters));
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /**
        Runtime to spawn requests on. Defaults to the runtime `build` is
        called from.
    */
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<LicenseRequestDispatcher, DispatcherError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| DispatcherError::NoRuntime)?,
        };
        Ok(LicenseRequestDispatcher {
            inner: Arc::new(Inner {
                registry: self
                    .registry
                    .unwrap_or_else(|| Arc::new(KeySystemRegistry::with_defaults())),
                adapters: self
                    .adapters
                    .unwrap_or_else(|| Arc::new(AdapterTable::with_defaults())),
                transport: self.transport,
                bus: self.bus,
                config: self.config,
                runtime,
            }),
        })
    }
}

impl LicenseRequestDispatcher {
    /**
        Start building a dispatcher. The default registry and adapter table
        are used unless replaced.
    */
    pub fn builder(
        transport: impl LicenseTransport + 'static,
        bus: impl NotificationBus + 'static,
    ) -> LicenseRequestDispatcherBuilder {
        LicenseRequestDispatcherBuilder {
            registry: None,
            adapters: None,
            transport: Arc::new(transport),
            bus: Arc::new(bus),
            config: DispatcherConfig::default(),
            runtime: None,
        }
    }

    pub fn registry(&self) -> &KeySystemRegistry {
        &self.inner.registry
    }

    /**
        Dispatch a request and return immediately.

        The terminal [`LicenseRequestResult`] is published on the bus from a
        spawned task, so it is never delivered before this call returns.
    */
    pub fn send_license_request(&self, request: LicenseRequest) {
        let completion = Completion::new(
            self.inner.bus.clone(),
            request.session_token.clone(),
            request.message.message_type,
        );
        let dispatcher = self.clone();
        self.inner.runtime.spawn(async move {
            let outcome = dispatcher.run(&request).await;
            completion.resolve(outcome);
        });
    }

    /**
        Run a request to completion on the current task and return its
        result instead of publishing it.
    */
    pub async fn execute(&self, request: &LicenseRequest) -> LicenseRequestResult {
        let session_token = request.session_token.clone();
        let message_type = request.message.message_type;
        match self.run(request).await {
            Ok(payload) => LicenseRequestResult::completed(session_token, message_type, payload),
            Err(error) => LicenseRequestResult::failed(session_token, message_type, error),
        }
    }

    async fn run(&self, request: &LicenseRequest) -> Result<Option<Bytes>, LicenseRequestError> {
        let span = info_span!(
            "license_request",
            session = %request.session_token,
            key_system = %request.key_system,
            message_type = %request.message.message_type,
        );
        let result = self.resolve_and_send(request).instrument(span.clone()).await;
        if let Err(error) = &result {
            span.in_scope(|| warn!(kind = ?error.kind(), "license request failed: {error}"));
        }
        result
    }

    async fn resolve_and_send(
        &self,
        request: &LicenseRequest,
    ) -> Result<Option<Bytes>, LicenseRequestError> {
        let message_type = request.message.message_type;
        if !message_type.requires_network() {
            debug!("completed without a license server");
            return Ok(None);
        }

        let protection_data = request.protection_data.as_ref();
        let key_system = self
            .inner
            .registry
            .lookup_by_system_string(&request.key_system)
            .ok_or_else(|| LicenseRequestError::UnresolvedKeySystem(request.key_system.clone()))?;
        let identity = protection_data
            .and_then(ProtectionData::provider_marker)
            .unwrap_or(request.key_system.as_str());
        let adapter = self
            .inner
            .adapters
            .resolve(identity)
            .ok_or_else(|| LicenseRequestError::UnresolvedKeySystem(identity.to_string()))?;
        debug!(adapter = adapter.name(), "resolved license server adapter");

        if self.inner.registry.is_designated_clear_key(key_system)
            && let Some(data) = protection_data.filter(|d| d.has_clear_keys())
        {
            let keys = clearkey::local_key_set(&request.message.data, data)?;
            debug!(keys = keys.keys.len(), "answered from embedded clear keys");
            let json = keys
                .to_json()
                .map_err(|e| ClearKeyError::Encode(e.to_string()))?;
            return Ok(Some(Bytes::from(json)));
        }

        let capabilities = key_system.capabilities();
        let base_url = protection_data
            .and_then(ProtectionData::server_url)
            .map(str::to_string)
            .or_else(|| request.fallback_url.clone().filter(|url| !url.is_empty()))
            .or_else(|| {
                request
                    .init_data
                    .as_deref()
                    .and_then(|init| capabilities.license_url_from_init_data(init))
            })
            .ok_or(LicenseRequestError::MissingLicenseUrl)?;
        let url = adapter
            .resolve_url(&base_url, &request.message.data, message_type)
            .filter(|url| !url.is_empty())
            .ok_or(LicenseRequestError::MissingLicenseUrl)?;
        let url = Url::parse(&url).map_err(|e| LicenseRequestError::InvalidLicenseUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let method = adapter.http_method(message_type);
        let encoding = adapter.response_encoding(&request.key_system, message_type);
        let body = if method.has_body() {
            Some(Bytes::from(capabilities.license_request(&request.message.data)?))
        } else {
            None
        };
        let headers = merge_headers(
            capabilities.request_headers(&request.message.data)?,
            protection_data,
        );
        let with_credentials = protection_data.is_some_and(|d| d.with_credentials)
            || headers
                .iter()
                .any(|(name, _)| eq_ignore_ascii_case(name, AUTHORIZATION));

        let http_request = HttpRequest {
            method,
            url: url.clone(),
            headers,
            body,
            with_credentials,
        };
        debug!(%method, %url, with_credentials, "awaiting license server");

        let exchange = self.inner.transport.send(http_request);
        let response = match self.inner.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange).await.map_err(|_| {
                LicenseRequestError::TimedOut {
                    timeout,
                    diagnostic: TransportDiagnostic::from_snapshot(
                        url.as_str(),
                        ExchangeSnapshot::at(ReadyState::Opened),
                    ),
                }
            })?,
            None => exchange.await,
        }
        .map_err(|failure| transport_error(url.as_str(), failure))?;

        let success = response.is_success();
        let raw = RawResponse::new(response, encoding);
        if success {
            let license = adapter.decode_license(&raw, &request.key_system, message_type)?;
            debug!(bytes = license.len(), "license received");
            Ok(Some(Bytes::from(license)))
        } else {
            let body = adapter.decode_error(&raw, &request.key_system, message_type);
            Err(LicenseRequestError::ServerStatus(TransportDiagnostic {
                url: url.to_string(),
                status: Some(raw.status),
                status_text: raw.status_text,
                ready_state: ReadyState::Done,
                body: Some(body).filter(|b| !b.is_empty()),
            }))
        }
    }
}

/**
    Message-derived headers first, then protection data headers, replacing
    any of the same name regardless of case.
*/
fn merge_headers(
    mut headers: Vec<(String, String)>,
    protection_data: Option<&ProtectionData>,
) -> Vec<(String, String)> {
    let Some(data) = protection_data else {
        return headers;
    };
    for (name, value) in &data.http_request_headers {
        headers.retain(|(existing, _)| !eq_ignore_ascii_case(existing, name));
        headers.push((name.clone(), value.clone()));
    }
    headers
}

fn transport_error(url: &str, failure: TransportFailure) -> LicenseRequestError {
    match failure {
        TransportFailure::Aborted(snapshot) => {
            LicenseRequestError::TransportAborted(TransportDiagnostic::from_snapshot(url, snapshot))
        }
        TransportFailure::Network { reason, snapshot } => LicenseRequestError::TransportFailed {
            reason,
            diagnostic: TransportDiagnostic::from_snapshot(url, snapshot),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_headers_override_by_name() {
        let message_headers = vec![
            ("Content-Type".to_string(), "text/xml; charset=utf-8".to_string()),
            ("SOAPAction".to_string(), "acquire".to_string()),
        ];
        let data = ProtectionData::default()
            .with_header("content-type", "application/octet-stream")
            .with_header("X-Token", "abc");
        let merged = merge_headers(message_headers, Some(&data));
        assert_eq!(
            merged,
            vec![
                ("SOAPAction".to_string(), "acquire".to_string()),
                ("X-Token".to_string(), "abc".to_string()),
                ("content-type".to_string(), "application/octet-stream".to_string()),
            ]
        );
    }

    #[test]
    fn headers_without_protection_data_are_unchanged() {
        let headers = vec![("A".to_string(), "1".to_string())];
        assert_eq!(merge_headers(headers.clone(), None), headers);
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl LicenseTransport for Unreachable {
        async fn send(
            &self,
            _request: HttpRequest,
        ) -> Result<crate::transport::HttpResponse, TransportFailure> {
            Err(TransportFailure::Aborted(ExchangeSnapshot::default()))
        }
    }

    #[test]
    fn build_requires_runtime() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = LicenseRequestDispatcher::builder(Unreachable, tx)
            .build()
            .err()
            .unwrap();
        assert_eq!(err, DispatcherError::NoRuntime);
    }
}
