use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};

use drm_core::playready::build_pro;
use drm_core::{
    CLEARKEY_KEY_SYSTEM, PLAYREADY_KEY_SYSTEM, PsshBox, SystemId, WIDEVINE_KEY_SYSTEM,
};
use drm_license::{
    ClearKeyError, DispatcherConfig, ErrorKind, ExchangeSnapshot, HttpMethod, HttpRequest,
    HttpResponse, LicenseMessage, LicenseRequest, LicenseRequestDispatcher, LicenseRequestError,
    LicenseRequestResult, LicenseTransport, MessageType, ProtectionData, ReadyState,
    TransportFailure,
};

const LICENSE_URL: &str = "https://license.example.com/wv";
const KID: &str = "nrQFDeRLSAKTLifXUIPiZg";
const KEY: &str = "FmY0xnWCPCNaSpRG-tUuTQ";

enum Reply {
    Respond(u16, &'static [u8]),
    Fail(TransportFailure),
    Hang,
}

/**
    Transport that records every request and answers with a fixed reply.
*/
struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    reply: Reply,
}

impl MockTransport {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply,
        })
    }

    fn ok(body: &'static [u8]) -> Arc<Self> {
        Self::new(Reply::Respond(200, body))
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LicenseTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Reply::Respond(status, body) => {
                Ok(HttpResponse::new(*status, Bytes::from_static(body)))
            }
            Reply::Fail(failure) => Err(failure.clone()),
            Reply::Hang => std::future::pending().await,
        }
    }
}

fn dispatcher(
    transport: &Arc<MockTransport>,
) -> (LicenseRequestDispatcher, UnboundedReceiver<LicenseRequestResult>) {
    dispatcher_with_config(transport, DispatcherConfig::default())
}

fn dispatcher_with_config(
    transport: &Arc<MockTransport>,
    config: DispatcherConfig,
) -> (LicenseRequestDispatcher, UnboundedReceiver<LicenseRequestResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = LicenseRequestDispatcher::builder(transport.clone(), tx)
        .config(config)
        .build()
        .unwrap();
    (dispatcher, rx)
}

fn widevine_request(token: &str) -> LicenseRequest {
    LicenseRequest::new(
        WIDEVINE_KEY_SYSTEM,
        LicenseMessage::license_request(&b"\x08\x01\x12\x10challenge"[..]),
        token,
    )
}

/**
    Dispatch and wait for the single terminal event, checking nothing else
    is published for the request.
*/
async fn dispatch(
    dispatcher: &LicenseRequestDispatcher,
    rx: &mut UnboundedReceiver<LicenseRequestResult>,
    request: LicenseRequest,
) -> LicenseRequestResult {
    dispatcher.send_license_request(request);
    let result = rx.recv().await.unwrap();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    result
}

// ── Message types without a license server ──

#[tokio::test]
async fn release_completes_without_network() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = LicenseRequest::new(
        WIDEVINE_KEY_SYSTEM,
        LicenseMessage::new(MessageType::LicenseRelease, &b"release"[..]),
        "s1",
    )
    .with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(result.is_success());
    assert_eq!(result.payload, None);
    assert_eq!(result.message_type, MessageType::LicenseRelease);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn individualization_completes_without_network() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = LicenseRequest::new(
        "com.example.unregistered",
        LicenseMessage::new(MessageType::IndividualizationRequest, &b"indiv"[..]),
        "s1",
    );
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(result.is_success());
    assert_eq!(result.payload, None);
    assert!(transport.requests().is_empty());
}

// ── Resolution ──

#[tokio::test]
async fn unregistered_key_system_names_the_string() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = LicenseRequest::new(
        "com.example.unregistered",
        LicenseMessage::license_request(&b"msg"[..]),
        "s1",
    )
    .with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    let error = result.error.unwrap();
    assert_eq!(
        error,
        LicenseRequestError::UnresolvedKeySystem("com.example.unregistered".into())
    );
    assert!(error.to_string().contains("com.example.unregistered"));
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn unknown_provider_marker_is_unresolved() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_protection_data(
        ProtectionData::default()
            .with_server_url(LICENSE_URL)
            .with_license_provider("acme"),
    );
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert_eq!(
        result.error,
        Some(LicenseRequestError::UnresolvedKeySystem("acme".into()))
    );
    assert!(transport.requests().is_empty());
}

// ── URL selection ──

#[tokio::test]
async fn override_url_wins_over_fallback() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1")
        .with_protection_data(ProtectionData::default().with_server_url(LICENSE_URL))
        .with_fallback_url("https://manifest.example.com/license");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert_eq!(result.payload.as_deref(), Some(&b"license"[..]));
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.as_str(), LICENSE_URL);
    assert_eq!(requests[0].method, HttpMethod::Post);
    assert_eq!(
        requests[0].body.as_deref(),
        Some(&b"\x08\x01\x12\x10challenge"[..])
    );
}

#[tokio::test]
async fn fallback_url_used_without_override() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1")
        .with_protection_data(ProtectionData::default().with_server_url(""))
        .with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(result.is_success());
    assert_eq!(transport.requests()[0].url.as_str(), LICENSE_URL);
}

#[tokio::test]
async fn missing_url_fails_without_network() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let result = dispatch(&dispatcher, &mut rx, widevine_request("s1")).await;

    assert_eq!(result.error, Some(LicenseRequestError::MissingLicenseUrl));
    assert_eq!(result.error.unwrap().to_string(), "no license server URL");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn unparseable_url_fails() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_fallback_url("not a url");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(matches!(
        result.error,
        Some(LicenseRequestError::InvalidLicenseUrl { ref url, .. }) if url == "not a url"
    ));
    assert!(transport.requests().is_empty());
}

// ── Transport outcomes ──

#[tokio::test]
async fn not_found_yields_one_failure_with_status() {
    let transport = MockTransport::new(Reply::Respond(404, b"unknown asset"));
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    let error = result.error.unwrap();
    assert_eq!(error.kind(), ErrorKind::Transport);
    let diagnostic = error.diagnostic().unwrap();
    assert_eq!(diagnostic.status, Some(404));
    assert_eq!(diagnostic.status_text, "Not Found");
    assert_eq!(diagnostic.ready_state, ReadyState::Done);
    assert_eq!(diagnostic.body.as_deref(), Some("unknown asset"));
    assert!(error.to_string().contains("404"));
    assert_eq!(result.payload, None);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn network_failure_carries_snapshot() {
    let transport = MockTransport::new(Reply::Fail(TransportFailure::network(
        "connection refused",
        ExchangeSnapshot::at(ReadyState::Opened),
    )));
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    match result.error {
        Some(LicenseRequestError::TransportFailed { reason, diagnostic }) => {
            assert_eq!(reason, "connection refused");
            assert_eq!(diagnostic.status, None);
            assert_eq!(diagnostic.ready_state, ReadyState::Opened);
            assert_eq!(diagnostic.url, LICENSE_URL);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn aborted_exchange_is_reported() {
    let transport = MockTransport::new(Reply::Fail(TransportFailure::Aborted(ExchangeSnapshot {
        status: Some(200),
        status_text: "OK".into(),
        ready_state: ReadyState::Loading,
    })));
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    match result.error {
        Some(LicenseRequestError::TransportAborted(diagnostic)) => {
            assert_eq!(diagnostic.status, Some(200));
            assert_eq!(diagnostic.ready_state, ReadyState::Loading);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn configured_timeout_ends_a_hung_exchange() {
    let transport = MockTransport::new(Reply::Hang);
    let config = DispatcherConfig::default().with_request_timeout(Duration::from_millis(20));
    let (dispatcher, mut rx) = dispatcher_with_config(&transport, config);

    let request = widevine_request("s1").with_fallback_url(LICENSE_URL);
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(matches!(
        result.error,
        Some(LicenseRequestError::TimedOut { timeout, .. }) if timeout == Duration::from_millis(20)
    ));
    assert_eq!(transport.requests().len(), 1);
}

// ── Credentials and headers ──

#[tokio::test]
async fn credentials_flag_forces_credentialed_exchange() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_protection_data(
        ProtectionData::default()
            .with_server_url(LICENSE_URL)
            .with_credentials(true),
    );
    dispatch(&dispatcher, &mut rx, request).await;

    let requests = transport.requests();
    assert!(requests[0].with_credentials);
    assert_eq!(requests[0].header("authorization"), None);
}

#[tokio::test]
async fn authorization_header_forces_credentialed_exchange() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_protection_data(
        ProtectionData::default()
            .with_server_url(LICENSE_URL)
            .with_header("authorization", "Bearer token"),
    );
    dispatch(&dispatcher, &mut rx, request).await;

    let requests = transport.requests();
    assert!(requests[0].with_credentials);
    assert_eq!(requests[0].header("Authorization"), Some("Bearer token"));
}

#[tokio::test]
async fn plain_exchange_is_not_credentialed() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_protection_data(
        ProtectionData::default()
            .with_server_url(LICENSE_URL)
            .with_header("X-Custom", "1"),
    );
    dispatch(&dispatcher, &mut rx, request).await;

    let requests = transport.requests();
    assert!(!requests[0].with_credentials);
    assert_eq!(requests[0].header("x-custom"), Some("1"));
}

// ── Delivery ──

#[tokio::test]
async fn terminal_event_arrives_after_return() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    dispatcher.send_license_request(LicenseRequest::new(
        WIDEVINE_KEY_SYSTEM,
        LicenseMessage::new(MessageType::LicenseRelease, &b""[..]),
        "s1",
    ));
    // Nothing has run yet on this single-threaded runtime.
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

    let result = rx.recv().await.unwrap();
    assert_eq!(result.session_token.as_str(), "s1");
}

#[tokio::test]
async fn concurrent_requests_complete_once_each() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    for i in 0..5 {
        dispatcher.send_license_request(
            widevine_request(&format!("s{i}")).with_fallback_url(LICENSE_URL),
        );
    }

    let mut tokens = Vec::new();
    for _ in 0..5 {
        let result = rx.recv().await.unwrap();
        assert!(result.is_success());
        tokens.push(result.session_token.as_str().to_string());
    }
    tokens.sort();
    assert_eq!(tokens, ["s0", "s1", "s2", "s3", "s4"]);
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(transport.requests().len(), 5);
}

#[tokio::test]
async fn execute_returns_result_inline() {
    let transport = MockTransport::ok(b"license");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_fallback_url(LICENSE_URL);
    let result = dispatcher.execute(&request).await;

    assert_eq!(result.payload.as_deref(), Some(&b"license"[..]));
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

// ── Clear key ──

fn clear_key_request(message: &'static [u8]) -> LicenseRequest {
    LicenseRequest::new(
        CLEARKEY_KEY_SYSTEM,
        LicenseMessage::license_request(message),
        "ck",
    )
}

#[tokio::test]
async fn embedded_clear_keys_answer_locally() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = clear_key_request(br#"{"kids":["nrQFDeRLSAKTLifXUIPiZg"],"type":"temporary"}"#)
        .with_protection_data(ProtectionData::default().with_clear_key(KID, KEY))
        .with_fallback_url("https://ck.example.com");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    let payload: serde_json::Value = serde_json::from_slice(&result.payload.unwrap()).unwrap();
    assert_eq!(payload["type"], "temporary");
    assert_eq!(payload["keys"][0]["kty"], "oct");
    assert_eq!(payload["keys"][0]["kid"], KID);
    assert_eq!(payload["keys"][0]["k"], KEY);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn clear_key_decode_failure_skips_network() {
    let transport = MockTransport::ok(b"unused");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = clear_key_request(br#"{"kids":["nrQFDeRLSAKTLifXUIPiZg"]}"#)
        .with_protection_data(ProtectionData::default().with_clear_key(KID, "!!!"))
        .with_fallback_url("https://ck.example.com");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    let error = result.error.unwrap();
    assert!(matches!(
        error,
        LicenseRequestError::ClearKeyDecode(ClearKeyError::InvalidKey { .. })
    ));
    assert_eq!(error.kind(), ErrorKind::Decode);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn clear_key_without_embedded_kid_fails_locally() {
    let transport = MockTransport::ok(br#"{"keys":[],"type":"temporary"}"#);
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = clear_key_request(br#"{"kids":["nrQFDeRLSAKTLifXUIPiZg"]}"#)
        .with_protection_data(
            ProtectionData::default().with_clear_key("AAAAAAAAAAAAAAAAAAAAAA", KEY),
        )
        .with_fallback_url("https://ck.example.com/keys");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert_eq!(result.payload, None);
    assert_eq!(
        result.error,
        Some(LicenseRequestError::ClearKeyDecode(ClearKeyError::UnknownKeyId(KID.into())))
    );
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn clear_key_server_gets_kids_in_query() {
    let transport = MockTransport::ok(
        br#"{"keys":[{"kty":"oct","kid":"nrQFDeRLSAKTLifXUIPiZg","k":"FmY0xnWCPCNaSpRG-tUuTQ"}]}"#,
    );
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = clear_key_request(br#"{"kids":["nrQFDeRLSAKTLifXUIPiZg"]}"#)
        .with_fallback_url("https://ck.example.com/keys");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert!(result.is_success());
    let requests = transport.requests();
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(requests[0].body, None);
    assert_eq!(
        requests[0].url.as_str(),
        "https://ck.example.com/keys/?nrQFDeRLSAKTLifXUIPiZg"
    );
}

// ── Provider specific exchanges ──

#[tokio::test]
async fn drmtoday_marker_selects_json_widevine_license() {
    let transport = MockTransport::ok(br#"{"status":"OK","license":"CAIS/w=="}"#);
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = widevine_request("s1").with_protection_data(ProtectionData {
        server_url: Some("https://lic.drmtoday.com/license-proxy-widevine/cenc/".into()),
        drmtoday: true,
        ..ProtectionData::default()
    });
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert_eq!(result.payload.as_deref(), Some(&[0x08, 0x02, 0x12, 0xff][..]));
}

#[tokio::test]
async fn playready_message_is_unwrapped_and_url_taken_from_init_data() {
    const KEY_MESSAGE: &str = "<PlayReadyKeyMessage type=\"LicenseAcquisition\">\
<LicenseAcquisition Version=\"1\">\
<Challenge encoding=\"base64encoded\">PHNvYXA+Y2hhbGxlbmdlPC9zb2FwPg==</Challenge>\
<HttpHeaders>\
<HttpHeader><name>Content-Type</name><value>text/xml; charset=utf-8</value></HttpHeader>\
<HttpHeader><name>SOAPAction</name><value>\"http://schemas.microsoft.com/DRM/2007/03/protocols/AcquireLicense\"</value></HttpHeader>\
</HttpHeaders>\
</LicenseAcquisition>\
</PlayReadyKeyMessage>";
    const WRM_HEADER: &str = "<WRMHEADER xmlns=\"http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader\" version=\"4.0.0.0\">\
<DATA><KID>AAAAAAAAAAAAAAAAAAAAAQ==</KID><LA_URL>https://pr.example.com/rightsmanager.asmx</LA_URL></DATA>\
</WRMHEADER>";

    let message: Vec<u8> = KEY_MESSAGE
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    let init_data = PsshBox::new(SystemId::PlayReady, build_pro(WRM_HEADER)).to_bytes();

    let transport = MockTransport::ok(b"<License/>");
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = LicenseRequest::new(
        PLAYREADY_KEY_SYSTEM,
        LicenseMessage::license_request(message),
        "pr",
    )
    .with_init_data(init_data)
    .with_protection_data(ProtectionData::default().with_header("X-Token", "abc"));
    let result = dispatch(&dispatcher, &mut rx, request).await;

    assert_eq!(result.payload.as_deref(), Some(&b"<License/>"[..]));
    let requests = transport.requests();
    assert_eq!(
        requests[0].url.as_str(),
        "https://pr.example.com/rightsmanager.asmx"
    );
    assert_eq!(
        requests[0].body.as_deref(),
        Some(&b"<soap>challenge</soap>"[..])
    );
    assert_eq!(
        requests[0].header("soapaction"),
        Some("\"http://schemas.microsoft.com/DRM/2007/03/protocols/AcquireLicense\"")
    );
    assert_eq!(requests[0].header("X-Token"), Some("abc"));
}

#[tokio::test]
async fn playready_fault_in_success_is_decode_error() {
    let transport = MockTransport::ok(
        br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultstring>Access denied</faultstring><detail><Exception><StatusCode>0x8004C600</StatusCode></Exception></detail></soap:Fault></soap:Body></soap:Envelope>"#,
    );
    let (dispatcher, mut rx) = dispatcher(&transport);

    let request = LicenseRequest::new(
        PLAYREADY_KEY_SYSTEM,
        LicenseMessage::license_request(&b"<challenge/>"[..]),
        "pr",
    )
    .with_fallback_url("https://pr.example.com/rightsmanager.asmx");
    let result = dispatch(&dispatcher, &mut rx, request).await;

    let error = result.error.unwrap();
    assert_eq!(error.kind(), ErrorKind::Decode);
    assert!(error.to_string().contains("code: 0x8004C600, name: Access denied"));
}
