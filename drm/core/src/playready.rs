/*!
    PlayReady specific payload handling.

    A PlayReady CDM emits its license challenge wrapped in a
    `PlayReadyKeyMessage` document (usually UTF-16LE):

    ```xml
    <PlayReadyKeyMessage type="LicenseAcquisition">
      <LicenseAcquisition Version="1">
        <Challenge encoding="base64encoded">PD94bWwg...</Challenge>
        <HttpHeaders>
          <HttpHeader><name>Content-Type</name><value>text/xml; charset=utf-8</value></HttpHeader>
          <HttpHeader><name>SOAPAction</name><value>"http://schemas.microsoft.com/DRM/2007/03/protocols/AcquireLicense"</value></HttpHeader>
        </HttpHeaders>
      </LicenseAcquisition>
    </PlayReadyKeyMessage>
    ```

    The license server expects only the decoded challenge as the request body,
    with the listed headers attached.

    A PlayReady Object (PRO) is the PSSH payload:
      [0..4]  total length: u32 little-endian
      [4..6]  record count: u16 little-endian
      records: type u16 LE, length u16 LE, data
    Record type 1 is a UTF-16LE WRM header whose `LA_URL` names the license server.
*/

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::MessageError;
use crate::pssh::parse_initialization_boxes;
use crate::types::SystemId;
use crate::utils::decode_base64_lenient;

pub const DEFAULT_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
pub const DEFAULT_SOAP_ACTION: &str =
    "\"http://schemas.microsoft.com/DRM/2007/03/protocols/AcquireLicense\"";

const WRM_HEADER_RECORD: u16 = 1;

/**
    Decoded `PlayReadyKeyMessage`.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayReadyKeyMessage {
    pub challenge: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl PlayReadyKeyMessage {
    /**
        Decode a CDM message. Returns `Ok(None)` when the message is not a
        `PlayReadyKeyMessage` document, in which case it is sent unchanged.
    */
    pub fn parse(message: &[u8]) -> Result<Option<Self>, MessageError> {
        let Some(text) = decode_message_text(message) else {
            return Ok(None);
        };
        if !text.contains("PlayReadyKeyMessage") {
            return Ok(None);
        }

        let mut reader = Reader::from_str(&text);
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut challenge_text: Option<String> = None;
        let mut challenge_base64 = false;
        let mut headers = Vec::new();
        let mut header_name: Option<String> = None;
        let mut header_value: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.name();
                    let local = local_name(name.as_ref()).to_vec();
                    if local == b"Challenge" {
                        challenge_base64 = e.attributes().flatten().any(|attr| {
                            local_name(attr.key.as_ref()) == b"encoding"
                                && attr.value.as_ref() == b"base64encoded"
                        });
                        challenge_text.get_or_insert_with(String::new);
                    } else if local == b"HttpHeader" {
                        header_name = None;
                        header_value = None;
                    }
                    stack.push(local);
                }
                Ok(Event::End(_)) => {
                    if let Some(local) = stack.pop()
                        && local == b"HttpHeader"
                        && let Some(name) = header_name.take()
                    {
                        headers.push((name, header_value.take().unwrap_or_default()));
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| MessageError::InvalidXml(e.to_string()))?;
                    match stack.last().map(Vec::as_slice) {
                        Some(b"Challenge") => {
                            if let Some(buf) = challenge_text.as_mut() {
                                buf.push_str(text.trim());
                            }
                        }
                        Some(b"name") if in_http_header(&stack) => {
                            header_name = Some(text.trim().to_string());
                        }
                        Some(b"value") if in_http_header(&stack) => {
                            header_value = Some(text.trim().to_string());
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(MessageError::InvalidXml(e.to_string())),
                _ => {}
            }
        }

        let challenge_text = challenge_text
            .ok_or_else(|| MessageError::InvalidChallenge("missing Challenge element".into()))?;
        let challenge = if challenge_base64 {
            decode_base64_lenient(&challenge_text)
                .map_err(|e| MessageError::InvalidChallenge(e.to_string()))?
        } else {
            challenge_text.into_bytes()
        };

        Ok(Some(Self { challenge, headers }))
    }
}

/**
    Headers a PlayReady license server expects when the CDM did not list any.
*/
pub fn default_request_headers() -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string()),
        ("SOAPAction".to_string(), DEFAULT_SOAP_ACTION.to_string()),
    ]
}

/**
    Extract the `LA_URL` from PlayReady init data.

    Accepts either a buffer of PSSH boxes (the PlayReady box is used) or a
    bare PlayReady Object.
*/
pub fn license_url_from_init_data(init_data: &[u8]) -> Option<String> {
    let pro = match parse_initialization_boxes(init_data) {
        Ok(map) if !map.is_empty() => map.get(&SystemId::PlayReady)?.clone(),
        _ => init_data.to_vec(),
    };
    wrm_headers(&pro).iter().find_map(|xml| find_element_text(xml, b"LA_URL"))
}

/**
    Decode every WRM header record of a PlayReady Object.
*/
pub fn wrm_headers(pro: &[u8]) -> Vec<String> {
    let mut headers = Vec::new();
    if pro.len() < 6 {
        return headers;
    }
    let count = u16::from_le_bytes([pro[4], pro[5]]);
    let mut offset = 6usize;
    for _ in 0..count {
        if offset + 4 > pro.len() {
            break;
        }
        let record_type = u16::from_le_bytes([pro[offset], pro[offset + 1]]);
        let len = u16::from_le_bytes([pro[offset + 2], pro[offset + 3]]) as usize;
        offset += 4;
        if offset + len > pro.len() {
            break;
        }
        if record_type == WRM_HEADER_RECORD
            && let Some(xml) = decode_utf16le(&pro[offset..offset + len])
        {
            headers.push(xml);
        }
        offset += len;
    }
    headers
}

/**
    Build a PlayReady Object holding a single WRM header record.
*/
pub fn build_pro(wrm_header: &str) -> Vec<u8> {
    let record: Vec<u8> = wrm_header
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    let total = 6 + 4 + record.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&WRM_HEADER_RECORD.to_le_bytes());
    out.extend_from_slice(&(record.len() as u16).to_le_bytes());
    out.extend_from_slice(&record);
    out
}

fn decode_message_text(message: &[u8]) -> Option<String> {
    if let Some(rest) = message.strip_prefix(&[0xffu8, 0xfe]) {
        return decode_utf16le(rest);
    }
    if message.len() >= 2 && message.len() % 2 == 0 && message[1] == 0 {
        return decode_utf16le(message);
    }
    let text = std::str::from_utf8(message).ok()?;
    Some(text.trim_start_matches('\u{feff}').to_string())
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .ok()
        .map(|s| s.trim_start_matches('\u{feff}').to_string())
}

fn find_element_text(xml: &str, element: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => inside = local_name(e.name().as_ref()) == element,
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Text(e)) if inside => {
                let text = e.unescape().ok()?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn in_http_header(stack: &[Vec<u8>]) -> bool {
    stack.len() >= 2 && stack[stack.len() - 2] == b"HttpHeader"
}

/**
    Extract the local name from a possibly namespace-prefixed tag.
*/
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pssh::PsshBox;

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
<DATA><KID>AAAAAAAAAAAAAAAAAAAAAQ==</KID><LA_URL>https://license.example.com/rightsmanager.asmx</LA_URL></DATA>\
</WRMHEADER>";

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn parses_utf16_key_message() {
        let parsed = PlayReadyKeyMessage::parse(&utf16le(KEY_MESSAGE))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.challenge, b"<soap>challenge</soap>");
        assert_eq!(parsed.headers.len(), 2);
        assert_eq!(parsed.headers[0].0, "Content-Type");
        assert_eq!(parsed.headers[0].1, DEFAULT_CONTENT_TYPE);
        assert_eq!(parsed.headers[1].0, "SOAPAction");
    }

    #[test]
    fn parses_utf8_key_message() {
        let parsed = PlayReadyKeyMessage::parse(KEY_MESSAGE.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(parsed.challenge, b"<soap>challenge</soap>");
    }

    #[test]
    fn non_key_message_passes_through() {
        assert_eq!(PlayReadyKeyMessage::parse(b"\x08\x01\x12\x00").unwrap(), None);
        assert_eq!(
            PlayReadyKeyMessage::parse(b"<soap:Envelope/>").unwrap(),
            None
        );
    }

    #[test]
    fn key_message_without_challenge_is_rejected() {
        let err = PlayReadyKeyMessage::parse(b"<PlayReadyKeyMessage></PlayReadyKeyMessage>")
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidChallenge(_)));
    }

    #[test]
    fn la_url_from_bare_pro() {
        let pro = build_pro(WRM_HEADER);
        assert_eq!(
            license_url_from_init_data(&pro).as_deref(),
            Some("https://license.example.com/rightsmanager.asmx")
        );
    }

    #[test]
    fn la_url_from_pssh_box() {
        let pro = build_pro(WRM_HEADER);
        let pssh = PsshBox::new(SystemId::PlayReady, pro).to_bytes();
        assert_eq!(
            license_url_from_init_data(&pssh).as_deref(),
            Some("https://license.example.com/rightsmanager.asmx")
        );
    }

    #[test]
    fn la_url_absent_for_other_systems() {
        let pssh = PsshBox::new(SystemId::Widevine, b"x".to_vec()).to_bytes();
        assert_eq!(license_url_from_init_data(&pssh), None);
    }
}
