use quick_xml::Reader;
use quick_xml::events::Event;

use super::{LicenseServerAdapter, RawResponse};
use crate::error::DecodeError;
use crate::message::MessageType;

/**
    PlayReady license acquisition web service (SOAP over POST).

    Servers report failures as SOAP faults, sometimes with a 200 status, so a
    fault in a successful response is still an error.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayReadyLicenseServer;

impl LicenseServerAdapter for PlayReadyLicenseServer {
    fn name(&self) -> &str {
        "playready"
    }

    fn decode_license(
        &self,
        response: &RawResponse,
        _system_string: &str,
        _message_type: MessageType,
    ) -> Result<Vec<u8>, DecodeError> {
        if let Some(fault) = SoapFault::parse(&response.body) {
            return Err(DecodeError::ServerFault(fault.to_string()));
        }
        Ok(response.body.to_vec())
    }

    fn decode_error(
        &self,
        response: &RawResponse,
        _system_string: &str,
        _message_type: MessageType,
    ) -> String {
        match SoapFault::parse(&response.body) {
            Some(fault) => fault.to_string(),
            None => response.text().into_owned(),
        }
    }
}

/**
    The interesting parts of a `soap:Fault` returned by a PlayReady server.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SoapFault {
    status_code: Option<String>,
    fault_string: Option<String>,
    message: Option<String>,
}

impl SoapFault {
    fn parse(body: &[u8]) -> Option<Self> {
        let xml = String::from_utf8_lossy(body);
        let mut reader = Reader::from_str(&xml);
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut in_fault = false;
        let mut fault = Self::default();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    if local == b"Fault" {
                        in_fault = true;
                    }
                    stack.push(local);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) if in_fault => {
                    let text = e.unescape().ok()?;
                    let text = text.trim();
                    let slot = match stack.last().map(Vec::as_slice) {
                        Some(b"faultstring") => &mut fault.fault_string,
                        Some(b"StatusCode") => &mut fault.status_code,
                        Some(b"Message") => &mut fault.message,
                        _ => continue,
                    };
                    if !text.is_empty() {
                        slot.get_or_insert_with(|| text.to_string());
                    }
                }
                Ok(Event::Eof) => break,
                Err(_) => return None,
                _ => {}
            }
        }

        in_fault.then_some(fault)
    }
}

impl core::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "code: {}, name: {}",
            self.status_code.as_deref().unwrap_or("unknown"),
            self.fault_string.as_deref().unwrap_or("unknown")
        )?;
        if let Some(message) = &self.message {
            write!(f, ", message: {message}")?;
        }
        Ok(())
    }
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}
