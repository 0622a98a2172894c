mod bus;
mod config;
mod dispatcher;
mod error;
mod message;
mod protection_data;
mod transport;

pub mod adapter;
pub mod clearkey;

pub use self::adapter::{AdapterTable, LicenseServerAdapter, RawResponse, ResponseEncoding};
pub use self::bus::{Completion, EventBus, NotificationBus};
pub use self::config::{ConfigError, DispatcherConfig, ProtectionConfig};
pub use self::dispatcher::{
    LicenseRequest, LicenseRequestDispatcher, LicenseRequestDispatcherBuilder,
};
pub use self::error::{
    ClearKeyError, DecodeError, DispatcherError, ErrorKind, LicenseRequestError,
    TransportDiagnostic,
};
pub use self::message::{LicenseMessage, LicenseRequestResult, MessageType, SessionToken};
pub use self::protection_data::ProtectionData;
pub use self::transport::{
    ExchangeSnapshot, HttpMethod, HttpRequest, HttpResponse, LicenseTransport, ReadyState,
    ReqwestTransport, TransportFailure,
};
