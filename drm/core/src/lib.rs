#![allow(clippy::doc_overindented_list_items)]

mod constants;
mod error;
mod init_data;
mod key_system;
mod protection;
mod pssh;
mod registry;
mod types;

pub mod playready;
pub mod utils;

pub use self::constants::{
    CLEARKEY_KEY_SYSTEM, CLEARKEY_SCHEME_ID_URI, CLEARKEY_SYSTEM_ID, FAIRPLAY_SYSTEM_ID,
    MP4_PROTECTION_SCHEME_ID_URI, PLAYREADY_KEY_SYSTEM, PLAYREADY_SCHEME_ID_URI,
    PLAYREADY_SYSTEM_ID, WIDEVINE_KEY_SYSTEM, WIDEVINE_SCHEME_ID_URI, WIDEVINE_SYSTEM_ID,
};
pub use self::error::{ContentKeyError, MessageError, ParseError, PsshError, RegistryError};
pub use self::init_data::{KeySystemMatch, init_data_equals, match_against_registry};
pub use self::key_system::{
    ClearKeyCapabilities, KeySystemCapabilities, PlayReadyCapabilities, WidevineCapabilities,
    pssh_from_descriptor,
};
pub use self::protection::{ContentProtection, find_cenc_descriptor, match_content_protection};
pub use self::pssh::{
    PsshBox, PsshRecord, parse_initialization_box_list, parse_initialization_boxes,
};
pub use self::registry::{KeySystemDescriptor, KeySystemRegistry, KeySystemRegistryBuilder};
pub use self::types::{ContentKey, SystemId};
pub use self::utils::{eq_ignore_ascii_case, parse_kid};
