use hex_literal::hex;

/**
    Widevine DRM System ID: `edef8ba9-79d6-4ace-a3c8-27dcd51d21ed`
*/
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = hex!(
    "edef8ba9"
    "79d6"
    "4ace"
    "a3c8"
    "27dcd51d21ed"
);

/**
    PlayReady DRM System ID: `9a04f079-9840-4286-ab92-e65be0885f95`
*/
pub const PLAYREADY_SYSTEM_ID: [u8; 16] = hex!(
    "9a04f079"
    "9840"
    "4286"
    "ab92"
    "e65be0885f95"
);

/**
    Apple FairPlay DRM System ID: `94ce86fb-07ff-4f43-adb8-93d2fa968ca2`
*/
pub const FAIRPLAY_SYSTEM_ID: [u8; 16] = hex!(
    "94ce86fb"
    "07ff"
    "4f43"
    "adb8"
    "93d2fa968ca2"
);

/**
    W3C ClearKey (common PSSH) System ID: `1077efec-c0b2-4d02-ace3-3c1e52e2fb4b`
*/
pub const CLEARKEY_SYSTEM_ID: [u8; 16] = hex!(
    "1077efec"
    "c0b2"
    "4d02"
    "ace3"
    "3c1e52e2fb4b"
);

/// EME key system strings.
pub const WIDEVINE_KEY_SYSTEM: &str = "com.widevine.alpha";
pub const PLAYREADY_KEY_SYSTEM: &str = "com.microsoft.playready";
pub const CLEARKEY_KEY_SYSTEM: &str = "org.w3.clearkey";

/// DASH `ContentProtection@schemeIdUri` values.
pub const WIDEVINE_SCHEME_ID_URI: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
pub const PLAYREADY_SCHEME_ID_URI: &str = "urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95";
pub const CLEARKEY_SCHEME_ID_URI: &str = "urn:uuid:e2719d58-a985-b3c9-781a-b030af78d30e";
pub const MP4_PROTECTION_SCHEME_ID_URI: &str = "urn:mpeg:dash:mp4protection:2011";

/// ISOBMFF box type of a protection system specific header.
pub const PSSH_BOX_TYPE: [u8; 4] = *b"pssh";

/**
    Smallest possible PSSH box: size(4) + type(4) + version(1) + flags(3)
    + system_id(16) + data_size(4).
*/
pub const PSSH_MIN_BOX_SIZE: usize = 32;
