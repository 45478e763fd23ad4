pub const URL_VAR: &str = "VOICELINK_URL";
pub const ACCESS_TOKEN_VAR: &str = "VOICELINK_ACCESS_TOKEN";
pub const DEVICE_ID_VAR: &str = "VOICELINK_DEVICE_ID";
pub const CLIENT_ID_VAR: &str = "VOICELINK_CLIENT_ID";

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/v1/";
pub const DEFAULT_DEVICE_ID: &str = "00:00:00:00:00:00";
pub const DEFAULT_CLIENT_ID: &str = "voicelink";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const PROTOCOL_VERSION_HEADER: &str = "Protocol-Version";
pub const DEVICE_ID_HEADER: &str = "Device-Id";
pub const CLIENT_ID_HEADER: &str = "Client-Id";
