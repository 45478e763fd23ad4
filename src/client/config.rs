use std::time::Duration;
use secrecy::SecretString;
use voicelink_types::audio::AudioParams;
use voicelink_types::events::PROTOCOL_VERSION;
use crate::client::consts::{
    ACCESS_TOKEN_VAR, CLIENT_ID_VAR, DEFAULT_CLIENT_ID, DEFAULT_DEVICE_ID, DEFAULT_URL, DEVICE_ID_VAR, URL_VAR,
};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct Config {
    url: String,
    access_token: SecretString,
    device_id: String,
    client_id: String,
    protocol_version: u32,
    audio_params: AudioParams,
    handshake_timeout: Duration,
    connect_timeout: Duration,
    capacity: usize,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    pub fn with_access_token(mut self, access_token: &str) -> Self {
        self.config.access_token = SecretString::from(access_token.to_string());
        self
    }

    pub fn with_device_id(mut self, device_id: &str) -> Self {
        self.config.device_id = device_id.to_string();
        self
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.config.client_id = client_id.to_string();
        self
    }

    pub fn with_protocol_version(mut self, protocol_version: u32) -> Self {
        self.config.protocol_version = protocol_version;
        self
    }

    pub fn with_audio_params(mut self, audio_params: AudioParams) -> Self {
        self.config.audio_params = audio_params;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Capacity of the outbound frame queue and the event channel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults, with connection identity taken from the environment when present.
    pub fn new() -> Self {
        Self {
            url: std::env::var(URL_VAR).unwrap_or_else(|_| DEFAULT_URL.to_string()),
            access_token: std::env::var(ACCESS_TOKEN_VAR)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            device_id: std::env::var(DEVICE_ID_VAR).unwrap_or_else(|_| DEFAULT_DEVICE_ID.to_string()),
            client_id: std::env::var(CLIENT_ID_VAR).unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string()),
            protocol_version: PROTOCOL_VERSION,
            audio_params: AudioParams::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn audio_params(&self) -> &AudioParams {
        &self.audio_params
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
