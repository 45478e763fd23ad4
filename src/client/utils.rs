use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use crate::client::config::Config;
use crate::client::consts::{AUTHORIZATION_HEADER, CLIENT_ID_HEADER, DEVICE_ID_HEADER, PROTOCOL_VERSION_HEADER};

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = config.url().into_client_request()?;
    let headers = request.headers_mut();
    if !config.access_token().expose_secret().is_empty() {
        headers.insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", config.access_token().expose_secret()).as_str().parse()?,
        );
    }
    headers.insert(PROTOCOL_VERSION_HEADER, config.protocol_version().to_string().as_str().parse()?);
    headers.insert(DEVICE_ID_HEADER, config.device_id().parse()?);
    headers.insert(CLIENT_ID_HEADER, config.client_id().parse()?);
    Ok(request)
}
