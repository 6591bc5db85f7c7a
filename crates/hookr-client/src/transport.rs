//! WebSocket transport: authenticated upgrade with a bounded handshake.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::RelayError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the raw client key next to the bearer token.
const CLIENT_KEY_HEADER: &str = "x-client-key";

/// Application close codes the service uses for credential rejection.
const AUTH_CLOSE_CODES: [u16; 2] = [4001, 4003];

/// Open an authenticated WebSocket session within `connect_timeout`.
pub(crate) async fn open(config: &ClientConfig) -> Result<WsStream, RelayError> {
    // rustls needs a process-wide provider for wss:// endpoints.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| RelayError::Connection(format!("Invalid URL {}: {e}", config.url)))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.client_key))
        .map_err(|_| RelayError::Authentication("Client key contains invalid characters".into()))?;
    let raw_key = HeaderValue::from_str(&config.client_key)
        .map_err(|_| RelayError::Authentication("Client key contains invalid characters".into()))?;
    let headers = request.headers_mut();
    headers.insert(header::AUTHORIZATION, bearer);
    headers.insert(CLIENT_KEY_HEADER, raw_key);

    debug!(url = %config.url, timeout_ms = config.connect_timeout.as_millis(), "Opening WebSocket");

    let (stream, response) =
        tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| {
                RelayError::Connection(format!(
                    "Handshake with {} timed out after {:?}",
                    config.url, config.connect_timeout
                ))
            })?
            .map_err(classify_handshake_error)?;

    info!(url = %config.url, status = %response.status(), "WebSocket upgraded");
    Ok(stream)
}

/// Map a handshake failure onto the relay error taxonomy.
fn classify_handshake_error(err: WsError) -> RelayError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                RelayError::Authentication(format!("Client key rejected ({status})"))
            } else {
                RelayError::Connection(format!("Upgrade refused ({status})"))
            }
        }
        WsError::Url(e) => RelayError::Connection(format!("Invalid URL: {e}")),
        other => RelayError::Connection(other.to_string()),
    }
}

/// Whether a close code sent by the service means "bad credential".
pub(crate) fn is_auth_close(code: CloseCode) -> bool {
    code == CloseCode::Policy || AUTH_CLOSE_CODES.contains(&u16::from(code))
}
