//! WebSocket transport for daemon channels.

use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, header},
    },
};
use url::Url;

use crate::{
    channel::{Channel, ChannelOptions},
    error::{ChannelError, Result},
    protocol::WireMessage,
};

/// Cookie the daemon proxy reads the session token from.
pub const AUTH_COOKIE: &str = "puffer_auth";

/// Socket URL for one server: the panel URL with its scheme swapped to
/// `ws`/`wss` and `/proxy/daemon/socket/<id>` appended.
///
/// # Errors
/// Returns `ChannelError::InvalidUrl` if the panel URL is not http(s).
pub fn socket_url(panel_url: &Url, server_id: &str) -> Result<Url> {
    let scheme = match panel_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };

    let mut url = panel_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::InvalidUrl(panel_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| ChannelError::InvalidUrl(panel_url.to_string()))?
        .pop_if_empty()
        .extend(["proxy", "daemon", "socket", server_id]);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn to_message(msg: WireMessage) -> Message {
    match msg {
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Close => Message::Close(None),
    }
}

fn from_message(
    msg: std::result::Result<Message, tungstenite::Error>,
) -> Option<std::result::Result<WireMessage, tungstenite::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text.as_str().to_string()))),
        Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(Ok(WireMessage::Text(text))),
            Err(_) => {
                tracing::debug!("Ignoring non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(_)) => Some(Ok(WireMessage::Close)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

impl Channel {
    /// Open a WebSocket to `url`, authenticating with the session cookie.
    ///
    /// # Errors
    /// Returns `ChannelError::Connect` if the handshake fails.
    pub async fn connect(url: &Url, token: &str, options: ChannelOptions) -> Result<Self> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        let cookie = HeaderValue::from_str(&format!("{AUTH_COOKIE}={token}"))
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        request.headers_mut().insert(header::COOKIE, cookie);

        let (socket, response) = connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::info!(%url, status = %response.status(), "Connected to daemon socket");

        let (sink, stream) = socket.split();
        let sink = sink.with(|msg| future::ready(Ok::<_, tungstenite::Error>(to_message(msg))));
        let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

        Ok(Self::from_transport(sink, stream, options))
    }
}
