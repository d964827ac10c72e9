use crate::error::ChannelError;
use crate::protocol::models::DEFAULT_MODEL;
use crate::Result;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{BoxFuture, ChannelReceiver, ChannelSender, MessageChannel};

pub const WS_BASE_URL: &str = "wss://api.openai.com/v1/realtime";
const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_HEADER_VALUE: &str = "realtime=v1";

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected realtime WebSocket.
///
/// Thread safety: `WsChannel` is `Send` but not `Sync` because the underlying
/// WebSocket stream is not `Sync`.
pub struct WsChannel(Stream);

impl WsChannel {
    pub(crate) const fn new(stream: Stream) -> Self {
        Self(stream)
    }
}

impl MessageChannel for WsChannel {
    fn split(self: Box<Self>) -> (Box<dyn ChannelSender>, Box<dyn ChannelReceiver>) {
        let (write, read) = self.0.split();
        (Box::new(WsSender { write, closed: false }), Box::new(WsReceiver { read }))
    }
}

/// Build the endpoint URL with the model query parameter.
///
/// # Errors
/// Returns an error if `endpoint` is not a valid URL.
#[allow(clippy::result_large_err)]
pub fn endpoint_url(endpoint: Option<&str>, model: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(endpoint.unwrap_or(WS_BASE_URL))?;
    if !url.query_pairs().any(|(key, _)| key == "model") {
        url.query_pairs_mut().append_pair("model", model.unwrap_or(DEFAULT_MODEL));
    }
    Ok(url)
}

/// Establish a WebSocket connection to the realtime endpoint.
///
/// # Errors
/// Returns an error if the URL or credentials are invalid or the handshake fails.
pub async fn connect(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<WsChannel> {
    let url = endpoint_url(endpoint, model)?;

    let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;
    let mut req = url.as_str().into_client_request()?;
    let h = req.headers_mut();
    h.insert(AUTHORIZATION, auth_header);
    h.insert(BETA_HEADER, HeaderValue::from_static(BETA_HEADER_VALUE));

    let (ws_stream, _) = connect_async(req).await?;
    tracing::info!(host = url.host_str().unwrap_or_default(), "WebSocket connected");

    Ok(WsChannel::new(ws_stream))
}

struct WsSender {
    write: SplitSink<Stream, Message>,
    closed: bool,
}

impl ChannelSender for WsSender {
    fn send(&mut self, text: String) -> BoxFuture<'_, std::result::Result<(), ChannelError>> {
        Box::pin(async move {
            if self.closed {
                return Err(ChannelError::Closed);
            }
            self.write.send(Message::Text(text.into())).await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if std::mem::replace(&mut self.closed, true) {
                return;
            }
            if let Err(err) = self.write.close().await {
                tracing::debug!("WebSocket close failed: {err}");
            }
        })
    }
}

struct WsReceiver {
    read: SplitStream<Stream>,
}

impl ChannelReceiver for WsReceiver {
    fn recv(&mut self) -> BoxFuture<'_, std::result::Result<Option<String>, ChannelError>> {
        Box::pin(async move {
            while let Some(msg) = self.read.next().await {
                match msg {
                    Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "WebSocket connection closed by server");
                        return Ok(None);
                    }
                    Ok(Message::Binary(bytes)) => {
                        tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                    }
                    // Pongs are queued by tungstenite and flushed with the next send.
                    Ok(_) => {}
                    Err(err) => {
                        return match ChannelError::from(err) {
                            ChannelError::Closed => Ok(None),
                            other => Err(other),
                        };
                    }
                }
            }
            Ok(None)
        })
    }
}
