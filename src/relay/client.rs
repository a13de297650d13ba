//! Websocket client side of the relay, shared by the radio bridge and the HUD.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{GroundLinkError, Result};

pub type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to the relay at `url`.
///
/// # Errors
///
/// Returns `NetworkDisconnect` if the relay refuses or is unreachable.
pub async fn connect(url: &str) -> Result<RelayStream> {
    let (stream, _) = connect_async(url)
        .await
        .map_err(|e| GroundLinkError::NetworkDisconnect(format!("{}: {}", url, e)))?;
    debug!("Connected to relay at {}", url);
    Ok(stream)
}

/// Send one text frame.
pub async fn send_text<S>(sink: &mut S, text: String) -> Result<()>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(text))
        .await
        .map_err(|e| GroundLinkError::NetworkDisconnect(e.to_string()))
}

/// Next text frame, skipping control and binary frames.
///
/// Returns `None` once the relay closes the connection.
pub async fn next_text<S>(stream: &mut S) -> Option<Result<String>>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        match stream.next().await? {
            Ok(Message::Text(text)) => return Some(Ok(text)),
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(GroundLinkError::NetworkDisconnect(e.to_string()))),
        }
    }
}
