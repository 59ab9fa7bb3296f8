//! Push channel against the pod's websocket updates endpoint.
//!
//! The protocol is line-oriented: the client sends `sub <uri>` and the
//! server answers `ack <uri>`, then emits `pub <uri>` whenever the
//! subscribed resource changes. A `pub` only says "something changed";
//! the poll loop decides what to fetch.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use podchat_shared::error::TransportError;
use podchat_shared::urls::push_channel_url;

pub type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame off the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// The named resource changed.
    Publish(String),
    /// A subscription was acknowledged.
    Ack(String),
    /// Anything the protocol does not name; logged and ignored.
    Other(String),
}

pub fn parse_frame(frame: &str) -> PushFrame {
    let trimmed = frame.trim();
    if let Some(uri) = trimmed.strip_prefix("pub ") {
        PushFrame::Publish(uri.trim().to_string())
    } else if let Some(uri) = trimmed.strip_prefix("ack ") {
        PushFrame::Ack(uri.trim().to_string())
    } else {
        PushFrame::Other(trimmed.to_string())
    }
}

pub fn subscribe_frame(resource_url: &str) -> String {
    format!("sub {resource_url}")
}

/// Connects to the identity host's push endpoint and subscribes to the
/// inbox. The returned stream yields raw frames for [`parse_frame`].
pub async fn connect_inbox_channel(
    webid: &str,
    inbox: &str,
) -> Result<PushStream, TransportError> {
    let channel_url = push_channel_url(webid)?;
    debug!(url = %channel_url, "connecting push channel");
    let (mut stream, _) = connect_async(&channel_url)
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;
    stream
        .send(Message::Text(subscribe_frame(inbox)))
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;
    Ok(stream)
}

/// Waits for the next publish frame, skipping acks and unknown frames.
/// `None` once the channel closed.
pub async fn next_publish(stream: &mut PushStream) -> Option<String> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_frame(&text) {
                PushFrame::Publish(uri) => return Some(uri),
                PushFrame::Ack(uri) => debug!(uri = %uri, "subscription acknowledged"),
                PushFrame::Other(frame) => warn!(frame = %frame, "unknown push frame"),
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(error) => {
                warn!(error = %error, "push channel error");
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_publish_frame() {
        assert_eq!(
            parse_frame("pub https://alice.pod/inbox/"),
            PushFrame::Publish("https://alice.pod/inbox/".to_string())
        );
    }

    #[test]
    fn test_parse_ack_frame() {
        assert_eq!(
            parse_frame("ack https://alice.pod/inbox/\n"),
            PushFrame::Ack("https://alice.pod/inbox/".to_string())
        );
    }

    #[test]
    fn test_unknown_frames_are_preserved() {
        assert_eq!(
            parse_frame("protocol solid-0.1"),
            PushFrame::Other("protocol solid-0.1".to_string())
        );
    }

    #[test]
    fn test_subscribe_frame_shape() {
        assert_eq!(
            subscribe_frame("https://alice.pod/inbox/"),
            "sub https://alice.pod/inbox/"
        );
    }
}
