//! WebSocket push transport using tokio-tungstenite.

use std::time::Duration;

use futures_channel::oneshot;
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{PushTransport, TransportError, TransportHandle, TransportSink};
use crate::config::redact;

/// How long the TCP connect plus upgrade handshake may take.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens one tokio-tungstenite connection per [`PushTransport::open`] call.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

struct WebSocketHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl TransportHandle for WebSocketHandle {
    fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl PushTransport for WebSocketTransport {
    fn open(
        &mut self,
        url: &Url,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::Connect("no tokio runtime".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let target = url.to_string();
        let shown = redact(url);
        let connect_timeout = self.connect_timeout;

        tokio::spawn(async move {
            let connect = async {
                match tokio::time::timeout(connect_timeout, connect_async(target.as_str())).await {
                    Ok(Ok((ws_stream, _response))) => Some(ws_stream),
                    Ok(Err(e)) => {
                        sink.error(e.to_string());
                        None
                    }
                    // A peer that accepts TCP but never answers the upgrade.
                    Err(_) => {
                        sink.error("connect timed out");
                        None
                    }
                }
            };

            let mut shutdown_rx = shutdown_rx;
            let mut ws_stream = tokio::select! {
                stream = connect => match stream {
                    Some(s) => s,
                    None => return,
                },
                _ = &mut shutdown_rx => return,
            };

            crate::log_debug!("WebSocket connected to {}", shown);
            sink.opened();

            loop {
                tokio::select! {
                    msg = ws_stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                        Some(Ok(Message::Close(frame))) => {
                            sink.closed(frame.map(|f| f.reason.as_str().to_owned()));
                            return;
                        }
                        // Pings are answered by tungstenite; binary frames are not part of the protocol.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            sink.error(e.to_string());
                            return;
                        }
                        None => {
                            sink.closed(None);
                            return;
                        }
                    },
                    _ = &mut shutdown_rx => {
                        let _ = ws_stream.close(None).await;
                        crate::log_debug!("WebSocket to {} closed locally", shown);
                        return;
                    }
                }
            }
        });

        Ok(Box::new(WebSocketHandle {
            shutdown: Some(shutdown_tx),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEvent;
    use crate::stream::TransportEvent;

    #[test]
    fn test_rejects_non_websocket_urls() {
        let (tx, _rx) = futures_channel::mpsc::unbounded();
        let mut transport = WebSocketTransport::new();
        let url = Url::parse("http://localhost/stream").unwrap();

        let result = transport.open(&url, TransportSink::new(1, tx));
        assert!(matches!(result, Err(TransportError::UnsupportedScheme(s)) if s == "http"));
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Never accepted: the kernel finishes the TCP handshake, nobody answers the upgrade.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("ws://{}/stream", listener.local_addr().unwrap())).unwrap();
        let (tx, mut rx) = futures_channel::mpsc::unbounded();
        let mut transport =
            WebSocketTransport::new().with_connect_timeout(Duration::from_millis(50));

        let _handle = transport.open(&url, TransportSink::new(3, tx)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.next())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SessionEvent::Transport {
                generation: 3,
                event: TransportEvent::Error("connect timed out".to_string()),
            })
        );
    }
}
