//! Physical connection establishment

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::transport::TransportError;

/// An open connection, as a pair of text-frame channels
///
/// Dropping `outbound` closes the connection. `inbound` yields `None` once
/// the peer has gone away.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens links to a room server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Link, TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Link, TransportError> {
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        // Writer task: outbound channel -> WebSocket
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader task: WebSocket -> inbound channel
        tokio::spawn(async move {
            while let Some(result) = ws_stream.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.as_str().to_owned()).is_err() {
                            debug!("Inbound channel closed");
                            break;
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        warn!("Received binary message, ignoring");
                    }
                    Ok(Message::Close(_)) => {
                        info!("Server initiated close");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
