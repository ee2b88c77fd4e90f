use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, ServiceExt};
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};

use super::{ChannelTransport, McpRunningService, McpTransport};
use crate::error::ToolgateError;
use crate::types::ServerDescriptor;

/// Websocket MCP transport: symmetric JSON text frames.
pub struct WsTransport {
    url: String,
    auth_token: Option<String>,
    closed: bool,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            closed: false,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn from_server(server: &ServerDescriptor) -> Self {
        let mut transport = Self::new(server.url.clone());
        transport.auth_token = server.auth_token.clone();
        transport
    }
}

#[async_trait]
impl McpTransport for WsTransport {
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<McpRunningService, ClientInitializeError> {
        if self.closed {
            return Err(ClientInitializeError::ConnectionClosed(
                "websocket transport closed".into(),
            ));
        }

        let mut request = self.url.as_str().into_client_request().map_err(|error| {
            ClientInitializeError::ConnectionClosed(format!("invalid websocket url: {error}"))
        })?;
        if let Some(token) = &self.auth_token {
            let value =
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|error| {
                    ClientInitializeError::ConnectionClosed(format!(
                        "invalid websocket auth token: {error}"
                    ))
                })?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _) = connect_async(request).await.map_err(|error| {
            ClientInitializeError::ConnectionClosed(format!(
                "websocket connect failed: {error}"
            ))
        })?;
        let (mut sink, mut source) = stream.split();

        // Writer drains a frame channel so both the serializer and the
        // reader (pong replies) can produce frames.
        let (frame_tx, mut frame_rx) = unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        let (outbound_tx, mut outbound_rx) = unbounded_channel();
        let serializer_tx = frame_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(payload) => {
                        if serializer_tx.send(Message::Text(payload.into())).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to serialize outbound websocket frame")
                    }
                }
            }
        });

        let (inbound_tx, inbound_rx) = unbounded_channel();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str(text.as_ref()) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "discarding malformed websocket frame")
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = frame_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        });

        client_info
            .into_dyn()
            .serve(ChannelTransport::new(outbound_tx, inbound_rx))
            .await
    }

    async fn close(&mut self) -> Result<(), ToolgateError> {
        self.closed = true;
        Ok(())
    }
}
