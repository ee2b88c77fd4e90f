use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, RoleClient, RxJsonRpcMessage, ServiceExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use super::{ChannelTransport, McpRunningService, McpTransport};
use crate::error::ToolgateError;
use crate::types::ServerDescriptor;

const ENDPOINT_WAIT: Duration = Duration::from_secs(10);

/// Server-sent-events MCP transport: long-poll GET for inbound frames,
/// POST to the advertised endpoint for outbound frames.
pub struct SseTransport {
    url: String,
    auth_token: Option<String>,
    closed: bool,
}

impl SseTransport {
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
impl McpTransport for SseTransport {
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<McpRunningService, ClientInitializeError> {
        if self.closed {
            return Err(ClientInitializeError::ConnectionClosed(
                "SSE transport closed".into(),
            ));
        }

        let http = reqwest::Client::new();
        let mut request = http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| {
            ClientInitializeError::ConnectionClosed(format!("SSE connect failed: {error}"))
        })?;
        if !response.status().is_success() {
            return Err(ClientInitializeError::ConnectionClosed(format!(
                "SSE connect failed with status {}",
                response.status()
            )));
        }

        let (inbound_tx, inbound_rx) = unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        tokio::spawn(read_event_stream(response, inbound_tx, endpoint_tx));

        let endpoint = tokio::time::timeout(ENDPOINT_WAIT, endpoint_rx)
            .await
            .map_err(|_| {
                ClientInitializeError::ConnectionClosed("SSE endpoint event timed out".into())
            })?
            .map_err(|_| {
                ClientInitializeError::ConnectionClosed(
                    "SSE stream ended before the endpoint event".into(),
                )
            })?;
        let endpoint = resolve_endpoint(&self.url, &endpoint);

        let (outbound_tx, outbound_rx) = unbounded_channel();
        tokio::spawn(post_outbound(
            http,
            endpoint,
            self.auth_token.clone(),
            outbound_rx,
        ));

        client_info
            .into_dyn()
            .serve(ChannelTransport::new(outbound_tx, inbound_rx))
            .await
    }

    async fn close(&mut self) -> Result<(), ToolgateError> {
        // Pump tasks terminate once the service drops its channel halves.
        self.closed = true;
        Ok(())
    }
}

async fn read_event_stream(
    response: reqwest::Response,
    inbound: UnboundedSender<RxJsonRpcMessage<RoleClient>>,
    endpoint_tx: oneshot::Sender<String>,
) {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();
    let mut event_name = String::new();
    let mut endpoint_tx = Some(endpoint_tx);

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::warn!(%error, "SSE stream read failed");
                break;
            }
        };
        for line in buffer.push(&chunk) {
            if let Some(name) = line.strip_prefix("event:") {
                event_name = name.trim().to_string();
                continue;
            }
            let Some(data) = sse_data_payload(&line) else {
                continue;
            };
            if event_name == "endpoint" {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(data.to_string());
                }
            } else {
                match serde_json::from_str(data) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            return;
                        }
                    }
                    Err(error) => tracing::warn!(%error, "discarding malformed SSE frame"),
                }
            }
            event_name.clear();
        }
    }
}

async fn post_outbound(
    http: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    mut outbound: UnboundedReceiver<rmcp::service::TxJsonRpcMessage<RoleClient>>,
) {
    while let Some(message) = outbound.recv().await {
        let mut request = http.post(&endpoint).json(&message);
        if let Some(token) = &auth_token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = %response.status(), "SSE endpoint rejected a frame");
            }
            Err(error) => {
                tracing::warn!(%error, "SSE endpoint POST failed");
                break;
            }
        }
    }
}

fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Resolve the endpoint advertised by the server against the stream URL.
fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    if let Some(path) = endpoint.strip_prefix('/') {
        return format!("{}/{}", origin_of(base), path);
    }
    match base.rfind('/') {
        Some(idx) if idx > "https://".len() => format!("{}/{}", &base[..idx], endpoint),
        _ => format!("{}/{}", base.trim_end_matches('/'), endpoint),
    }
}

fn origin_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    match url[scheme_end + 3..].find('/') {
        Some(idx) => &url[..scheme_end + 3 + idx],
        None => url,
    }
}

/// Reassembles SSE lines from byte chunks that may split mid-line.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut search_index = 0;
        while let Some(relative) = self.buffer[search_index..].iter().position(|b| *b == b'\n') {
            let newline_index = search_index + relative;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }
            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..line_end]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            search_index = newline_index + 1;
        }
        self.buffer.drain(..search_index);
        lines
    }
}
