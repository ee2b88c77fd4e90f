//! Shared data model: servers, tools, origins, and result chunks.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolgateError;

/// Transport flavor used to reach an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    Ws,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Ws => "ws",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportKind {
    type Err = ToolgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "ws" => Ok(TransportKind::Ws),
            other => Err(ToolgateError::Configuration(format!(
                "unknown transport type '{other}' (expected sse, stdio or ws)"
            ))),
        }
    }
}

/// An MCP server origin. Identity is `url::transport`; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub url: String,
    #[serde(rename = "type")]
    pub transport: TransportKind,
    #[serde(
        rename = "authToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_token: Option<String>,
}

impl ServerDescriptor {
    pub fn new(url: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            url: url.into(),
            transport,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Stable identity: `url::transport`.
    pub fn id(&self) -> String {
        format!("{}::{}", self.url, self.transport)
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey(self.id())
    }

    /// Parse a `url::type` spec string. The separator is the last `::` so
    /// URLs containing `::` survive.
    pub fn parse_spec(spec: &str) -> Result<Self, ToolgateError> {
        let (url, transport) = spec.rsplit_once("::").ok_or_else(|| {
            ToolgateError::Configuration(format!(
                "malformed server spec '{spec}' (expected url::type)"
            ))
        })?;
        if url.is_empty() {
            return Err(ToolgateError::Configuration(format!(
                "malformed server spec '{spec}': empty url"
            )));
        }
        Ok(Self::new(url, transport.parse()?))
    }
}

/// Pool key; same form as [`ServerDescriptor::id`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionKey(pub String);

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ServerDescriptor> for ConnectionKey {
    fn from(server: &ServerDescriptor) -> Self {
        server.key()
    }
}

/// A tool as advertised by a server. Value type; identity is the name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Text the similarity index embeds for this tool.
    pub fn index_text(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

/// A tool together with the server it was advertised from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolOrigin {
    pub tool: ToolDescriptor,
    pub server: ServerDescriptor,
}

impl ToolOrigin {
    pub fn new(tool: ToolDescriptor, server: ServerDescriptor) -> Self {
        Self { tool, server }
    }

    /// Document-store key: `{server.url}-{tool.name}`.
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.server.url, self.tool.name)
    }
}

/// One text chunk of a tool result. `is_json` marks machine-readable
/// payloads so clients can pick them out of mixed content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultChunk {
    pub text: String,
    #[serde(default)]
    pub is_json: bool,
}

impl ResultChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_json: false,
        }
    }

    pub fn json(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_spec_splits_on_last_separator() {
        let server = ServerDescriptor::parse_spec("sse://w::sse").expect("spec should parse");
        assert_eq!(server.url, "sse://w");
        assert_eq!(server.transport, TransportKind::Sse);
        assert_eq!(server.id(), "sse://w::sse");
    }

    #[test]
    fn parse_spec_accepts_all_transports() {
        for (spec, kind) in [
            ("http://localhost:8080/events::sse", TransportKind::Sse),
            ("./server.py::stdio", TransportKind::Stdio),
            ("ws://localhost:9001::ws", TransportKind::Ws),
        ] {
            let server = ServerDescriptor::parse_spec(spec).expect("spec should parse");
            assert_eq!(server.transport, kind);
        }
    }

    #[test]
    fn parse_spec_rejects_missing_separator() {
        let err = ServerDescriptor::parse_spec("http://localhost:8080")
            .expect_err("missing separator should be rejected");
        assert!(matches!(err, ToolgateError::Configuration(_)));
    }

    #[test]
    fn parse_spec_rejects_unknown_transport() {
        let err = ServerDescriptor::parse_spec("http://localhost::quic")
            .expect_err("unknown transport should be rejected");
        assert!(matches!(err, ToolgateError::Configuration(msg) if msg.contains("quic")));
    }

    #[test]
    fn parse_spec_rejects_empty_url() {
        let err =
            ServerDescriptor::parse_spec("::sse").expect_err("empty url should be rejected");
        assert!(matches!(err, ToolgateError::Configuration(msg) if msg.contains("empty url")));
    }

    #[test]
    fn server_serializes_with_wire_field_names() {
        let server =
            ServerDescriptor::new("sse://w", TransportKind::Sse).with_auth_token("tok");
        let value = serde_json::to_value(&server).expect("server should serialize");
        assert_eq!(value["url"], "sse://w");
        assert_eq!(value["type"], "sse");
        assert_eq!(value["authToken"], "tok");
    }

    #[test]
    fn auth_token_is_omitted_when_absent() {
        let server = ServerDescriptor::new("sse://w", TransportKind::Sse);
        let value = serde_json::to_value(&server).expect("server should serialize");
        assert!(value.get("authToken").is_none());
    }

    #[test]
    fn storage_key_joins_url_and_name() {
        let origin = ToolOrigin::new(
            ToolDescriptor::new("weather", "lookup weather", serde_json::json!({})),
            ServerDescriptor::new("sse://w", TransportKind::Sse),
        );
        assert_eq!(origin.storage_key(), "sse://w-weather");
    }

    #[test]
    fn index_text_joins_name_and_description() {
        let tool = ToolDescriptor::new("weather", "lookup weather", serde_json::json!({}));
        assert_eq!(tool.index_text(), "weather: lookup weather");
    }
}
