use std::path::PathBuf;

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;

use super::{McpRunningService, McpTransport};
use crate::error::ToolgateError;
use crate::types::ServerDescriptor;

/// Stdio-based MCP transport (for local MCP servers).
///
/// The server "url" is the command line of the entry point; the
/// interpreter is chosen by the entry point's extension.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    closed: bool,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            closed: false,
        }
    }

    pub fn from_server(server: &ServerDescriptor) -> Self {
        let mut parts = server.url.split_whitespace().map(String::from);
        let entry = parts.next().unwrap_or_default();
        let extra: Vec<String> = parts.collect();

        let (command, mut args) = interpreter_for(&entry);
        args.extend(extra);
        Self::new(command, args)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Pick the interpreter for a server entry point. Python servers run under
/// `uv` when it resolves on PATH; JavaScript servers run under `node`;
/// anything else is executed directly.
fn interpreter_for(entry: &str) -> (String, Vec<String>) {
    if entry.ends_with(".py") {
        if resolve_on_path("uv").is_some() {
            ("uv".to_string(), vec!["run".to_string(), entry.to_string()])
        } else {
            ("python3".to_string(), vec![entry.to_string()])
        }
    } else if entry.ends_with(".js") || entry.ends_with(".mjs") {
        ("node".to_string(), vec![entry.to_string()])
    } else {
        (entry.to_string(), Vec::new())
    }
}

fn resolve_on_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<McpRunningService, ClientInitializeError> {
        if self.closed {
            return Err(ClientInitializeError::ConnectionClosed(
                "stdio transport closed".into(),
            ));
        }

        let mut command = Command::new(&self.command);
        command.args(&self.args);
        let transport = TokioChildProcess::new(command).map_err(|error| {
            ClientInitializeError::transport::<TokioChildProcess>(error, "spawn stdio transport")
        })?;

        client_info.into_dyn().serve(transport).await
    }

    async fn close(&mut self) -> Result<(), ToolgateError> {
        self.closed = true;
        Ok(())
    }
}
