//! Scripted rmcp services for exercising the client and pool without real
//! servers.

use rmcp::model::ServerJsonRpcMessage;
use rmcp::service::{serve_directly, RoleClient, RxJsonRpcMessage, ServiceExt, TxJsonRpcMessage};
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;

use super::transport::{ChannelTransport, McpRunningService};

pub(crate) enum ScriptedBehavior {
    DisconnectOnListTools,
    DisconnectOnCallTool,
    ListTools { tool_name: String },
    CallTool,
    NeverReply,
}

/// Build a running client service whose peer follows a scripted behavior.
pub(crate) fn scripted_running_service(behavior: ScriptedBehavior) -> McpRunningService {
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<TxJsonRpcMessage<RoleClient>>();
    let (inbound_tx, inbound_rx) = unbounded_channel::<RxJsonRpcMessage<RoleClient>>();
    let transport = ChannelTransport::new(outbound_tx, inbound_rx);

    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let value = match serde_json::to_value(message) {
                Ok(value) => value,
                Err(_) => continue,
            };

            let Some(method) = value.get("method").and_then(|m| m.as_str()) else {
                continue;
            };

            match (&behavior, method) {
                (ScriptedBehavior::DisconnectOnListTools, "tools/list")
                | (ScriptedBehavior::DisconnectOnCallTool, "tools/call") => {
                    return;
                }
                (ScriptedBehavior::NeverReply, _) => {}
                (ScriptedBehavior::ListTools { tool_name }, "tools/list") => {
                    let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
                    let response: ServerJsonRpcMessage = serde_json::from_value(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "tools": [
                                {
                                    "name": tool_name,
                                    "description": "scripted tool",
                                    "inputSchema": { "type": "object", "properties": {} }
                                }
                            ],
                            "nextCursor": null
                        }
                    }))
                    .expect("scripted tools/list response should deserialize");
                    let _ = inbound_tx.send(response);
                }
                (ScriptedBehavior::CallTool, "tools/call") => {
                    let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
                    let response: ServerJsonRpcMessage = serde_json::from_value(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "content": [
                                { "type": "text", "text": "tool ok" }
                            ],
                            "structuredContent": { "ok": true },
                            "isError": false
                        }
                    }))
                    .expect("scripted tools/call response should deserialize");
                    let _ = inbound_tx.send(response);
                }
                _ => {}
            }
        }
    });

    serve_directly(().into_dyn(), transport, None)
}
