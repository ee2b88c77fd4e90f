//! Anthropic Messages API adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Agent;
use crate::config::ToolgateConfig;
use crate::conversation::wire::{self, WireBlock, WireMessage};
use crate::conversation::{ContentBlock, Conversation};
use crate::error::{Result, ToolgateError};
use crate::types::ToolDescriptor;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a tool-using assistant. Tools are discovered on demand: use the \
query-tools registry tool to find tools relevant to the task before \
concluding something cannot be done; newly discovered tools become \
callable on your next step.

Signal the end of a turn with exactly one of these markers in a text \
block:
- NEED_USER_INPUT: <question for the user>, when you cannot proceed \
without more information.
- FINAL_RESPONSE: <your complete answer>, when the task is done.
Keep working with tools until one of the markers applies.";

/// Agent backed by the Anthropic Messages API.
pub struct AnthropicAgent {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    version: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl AnthropicAgent {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            version: version.into(),
            model: model.into(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn from_config(config: &ToolgateConfig) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let mut agent = Self::new(api_key, &config.model, &config.anthropic_version);
        agent.max_tokens = config.max_tokens;
        Ok(agent)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base = base_url.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Agent for AnthropicAgent {
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<ContentBlock>> {
        let (conversation_system, messages) = wire::to_wire(conversation);
        let system = match conversation_system {
            Some(extra) => format!("{}\n\n{extra}", self.system_prompt),
            None => self.system_prompt.clone(),
        };

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: Some(system),
            messages,
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.input_schema,
                })
                .collect(),
        };

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ToolgateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = parsed.stop_reason.as_deref().unwrap_or("-"),
                "model call finished"
            );
        }

        wire::ingest_blocks(parsed.content)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::conversation::Message;

    fn agent_for(server: &MockServer) -> AnthropicAgent {
        AnthropicAgent::new("sk-test", "claude-test", "2023-06-01")
            .with_base_url(format!("{}/v1", server.uri()))
    }

    fn conversation(text: &str) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(text));
        conversation
    }

    fn weather_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "weather",
            "look up the weather",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        )
    }

    #[tokio::test]
    async fn chat_sends_headers_tools_and_parses_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "content": [
                    { "type": "text", "text": "Checking the weather." },
                    { "type": "tool_use", "id": "tu_1", "name": "weather",
                      "input": { "city": "Paris" } }
                ],
                "stop_reason": "tool_use",
                "usage": { "input_tokens": 10, "output_tokens": 20 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        let blocks = agent
            .chat(&conversation("weather in Paris"), &[weather_tool()])
            .await
            .expect("chat should succeed");

        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0], ContentBlock::Text { text, .. } if text.contains("Checking")));
        assert!(matches!(
            &blocks[1],
            ContentBlock::ToolUse { id, name, args }
                if id == "tu_1" && name == "weather" && args["city"] == "Paris"
        ));

        let requests = server.received_requests().await.expect("requests recorded");
        let body: serde_json::Value =
            serde_json::from_slice(&requests[0].body).expect("request body is JSON");
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["tools"][0]["name"], "weather");
        assert!(body["system"]
            .as_str()
            .expect("system prompt present")
            .contains("FINAL_RESPONSE"));
    }

    #[tokio::test]
    async fn chat_lifts_sentinels_on_ingest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "FINAL_RESPONSE: Please give me a task." }
                ]
            })))
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        let blocks = agent
            .chat(&conversation("hello"), &[])
            .await
            .expect("chat should succeed");

        assert_eq!(
            blocks,
            vec![ContentBlock::FinalResponse {
                response: "Please give me a task.".into()
            }]
        );
    }

    #[tokio::test]
    async fn chat_omits_empty_tool_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [ { "type": "text", "text": "ok" } ]
            })))
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        agent
            .chat(&conversation("hello"), &[])
            .await
            .expect("chat should succeed");

        let requests = server.received_requests().await.expect("requests recorded");
        let body: serde_json::Value =
            serde_json::from_slice(&requests[0].body).expect("request body is JSON");
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn api_errors_map_to_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(529).set_body_string("overloaded, try later"),
            )
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        let err = agent
            .chat(&conversation("hello"), &[])
            .await
            .expect_err("server error should surface");
        assert!(matches!(
            err,
            ToolgateError::Api { status: 529, message } if message.contains("overloaded")
        ));
    }

    #[tokio::test]
    async fn thinking_blocks_survive_the_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "thinking", "signature": "sig_1", "thinking": "pondering" },
                    { "type": "text", "text": "FINAL_RESPONSE: done" }
                ]
            })))
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        let blocks = agent
            .chat(&conversation("hello"), &[])
            .await
            .expect("chat should succeed");
        assert!(matches!(
            &blocks[0],
            ContentBlock::Thinking { signature, text }
                if signature == "sig_1" && text == "pondering"
        ));
    }

    #[tokio::test]
    async fn from_config_requires_api_key() {
        let config = ToolgateConfig::default();
        assert!(AnthropicAgent::from_config(&config).is_err());

        let config = ToolgateConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let agent = AnthropicAgent::from_config(&config).expect("agent should build");
        assert_eq!(agent.model(), crate::config::DEFAULT_MODEL);
    }
}
