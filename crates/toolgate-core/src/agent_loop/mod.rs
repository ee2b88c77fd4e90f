//! Bounded iterative turn driver.
//!
//! One turn: append the user query, then alternate model calls and tool
//! dispatch until a terminal sentinel lands or the depth cap trips. The
//! recursion of the state machine is flattened into a loop so the call
//! stack stays constant.

use std::mem;
use std::time::Duration;

use crate::agent::Agent;
use crate::config::ToolgateConfig;
use crate::conversation::{ContentBlock, Conversation, Message, Role};
use crate::toolbox::Toolbox;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEnd {
    FinalResponse(String),
    UserInput(String),
    Exception(String),
    DepthExhausted,
}

/// Drives turns for one session; owns the conversation buffer.
pub struct AgentLoop<A> {
    agent: A,
    toolbox: Toolbox,
    conversation: Conversation,
    max_depth: usize,
    turn_timeout: Option<Duration>,
}

impl<A: Agent> AgentLoop<A> {
    pub fn new(agent: A, toolbox: Toolbox) -> Self {
        Self {
            agent,
            toolbox,
            conversation: Conversation::new(),
            max_depth: crate::config::DEFAULT_MAX_DEPTH,
            turn_timeout: None,
        }
    }

    pub fn with_config(mut self, config: &ToolgateConfig) -> Self {
        self.max_depth = config.max_depth.max(1);
        self.turn_timeout = config.turn_timeout;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// Run one full user turn. Never raises: every failure path lands in
    /// the conversation as a typed block and a [`TurnEnd`].
    pub async fn run_turn(&mut self, query: &str) -> TurnEnd {
        self.conversation.push(Message::user(query));

        match self.turn_timeout {
            Some(limit) => {
                // The timeout wraps the whole turn; expiry cancels the
                // in-flight call and terminates with an exception block.
                let driven = tokio::time::timeout(limit, Self::drive(
                    &self.agent,
                    &mut self.toolbox,
                    &mut self.conversation,
                    self.max_depth,
                ))
                .await;
                match driven {
                    Ok(end) => end,
                    Err(_) => {
                        let message =
                            format!("turn deadline of {}ms exceeded", limit.as_millis());
                        tracing::warn!(%message, "turn cancelled");
                        self.conversation.push(Message::exception(&message));
                        TurnEnd::Exception(message)
                    }
                }
            }
            None => {
                Self::drive(
                    &self.agent,
                    &mut self.toolbox,
                    &mut self.conversation,
                    self.max_depth,
                )
                .await
            }
        }
    }

    async fn drive(
        agent: &A,
        toolbox: &mut Toolbox,
        conversation: &mut Conversation,
        max_depth: usize,
    ) -> TurnEnd {
        let mut depth = 0usize;
        loop {
            let tools = toolbox.available_tools();
            tracing::debug!(depth, tools = tools.len(), "model call");

            let blocks = match agent.chat(conversation, &tools).await {
                Ok(blocks) => blocks,
                Err(error) => {
                    let message = format!("agent call failed: {error}");
                    tracing::error!(%error, "agent call failed");
                    conversation.push(Message::exception(&message));
                    return TurnEnd::Exception(message);
                }
            };

            let mut scratch: Vec<ContentBlock> = Vec::new();
            let mut terminal: Option<TurnEnd> = None;
            let mut blocks = blocks.into_iter();

            for block in blocks.by_ref() {
                match block {
                    ContentBlock::Text { .. } | ContentBlock::Thinking { .. } => {
                        scratch.push(block);
                    }
                    ContentBlock::ToolUse { id, name, args } => {
                        scratch.push(ContentBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            args: args.clone(),
                        });
                        flush_scratch(conversation, &mut scratch);

                        tracing::info!(tool = %name, "dispatching tool use");
                        let result = toolbox.execute_tool(&id, &name, &args).await;
                        conversation.push(Message::new(Role::User, vec![result]));
                    }
                    ContentBlock::UserInput { request } => {
                        terminal = Some(TurnEnd::UserInput(request.clone()));
                        scratch.push(ContentBlock::UserInput { request });
                        flush_scratch(conversation, &mut scratch);
                        break;
                    }
                    ContentBlock::FinalResponse { response } => {
                        terminal = Some(TurnEnd::FinalResponse(response.clone()));
                        scratch.push(ContentBlock::FinalResponse { response });
                        flush_scratch(conversation, &mut scratch);
                        break;
                    }
                    ContentBlock::ToolResult { .. } | ContentBlock::Exception { .. } => {
                        tracing::warn!("dropping unexpected block kind from model response");
                    }
                }
            }

            if let Some(end) = terminal {
                let dropped = blocks.count();
                if dropped > 0 {
                    tracing::warn!(dropped, "dropping blocks after terminal sentinel");
                }
                return end;
            }

            flush_scratch(conversation, &mut scratch);

            depth += 1;
            if depth >= max_depth {
                tracing::warn!(max_depth, "depth cap reached");
                conversation.push(Message::new(
                    Role::Assistant,
                    vec![ContentBlock::user_text(format!(
                        "Maximum re-evaluation depth ({max_depth}) reached; stopping this turn."
                    ))],
                ));
                return TurnEnd::DepthExhausted;
            }
        }
    }
}

fn flush_scratch(conversation: &mut Conversation, scratch: &mut Vec<ContentBlock>) {
    if !scratch.is_empty() {
        conversation.push(Message::new(Role::Assistant, mem::take(scratch)));
    }
}
