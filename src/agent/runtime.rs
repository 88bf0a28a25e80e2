use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::ToolRegistry;
use crate::config::AgentConfig;
use crate::llm::{ChatRequest, ContentBlock, LlmClient, Message, StopReason, Usage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_turns: usize,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
            max_turns: config.max_turns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
    pub turns: usize,
    pub tool_calls: Vec<String>,
}

impl fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Conversation with a hosted model that may call tools.
///
/// The history survives across `run` calls, so follow-up instructions see
/// earlier turns.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system_prompt: String,
    settings: AgentSettings,
    messages: Vec<Message>,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            tools,
            system_prompt: system_prompt.into(),
            settings,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Roles must alternate, so an instruction after an interrupted run is
    /// folded into the trailing user message.
    fn push_instruction(&mut self, instruction: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == crate::llm::types::Role::User => {
                last.content.push(ContentBlock::text(instruction));
            }
            _ => self.messages.push(Message::user(instruction)),
        }
    }

    pub async fn run(&mut self, instruction: &str) -> Result<AgentResponse> {
        info!("Running agent with {}", self.llm.model_id());
        self.push_instruction(instruction);

        let mut usage = Usage::default();
        let mut tool_calls = Vec::new();

        for turn in 1..=self.settings.max_turns {
            let request = ChatRequest::new(self.messages.clone(), self.settings.max_tokens)
                .with_system(self.system_prompt.clone())
                .with_tools(self.tools.specs().to_vec())
                .with_temperature(self.settings.temperature);

            let response = self
                .llm
                .chat(request)
                .await
                .with_context(|| format!("Model call failed on turn {}", turn))?;

            usage += response.usage;
            debug!(
                "Turn {}: stop_reason={:?}, {} blocks",
                turn,
                response.stop_reason,
                response.content.len()
            );

            let uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            let assistant = Message::assistant(response.content);
            let text = assistant.text();
            self.messages.push(assistant);

            if response.stop_reason == Some(StopReason::ToolUse) && !uses.is_empty() {
                let mut results = Vec::with_capacity(uses.len());
                for (id, name, input) in uses {
                    info!("Calling tool: {}", name);
                    let output = self.tools.call(&name, &input).await;
                    if output.is_error {
                        warn!("Tool {} returned an error", name);
                    }
                    tool_calls.push(name);

                    results.push(if output.is_error {
                        ContentBlock::tool_error(id, output.text)
                    } else {
                        ContentBlock::tool_result(id, output.text)
                    });
                }
                self.messages.push(Message::tool_results(results));
                continue;
            }

            // Every tool_use needs a matching tool_result before the next request.
            if !uses.is_empty() {
                warn!(
                    "{} tool calls were cut off by stop reason {:?}",
                    uses.len(),
                    response.stop_reason
                );
                let results = uses
                    .into_iter()
                    .map(|(id, name, _)| {
                        ContentBlock::tool_error(
                            id,
                            format!("Tool '{}' was not run: the response ended first", name),
                        )
                    })
                    .collect();
                self.messages.push(Message::tool_results(results));
            }

            if response.stop_reason == Some(StopReason::MaxTokens) {
                warn!(
                    "Response truncated at max_tokens={}",
                    self.settings.max_tokens
                );
            }

            info!(
                "Agent finished after {} turns ({} input / {} output tokens)",
                turn, usage.input_tokens, usage.output_tokens
            );

            return Ok(AgentResponse {
                text,
                stop_reason: response.stop_reason,
                usage,
                turns: turn,
                tool_calls,
            });
        }

        anyhow::bail!(
            "Agent did not finish within {} turns",
            self.settings.max_turns
        )
    }
}
