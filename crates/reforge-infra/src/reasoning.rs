//! Reasoning provider over an OpenAI-compatible chat completion endpoint.
//!
//! The provider sends the resolved instruction together with a rendered
//! context block (step, feedback, named inputs, upstream results) and
//! returns the first choice's text. The output is opaque to the engine.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use reforge_core::capability::{CapabilityProvider, TaskInput, TaskRequest};
use reforge_types::config::ReasoningConfig;
use reforge_types::error::{CapabilityError, ConfigError};
use reforge_types::task::{CapabilityKind, TaskResult};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful software migration assistant. \
Work only inside the provided working directory and answer the instruction directly.";

/// OpenAI-compatible reasoning capability.
///
/// Does not derive Debug: the client holds the API key.
pub struct OpenAiReasoningProvider {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    system_prompt: String,
}

impl OpenAiReasoningProvider {
    pub fn new(name: impl Into<String>, config: &ReasoningConfig, api_key: SecretString) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            name: name.into(),
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Build the provider, reading the API key from `config.api_key_env` once.
    pub fn from_config(name: &str, config: &ReasoningConfig) -> Result<Self, ConfigError> {
        let key = std::env::var(&config.api_key_env).map_err(|_| {
            ConfigError::Invalid(format!(
                "reasoning provider '{name}' needs the {} environment variable",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(name, config, SecretString::from(key)))
    }

    fn build_request(&self, input: &TaskInput) -> Result<CreateChatCompletionRequest, CapabilityError> {
        let TaskRequest::Reasoning { instruction } = &input.request else {
            return Err(CapabilityError::failed(
                &self.name,
                "reasoning provider received a non-reasoning request",
            ));
        };

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(self.system_prompt.clone()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(render_prompt(
                    instruction,
                    input,
                )),
                name: None,
            }),
        ];

        Ok(CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_completion_tokens: self.max_tokens,
            temperature: self.temperature,
            ..Default::default()
        })
    }
}

/// The user message: instruction first, then the context the task can see.
fn render_prompt(instruction: &str, input: &TaskInput) -> String {
    let mut prompt = format!("{instruction}\n\n## Context\n");
    prompt.push_str(&format!("Step: {} ({})\n", input.step.id, input.step.name));
    if !input.step.description.is_empty() {
        prompt.push_str(&format!("Description: {}\n", input.step.description));
    }
    prompt.push_str(&format!("Working directory: {}\n", input.working_dir.display()));
    if let Some(feedback) = &input.feedback {
        prompt.push_str(&format!("Feedback from the previous attempt: {feedback}\n"));
    }
    if !input.inputs.is_empty() {
        prompt.push_str("\n## Inputs\n");
        prompt.push_str(&json!(input.inputs).to_string());
        prompt.push('\n');
    }
    if !input.upstream.is_empty() {
        prompt.push_str("\n## Upstream results\n");
        prompt.push_str(&json!(input.upstream).to_string());
        prompt.push('\n');
    }
    prompt
}

impl CapabilityProvider for OpenAiReasoningProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Reasoning
    }

    async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        let request = self.build_request(input)?;
        tracing::debug!(task_id = %input.task_id, model = %self.model, "sending completion request");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| CapabilityError::failed(&self.name, e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| CapabilityError::failed(&self.name, "completion returned no content"))?;

        Ok(TaskResult::success(
            json!({ "model": response.model, "content": content }),
            content,
        ))
    }
}
